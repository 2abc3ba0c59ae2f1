//! nflverse play-by-play CSV loading
use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use super::{PlayRecord, PlayTable};
use crate::clock::parse_clock;

/// Raw CSV row. Every cell is read as text and converted leniently, since
/// nflverse exports mix `NA`, empty cells, integers and floats freely.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlayRow {
    game_id: Option<String>,
    play_id: Option<String>,
    drive: Option<String>,
    qtr: Option<String>,
    quarter_seconds_remaining: Option<String>,
    time: Option<String>,
    down: Option<String>,
    ydstogo: Option<String>,
    yardline_100: Option<String>,
    yards_gained: Option<String>,
    play_type: Option<String>,
    desc: Option<String>,
    posteam: Option<String>,
    defteam: Option<String>,
    posteam_score: Option<String>,
    defteam_score: Option<String>,
    total_home_score: Option<String>,
    total_away_score: Option<String>,
    passer_player_name: Option<String>,
    rusher_player_name: Option<String>,
    receiver_player_name: Option<String>,
    td_player_name: Option<String>,
    touchdown: Option<String>,
    interception: Option<String>,
    sack: Option<String>,
    fumble: Option<String>,
    fumble_lost: Option<String>,
    complete_pass: Option<String>,
    pass_attempt: Option<String>,
    rush_attempt: Option<String>,
    penalty: Option<String>,
    penalty_type: Option<String>,
    penalty_yards: Option<String>,
    first_down: Option<String>,
    shotgun: Option<String>,
    no_huddle: Option<String>,
    qb_scramble: Option<String>,
    air_yards: Option<String>,
    yards_after_catch: Option<String>,
    kick_distance: Option<String>,
    field_goal_result: Option<String>,
    wp: Option<String>,
    wpa: Option<String>,
}

fn opt_text(cell: Option<String>) -> Option<String> {
    let cell = cell?;
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn opt_number(cell: Option<String>) -> Option<f64> {
    opt_text(cell)?.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn opt_int<T: TryFrom<i64>>(cell: Option<String>) -> Option<T> {
    let n = opt_number(cell)?;
    T::try_from(n.round() as i64).ok()
}

fn opt_flag(cell: Option<String>) -> Option<bool> {
    let text = opt_text(cell)?;
    match text.to_lowercase().as_str() {
        "1" | "1.0" | "true" | "t" | "yes" => Some(true),
        "0" | "0.0" | "false" | "f" | "no" => Some(false),
        _ => None,
    }
}

impl RawPlayRow {
    fn into_record(self, sequence_index: usize) -> PlayRecord {
        let game_clock_seconds = opt_int::<u32>(self.quarter_seconds_remaining)
            .or_else(|| opt_text(self.time).and_then(|t| parse_clock(&t)));

        PlayRecord {
            sequence_index,
            game_id: opt_text(self.game_id),
            play_id: opt_number(self.play_id),
            drive_id: opt_int(self.drive),
            quarter: opt_int(self.qtr),
            game_clock_seconds,
            down: opt_int(self.down),
            yards_to_go: opt_int(self.ydstogo),
            yardline_100: opt_int(self.yardline_100),
            yards_gained: opt_int(self.yards_gained),
            play_type: opt_text(self.play_type),
            description: opt_text(self.desc),
            posteam: opt_text(self.posteam),
            defteam: opt_text(self.defteam),
            posteam_score: opt_int(self.posteam_score),
            defteam_score: opt_int(self.defteam_score),
            total_home_score: opt_int(self.total_home_score),
            total_away_score: opt_int(self.total_away_score),
            passer_player_name: opt_text(self.passer_player_name),
            rusher_player_name: opt_text(self.rusher_player_name),
            receiver_player_name: opt_text(self.receiver_player_name),
            td_player_name: opt_text(self.td_player_name),
            touchdown: opt_flag(self.touchdown),
            interception: opt_flag(self.interception),
            sack: opt_flag(self.sack),
            fumble: opt_flag(self.fumble),
            fumble_lost: opt_flag(self.fumble_lost),
            complete_pass: opt_flag(self.complete_pass),
            pass_attempt: opt_flag(self.pass_attempt),
            rush_attempt: opt_flag(self.rush_attempt),
            penalty: opt_flag(self.penalty),
            penalty_type: opt_text(self.penalty_type),
            penalty_yards: opt_int(self.penalty_yards),
            first_down: opt_flag(self.first_down),
            shotgun: opt_flag(self.shotgun),
            no_huddle: opt_flag(self.no_huddle),
            qb_scramble: opt_flag(self.qb_scramble),
            air_yards: opt_number(self.air_yards),
            yards_after_catch: opt_number(self.yards_after_catch),
            kick_distance: opt_number(self.kick_distance),
            field_goal_result: opt_text(self.field_goal_result),
            wp: opt_number(self.wp),
            wpa: opt_number(self.wpa),
        }
    }
}

/// Read play records from any CSV source. Row position becomes the
/// record's `sequence_index`; unknown columns are ignored.
pub fn read_plays<R: Read>(reader: R) -> Result<PlayTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut records = Vec::new();
    for (row, result) in csv_reader.deserialize::<RawPlayRow>().enumerate() {
        let raw = result.with_context(|| format!("Failed to parse play row {}", row + 1))?;
        records.push(raw.into_record(row));
    }

    debug!("Parsed {} play rows", records.len());
    Ok(PlayTable::new(records))
}

/// Load a play table from a CSV file on disk.
pub async fn load_plays_csv(path: &Path) -> Result<PlayTable> {
    let path_buf = path.to_path_buf();
    let table = tokio::task::spawn_blocking(move || -> Result<PlayTable> {
        let file = std::fs::File::open(&path_buf)
            .with_context(|| format!("Failed to open plays file {}", path_buf.display()))?;
        read_plays(std::io::BufReader::new(file))
    })
    .await??;

    info!(
        "🏈 Loaded {} plays in {} drives from {}",
        table.len(),
        table.drives().len(),
        path.display()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
play_id,game_id,qtr,time,quarter_seconds_remaining,drive,down,ydstogo,play_type,desc,passer_player_name,yards_gained,complete_pass,touchdown,wpa,mystery
1,2023_01_SF_PIT,1,15:00,900,1,NA,NA,kickoff,Kickoff,NA,0,0,0,0.001,x
45,2023_01_SF_PIT,1,14:55,,1,1,10,pass,B.Purdy pass deep right,B.Purdy,24,1.0,0,0.043,y
";

    #[test]
    fn test_read_plays_maps_nflverse_columns() {
        let table = read_plays(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);

        let kickoff = &table.records()[0];
        assert_eq!(kickoff.quarter, Some(1));
        assert_eq!(kickoff.game_clock_seconds, Some(900));
        assert_eq!(kickoff.down, None);
        assert_eq!(kickoff.passer_player_name, None);
        assert_eq!(kickoff.complete_pass, Some(false));

        let pass = &table.records()[1];
        assert_eq!(pass.sequence_index, 1);
        // falls back to the MM:SS time column
        assert_eq!(pass.game_clock_seconds, Some(895));
        assert_eq!(pass.yards_gained, Some(24));
        assert_eq!(pass.complete_pass, Some(true));
        assert_eq!(pass.wpa, Some(0.043));
        assert_eq!(pass.drive_id, Some(1));
        assert_eq!(table.drives().len(), 1);
    }

    #[test]
    fn test_lenient_cells() {
        assert_eq!(opt_flag(Some("TRUE".into())), Some(true));
        assert_eq!(opt_flag(Some("maybe".into())), None);
        assert_eq!(opt_int::<u8>(Some("3.0".into())), Some(3));
        assert_eq!(opt_int::<u8>(Some("-1".into())), None);
        assert_eq!(opt_number(Some(" NA ".into())), None);
    }

    #[tokio::test]
    async fn test_load_plays_csv_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plays.csv");
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        let table = load_plays_csv(&path).await.unwrap();
        assert_eq!(table.len(), 2);

        assert!(load_plays_csv(&dir.path().join("missing.csv")).await.is_err());
    }
}
