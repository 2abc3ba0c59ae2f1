//! Play-by-play records and the immutable play table
pub mod columns;
pub mod loader;
pub mod value;

pub use columns::{Column, ColumnRegistry, ColumnSpec, ColumnType, CATEGORIES, COLUMNS};
pub use loader::{load_plays_csv, read_plays};
pub use value::{compare_for_rank, FieldValue};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::clock::{format_clock, GameClock};

/// One play-by-play row. Immutable after loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    /// Load-order position, the authoritative chronological key
    pub sequence_index: usize,
    pub game_id: Option<String>,
    pub play_id: Option<f64>,
    pub drive_id: Option<u32>,
    pub quarter: Option<u8>,
    pub game_clock_seconds: Option<u32>,
    pub down: Option<u8>,
    pub yards_to_go: Option<i32>,
    pub yardline_100: Option<i32>,
    pub yards_gained: Option<i32>,
    pub play_type: Option<String>,
    pub description: Option<String>,
    pub posteam: Option<String>,
    pub defteam: Option<String>,
    pub posteam_score: Option<i32>,
    pub defteam_score: Option<i32>,
    pub total_home_score: Option<i32>,
    pub total_away_score: Option<i32>,
    pub passer_player_name: Option<String>,
    pub rusher_player_name: Option<String>,
    pub receiver_player_name: Option<String>,
    pub td_player_name: Option<String>,
    pub touchdown: Option<bool>,
    pub interception: Option<bool>,
    pub sack: Option<bool>,
    pub fumble: Option<bool>,
    pub fumble_lost: Option<bool>,
    pub complete_pass: Option<bool>,
    pub pass_attempt: Option<bool>,
    pub rush_attempt: Option<bool>,
    pub penalty: Option<bool>,
    pub penalty_type: Option<String>,
    pub penalty_yards: Option<i32>,
    pub first_down: Option<bool>,
    pub shotgun: Option<bool>,
    pub no_huddle: Option<bool>,
    pub qb_scramble: Option<bool>,
    pub air_yards: Option<f64>,
    pub yards_after_catch: Option<f64>,
    pub kick_distance: Option<f64>,
    pub field_goal_result: Option<String>,
    pub wp: Option<f64>,
    pub wpa: Option<f64>,
}

/// Key identifying a drive across games.
pub type DriveKey = (Option<String>, Option<u32>);

impl PlayRecord {
    /// Quarter and clock, when both are present and in range.
    pub fn game_clock(&self) -> Option<GameClock> {
        let clock = GameClock::new(self.quarter?, self.game_clock_seconds?);
        clock.is_valid().then_some(clock)
    }

    /// Clock rendered as `M:SS`, if known.
    pub fn clock_display(&self) -> Option<String> {
        self.game_clock_seconds.map(|s| format_clock(s as f64))
    }

    pub fn drive_key(&self) -> DriveKey {
        (self.game_id.clone(), self.drive_id)
    }

    pub fn is_touchdown(&self) -> bool {
        self.touchdown.unwrap_or(false)
    }

    pub fn is_turnover(&self) -> bool {
        self.interception.unwrap_or(false) || self.fumble.unwrap_or(false)
    }
}

/// Plays sharing a (game, drive) key.
#[derive(Debug, Clone)]
pub struct Drive {
    pub key: DriveKey,
    /// Positions into the table's record list, in sequence order
    pub plays: Vec<usize>,
}

/// Immutable play table, sorted by `sequence_index`.
#[derive(Debug, Clone, Default)]
pub struct PlayTable {
    records: Vec<PlayRecord>,
    drives: Vec<Drive>,
}

impl PlayTable {
    /// Build a table. Records are sorted by `sequence_index` and grouped into
    /// drives in order of each drive's first play. Plays without a drive id
    /// form no drive.
    pub fn new(mut records: Vec<PlayRecord>) -> Self {
        records.sort_by_key(|r| r.sequence_index);

        let mut drives: Vec<Drive> = Vec::new();
        let mut index_of: HashMap<DriveKey, usize> = HashMap::new();
        for (pos, record) in records.iter().enumerate() {
            if record.drive_id.is_none() {
                continue;
            }
            let key = record.drive_key();
            match index_of.get(&key) {
                Some(&i) => drives[i].plays.push(pos),
                None => {
                    index_of.insert(key.clone(), drives.len());
                    drives.push(Drive {
                        key,
                        plays: vec![pos],
                    });
                }
            }
        }

        Self { records, drives }
    }

    pub fn records(&self) -> &[PlayRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&PlayRecord> {
        self.records.get(pos)
    }

    pub fn drives(&self) -> &[Drive] {
        &self.drives
    }

    /// Position of the record with the given sequence index.
    pub fn position_of(&self, sequence_index: usize) -> Option<usize> {
        self.records
            .binary_search_by_key(&sequence_index, |r| r.sequence_index)
            .ok()
    }

    /// The record that follows `sequence_index` in the table, if any.
    pub fn next_play(&self, sequence_index: usize) -> Option<&PlayRecord> {
        let pos = self.position_of(sequence_index)?;
        self.records.get(pos + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(seq: usize, game: &str, drive: Option<u32>) -> PlayRecord {
        PlayRecord {
            sequence_index: seq,
            game_id: Some(game.to_string()),
            drive_id: drive,
            ..PlayRecord::default()
        }
    }

    #[test]
    fn test_table_sorts_and_groups_drives() {
        let table = PlayTable::new(vec![
            play(3, "g1", Some(2)),
            play(0, "g1", Some(1)),
            play(2, "g1", Some(1)),
            play(1, "g1", None),
            play(4, "g2", Some(1)),
        ]);

        let order: Vec<usize> = table.records().iter().map(|r| r.sequence_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);

        assert_eq!(table.drives().len(), 3);
        assert_eq!(table.drives()[0].plays, vec![0, 2]);
        assert_eq!(table.drives()[1].plays, vec![3]);
        assert_eq!(table.drives()[2].key, (Some("g2".to_string()), Some(1)));
    }

    #[test]
    fn test_next_play() {
        let table = PlayTable::new(vec![play(5, "g", Some(1)), play(9, "g", Some(1))]);
        assert_eq!(table.next_play(5).map(|r| r.sequence_index), Some(9));
        assert!(table.next_play(9).is_none());
        assert!(table.next_play(6).is_none());
    }

    #[test]
    fn test_game_clock_requires_valid_fields() {
        let mut record = PlayRecord {
            quarter: Some(2),
            game_clock_seconds: Some(514),
            ..PlayRecord::default()
        };
        assert_eq!(record.game_clock().map(|c| c.to_string()), Some("Q2 8:34".to_string()));

        record.game_clock_seconds = Some(1200);
        assert!(record.game_clock().is_none());
    }
}
