//! Typed column registry for play-by-play data.
//!
//! Every queryable column has a semantic type that decides which operators
//! apply to it, plus a category used to present columns to the external
//! query parser a few at a time.

use std::collections::HashMap;
use std::fmt;

use super::{FieldValue, PlayRecord};

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Numeric,
    String,
    Boolean,
    /// Short code drawn from a small vocabulary (team, play type, ...).
    Categorical,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Numeric => "numeric",
            ColumnType::String => "string",
            ColumnType::Boolean => "boolean",
            ColumnType::Categorical => "categorical",
        };
        f.write_str(name)
    }
}

/// Queryable columns of a play record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    GameId,
    PlayId,
    SequenceIndex,
    Posteam,
    Defteam,
    Quarter,
    GameClockSeconds,
    Down,
    YardsToGo,
    Yardline100,
    PosteamScore,
    DefteamScore,
    ScoreDifferential,
    TotalHomeScore,
    TotalAwayScore,
    PlayType,
    Description,
    Shotgun,
    NoHuddle,
    QbScramble,
    PasserPlayerName,
    ReceiverPlayerName,
    CompletePass,
    PassAttempt,
    AirYards,
    YardsAfterCatch,
    RusherPlayerName,
    RushAttempt,
    Touchdown,
    TdPlayerName,
    FieldGoalResult,
    KickDistance,
    YardsGained,
    FirstDown,
    Interception,
    Fumble,
    FumbleLost,
    Sack,
    Penalty,
    PenaltyType,
    PenaltyYards,
    Wp,
    Wpa,
    DriveId,
}

/// Static description of one column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub column: Column,
    pub name: &'static str,
    pub column_type: ColumnType,
    pub category: &'static str,
    pub aliases: &'static [&'static str],
}

const fn entry(
    column: Column,
    name: &'static str,
    column_type: ColumnType,
    category: &'static str,
    aliases: &'static [&'static str],
) -> ColumnSpec {
    ColumnSpec {
        column,
        name,
        column_type,
        category,
        aliases,
    }
}

use ColumnType::{Boolean, Categorical, Numeric, String as Text};

/// All registered columns, named after the nflverse play-by-play schema.
pub const COLUMNS: &[ColumnSpec] = &[
    entry(Column::GameId, "game_id", Categorical, "game_info", &[]),
    entry(Column::PlayId, "play_id", Numeric, "game_info", &[]),
    entry(Column::Posteam, "posteam", Categorical, "game_info", &["offense"]),
    entry(Column::Defteam, "defteam", Categorical, "game_info", &["defense"]),
    entry(Column::SequenceIndex, "sequence_index", Numeric, "play_situation", &["order_sequence"]),
    entry(Column::Quarter, "qtr", Numeric, "play_situation", &["quarter"]),
    entry(Column::GameClockSeconds, "game_clock_seconds", Numeric, "play_situation", &["quarter_seconds_remaining", "clock_seconds"]),
    entry(Column::Down, "down", Numeric, "play_situation", &[]),
    entry(Column::YardsToGo, "ydstogo", Numeric, "play_situation", &["yards_to_go"]),
    entry(Column::Yardline100, "yardline_100", Numeric, "play_situation", &[]),
    entry(Column::PosteamScore, "posteam_score", Numeric, "play_situation", &[]),
    entry(Column::DefteamScore, "defteam_score", Numeric, "play_situation", &[]),
    entry(Column::ScoreDifferential, "score_differential", Numeric, "play_situation", &[]),
    entry(Column::TotalHomeScore, "total_home_score", Numeric, "play_situation", &[]),
    entry(Column::TotalAwayScore, "total_away_score", Numeric, "play_situation", &[]),
    entry(Column::PlayType, "play_type", Categorical, "play_type", &[]),
    entry(Column::Description, "desc", Text, "play_type", &["description"]),
    entry(Column::Shotgun, "shotgun", Boolean, "play_type", &[]),
    entry(Column::NoHuddle, "no_huddle", Boolean, "play_type", &[]),
    entry(Column::QbScramble, "qb_scramble", Boolean, "play_type", &[]),
    entry(Column::PasserPlayerName, "passer_player_name", Text, "passing", &["passer"]),
    entry(Column::ReceiverPlayerName, "receiver_player_name", Text, "passing", &["receiver"]),
    entry(Column::CompletePass, "complete_pass", Boolean, "passing", &[]),
    entry(Column::PassAttempt, "pass_attempt", Boolean, "passing", &[]),
    entry(Column::AirYards, "air_yards", Numeric, "passing", &[]),
    entry(Column::YardsAfterCatch, "yards_after_catch", Numeric, "passing", &[]),
    entry(Column::RusherPlayerName, "rusher_player_name", Text, "rushing", &["rusher"]),
    entry(Column::RushAttempt, "rush_attempt", Boolean, "rushing", &[]),
    entry(Column::Touchdown, "touchdown", Boolean, "scoring", &[]),
    entry(Column::TdPlayerName, "td_player_name", Text, "scoring", &[]),
    entry(Column::FieldGoalResult, "field_goal_result", Categorical, "scoring", &[]),
    entry(Column::KickDistance, "kick_distance", Numeric, "scoring", &[]),
    entry(Column::YardsGained, "yards_gained", Numeric, "yards_and_results", &[]),
    entry(Column::FirstDown, "first_down", Boolean, "yards_and_results", &[]),
    entry(Column::Interception, "interception", Boolean, "turnovers", &[]),
    entry(Column::Fumble, "fumble", Boolean, "turnovers", &[]),
    entry(Column::FumbleLost, "fumble_lost", Boolean, "turnovers", &[]),
    entry(Column::Sack, "sack", Boolean, "defense_and_tackles", &[]),
    entry(Column::Penalty, "penalty", Boolean, "penalties", &[]),
    entry(Column::PenaltyType, "penalty_type", Categorical, "penalties", &[]),
    entry(Column::PenaltyYards, "penalty_yards", Numeric, "penalties", &[]),
    entry(Column::Wp, "wp", Numeric, "win_probability", &[]),
    entry(Column::Wpa, "wpa", Numeric, "win_probability", &[]),
    entry(Column::DriveId, "drive", Numeric, "drive_info", &["drive_id"]),
];

/// Column categories with the one-line description shown to the query parser.
pub const CATEGORIES: &[(&str, &str)] = &[
    ("game_info", "Game metadata: game id, play id, offense and defense teams"),
    ("play_situation", "Down, distance, field position, quarter, game clock, score, load order"),
    ("play_type", "Type of play (pass, run, punt, kickoff, field goal, ...), formation flags, play description text"),
    ("passing", "Passer, receiver, pass attempt, completion, air yards, yards after catch"),
    ("rushing", "Rusher and rush attempt"),
    ("scoring", "Touchdowns, touchdown scorer, field goal result and distance"),
    ("yards_and_results", "Yards gained and first downs"),
    ("turnovers", "Interceptions and fumbles"),
    ("defense_and_tackles", "Sacks"),
    ("penalties", "Penalty flag, type and yards"),
    ("win_probability", "Win probability (wp) and win probability added (wpa)"),
    ("drive_info", "Drive number"),
];

impl Column {
    pub fn entry(self) -> &'static ColumnSpec {
        COLUMNS
            .iter()
            .find(|spec| spec.column == self)
            .unwrap_or(&COLUMNS[0])
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn column_type(self) -> ColumnType {
        self.entry().column_type
    }
}

impl PlayRecord {
    /// Read a column's value off this record.
    pub fn value(&self, column: Column) -> FieldValue<'_> {
        match column {
            Column::GameId => FieldValue::from(&self.game_id),
            Column::PlayId => self.play_id.into(),
            Column::SequenceIndex => FieldValue::Number(self.sequence_index as f64),
            Column::Posteam => FieldValue::from(&self.posteam),
            Column::Defteam => FieldValue::from(&self.defteam),
            Column::Quarter => self.quarter.into(),
            Column::GameClockSeconds => self.game_clock_seconds.into(),
            Column::Down => self.down.into(),
            Column::YardsToGo => self.yards_to_go.into(),
            Column::Yardline100 => self.yardline_100.into(),
            Column::PosteamScore => self.posteam_score.into(),
            Column::DefteamScore => self.defteam_score.into(),
            Column::ScoreDifferential => match (self.posteam_score, self.defteam_score) {
                (Some(own), Some(other)) => FieldValue::Number((own - other) as f64),
                _ => FieldValue::Null,
            },
            Column::TotalHomeScore => self.total_home_score.into(),
            Column::TotalAwayScore => self.total_away_score.into(),
            Column::PlayType => FieldValue::from(&self.play_type),
            Column::Description => FieldValue::from(&self.description),
            Column::Shotgun => self.shotgun.into(),
            Column::NoHuddle => self.no_huddle.into(),
            Column::QbScramble => self.qb_scramble.into(),
            Column::PasserPlayerName => FieldValue::from(&self.passer_player_name),
            Column::ReceiverPlayerName => FieldValue::from(&self.receiver_player_name),
            Column::CompletePass => self.complete_pass.into(),
            Column::PassAttempt => self.pass_attempt.into(),
            Column::AirYards => self.air_yards.into(),
            Column::YardsAfterCatch => self.yards_after_catch.into(),
            Column::RusherPlayerName => FieldValue::from(&self.rusher_player_name),
            Column::RushAttempt => self.rush_attempt.into(),
            Column::Touchdown => self.touchdown.into(),
            Column::TdPlayerName => FieldValue::from(&self.td_player_name),
            Column::FieldGoalResult => FieldValue::from(&self.field_goal_result),
            Column::KickDistance => self.kick_distance.into(),
            Column::YardsGained => self.yards_gained.into(),
            Column::FirstDown => self.first_down.into(),
            Column::Interception => self.interception.into(),
            Column::Fumble => self.fumble.into(),
            Column::FumbleLost => self.fumble_lost.into(),
            Column::Sack => self.sack.into(),
            Column::Penalty => self.penalty.into(),
            Column::PenaltyType => FieldValue::from(&self.penalty_type),
            Column::PenaltyYards => self.penalty_yards.into(),
            Column::Wp => self.wp.into(),
            Column::Wpa => self.wpa.into(),
            Column::DriveId => self.drive_id.into(),
        }
    }
}

/// Name → column lookup, including aliases. Names are case-insensitive.
#[derive(Debug, Clone)]
pub struct ColumnRegistry {
    by_name: HashMap<String, Column>,
}

impl ColumnRegistry {
    /// Registry over every column in [`COLUMNS`].
    pub fn standard() -> Self {
        let mut by_name = HashMap::new();
        for spec in COLUMNS {
            by_name.insert(spec.name.to_string(), spec.column);
            for alias in spec.aliases {
                by_name.insert(alias.to_string(), spec.column);
            }
        }
        Self { by_name }
    }

    pub fn lookup(&self, name: &str) -> Option<Column> {
        self.by_name.get(&name.trim().to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        COLUMNS.len()
    }

    pub fn is_empty(&self) -> bool {
        COLUMNS.is_empty()
    }

    /// One line per category, for the parser to pick relevant categories from.
    pub fn category_summary(&self) -> String {
        CATEGORIES
            .iter()
            .map(|(name, description)| format!("- {}: {}", name, description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Deduplicated column names for the given categories, unknown names skipped.
    pub fn columns_for_categories(&self, names: &[String]) -> Vec<&'static str> {
        let mut columns = Vec::new();
        for name in names {
            for spec in COLUMNS.iter().filter(|spec| spec.category == name.as_str()) {
                if !columns.contains(&spec.name) {
                    columns.push(spec.name);
                }
            }
        }
        columns
    }
}

impl Default for ColumnRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_column_has_a_known_category() {
        for spec in COLUMNS {
            assert!(
                CATEGORIES.iter().any(|(name, _)| *name == spec.category),
                "column {} has unknown category {}",
                spec.name,
                spec.category
            );
        }
    }

    #[test]
    fn test_lookup_with_aliases() {
        let registry = ColumnRegistry::standard();
        assert_eq!(registry.lookup("qtr"), Some(Column::Quarter));
        assert_eq!(registry.lookup("Quarter"), Some(Column::Quarter));
        assert_eq!(registry.lookup("drive_id"), Some(Column::DriveId));
        assert_eq!(registry.lookup("yards_to_go"), Some(Column::YardsToGo));
        assert_eq!(registry.lookup("not_a_column"), None);
    }

    #[test]
    fn test_column_lookup_round_trips() {
        for spec in COLUMNS {
            assert_eq!(spec.column.name(), spec.name);
        }
    }

    #[test]
    fn test_columns_for_categories() {
        let registry = ColumnRegistry::standard();
        let columns = registry.columns_for_categories(&[
            "win_probability".to_string(),
            "bogus".to_string(),
            "win_probability".to_string(),
        ]);
        assert_eq!(columns, vec!["wp", "wpa"]);
        assert!(registry.category_summary().contains("- passing:"));
    }

    #[test]
    fn test_score_differential_is_derived() {
        let play = PlayRecord {
            posteam_score: Some(14),
            defteam_score: Some(24),
            ..PlayRecord::default()
        };
        assert_eq!(play.value(Column::ScoreDifferential), FieldValue::Number(-10.0));
        assert_eq!(PlayRecord::default().value(Column::ScoreDifferential), FieldValue::Null);
    }
}
