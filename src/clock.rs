//! Broadcast game clock helpers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a regulation quarter in game-clock seconds.
pub const QUARTER_SECONDS: u32 = 900;

/// Highest quarter number; 5 is overtime.
pub const MAX_QUARTER: u8 = 5;

/// A game clock reading: quarter plus seconds remaining in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameClock {
    pub quarter: u8,
    pub seconds_remaining: u32,
}

impl GameClock {
    pub fn new(quarter: u8, seconds_remaining: u32) -> Self {
        Self {
            quarter,
            seconds_remaining,
        }
    }

    /// Clock portion only, e.g. `8:34`
    pub fn time_str(&self) -> String {
        format_clock(self.seconds_remaining as f64)
    }

    pub fn is_valid(&self) -> bool {
        is_valid_quarter(self.quarter) && self.seconds_remaining <= QUARTER_SECONDS
    }
}

impl fmt::Display for GameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quarter >= MAX_QUARTER {
            write!(f, "OT {}", self.time_str())
        } else {
            write!(f, "Q{} {}", self.quarter, self.time_str())
        }
    }
}

pub fn is_valid_quarter(quarter: u8) -> bool {
    (1..=MAX_QUARTER).contains(&quarter)
}

/// Parse a `MM:SS` clock string into seconds remaining.
///
/// Readings longer than a quarter are rejected.
pub fn parse_clock(text: &str) -> Option<u32> {
    let (minutes, seconds) = text.trim().split_once(':')?;
    let minutes: u32 = minutes.trim().parse().ok()?;
    let seconds: u32 = seconds.trim().parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    minutes
        .checked_mul(60)
        .and_then(|total| total.checked_add(seconds))
        .filter(|&total| total <= QUARTER_SECONDS)
}

/// Format seconds remaining as `M:SS`.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u32;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Format a video offset as `HH:MM:SS` (or `MM:SS` under an hour).
pub fn format_offset(seconds: f64) -> String {
    let total = seconds.max(0.0);
    let hours = (total / 3600.0) as u32;
    let minutes = ((total % 3600.0) / 60.0) as u32;
    let secs = (total % 60.0) as u32;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
