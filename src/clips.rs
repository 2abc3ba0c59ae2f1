//! Clip windows around resolved plays
use serde::{Deserialize, Serialize};

use crate::clock::format_offset;
use crate::config::ClipConfig;
use crate::index::VideoTimeIndex;
use crate::plays::PlayRecord;
use crate::resolver::{Resolution, ResolutionMethod};

/// Per-request overrides of the configured clip settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipRequestOptions {
    #[serde(default)]
    pub post_play_buffer_seconds: Option<f64>,
}

/// A playable clip plus the play fields needed to display it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipTimestamp {
    pub start_offset: f64,
    pub end_offset: f64,
    /// Start as `HH:MM:SS` (`MM:SS` under an hour)
    pub start_display: String,
    /// Length before capping at the video end or the next play
    pub nominal_duration: f64,
    pub resolution: ResolutionMethod,
    pub sequence_index: usize,
    pub game_id: Option<String>,
    pub play_id: Option<f64>,
    pub quarter: Option<u8>,
    /// Game clock, e.g. `8:34`
    pub clock: Option<String>,
    pub description: Option<String>,
    pub play_type: Option<String>,
    pub yards_gained: Option<i32>,
    pub passer: Option<String>,
    pub rusher: Option<String>,
    pub receiver: Option<String>,
    pub touchdown_scorer: Option<String>,
    pub touchdown: bool,
    pub interception: bool,
    pub fumble: bool,
    pub wpa: Option<f64>,
}

impl ClipTimestamp {
    pub fn duration(&self) -> f64 {
        self.end_offset - self.start_offset
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClipBoundaryCalculator {
    config: ClipConfig,
}

impl ClipBoundaryCalculator {
    pub fn new(config: ClipConfig) -> Self {
        Self { config }
    }

    pub fn base_duration(&self, play_type: Option<&str>) -> f64 {
        match play_type.map(|t| t.trim().to_lowercase()).as_deref() {
            Some("pass") | Some("run") => self.config.base_scrimmage_seconds,
            Some("kickoff") | Some("punt") => self.config.base_kick_seconds,
            _ => self.config.base_default_seconds,
        }
    }

    /// Non-decreasing in yards; losses earn nothing.
    pub fn yards_bonus(&self, yards_gained: Option<i32>) -> f64 {
        let yards = yards_gained.unwrap_or(0).max(0) as f64;
        (yards * self.config.yards_bonus_per_yard).min(self.config.max_yards_bonus_seconds)
    }

    /// Uncapped clip length for a play.
    pub fn duration(&self, play: &PlayRecord, options: &ClipRequestOptions) -> f64 {
        let mut duration = self.base_duration(play.play_type.as_deref()) + self.yards_bonus(play.yards_gained);
        if play.is_touchdown() {
            duration += self.config.touchdown_bonus_seconds;
        }
        if play.is_turnover() {
            duration += self.config.turnover_bonus_seconds;
        }
        duration
            + options
                .post_play_buffer_seconds
                .unwrap_or(self.config.post_play_buffer_seconds)
                .max(0.0)
    }

    /// Start and end offsets for a play resolved at `resolved_offset`.
    ///
    /// `next_play_offset` is the following play's resolved offset when known;
    /// the clip stops a safety margin short of it if that leaves a window.
    /// A next offset at or before `resolved_offset` is ignored.
    pub fn window(
        &self,
        index: &VideoTimeIndex,
        play: &PlayRecord,
        resolved_offset: f64,
        next_play_offset: Option<f64>,
        options: &ClipRequestOptions,
    ) -> (f64, f64) {
        let video_end = index.duration_seconds.unwrap_or(f64::INFINITY);

        let mut start = (resolved_offset - self.config.pre_buffer_seconds).max(0.0);
        if let Some(zone) = index.dead_zone_at(start) {
            start = zone.end_seconds;
        }
        start = start.min(video_end);

        let limit = next_play_offset
            .filter(|&next| next > resolved_offset)
            .map(|next| next - self.config.next_play_margin_seconds)
            .filter(|&cap| cap > start)
            .map_or(video_end, |cap| cap.min(video_end));

        let mut end = (start + self.duration(play, options)).min(limit);
        if let Some(zone) = index.dead_zone_at(end) {
            end = if zone.start_seconds > start {
                zone.start_seconds
            } else if zone.end_seconds <= limit {
                zone.end_seconds
            } else {
                // no room past the zone
                start
            };
        }

        (start, end.max(start))
    }

    pub fn clip(
        &self,
        index: &VideoTimeIndex,
        play: &PlayRecord,
        resolution: &Resolution,
        next_play_offset: Option<f64>,
        options: &ClipRequestOptions,
    ) -> ClipTimestamp {
        let (start, end) = self.window(index, play, resolution.offset_seconds, next_play_offset, options);
        ClipTimestamp {
            start_offset: start,
            end_offset: end,
            start_display: format_offset(start),
            nominal_duration: self.duration(play, options),
            resolution: resolution.method,
            sequence_index: play.sequence_index,
            game_id: play.game_id.clone(),
            play_id: play.play_id,
            quarter: play.quarter,
            clock: play.clock_display(),
            description: play.description.clone(),
            play_type: play.play_type.clone(),
            yards_gained: play.yards_gained,
            passer: play.passer_player_name.clone(),
            rusher: play.rusher_player_name.clone(),
            receiver: play.receiver_player_name.clone(),
            touchdown_scorer: play.td_player_name.clone(),
            touchdown: play.is_touchdown(),
            interception: play.interception.unwrap_or(false),
            fumble: play.fumble.unwrap_or(false),
            wpa: play.wpa,
        }
    }
}
