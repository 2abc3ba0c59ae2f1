//! Game clock → video offset resolution against a [`VideoTimeIndex`]
use serde::Serialize;
use tracing::debug;

use crate::clock::{format_clock, is_valid_quarter, QUARTER_SECONDS};
use crate::config::ResolverConfig;
use crate::error::ResolutionError;
use crate::index::{VideoCalibrationPoint, VideoTimeIndex};
use crate::plays::PlayRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Exact,
    Interpolated,
    Extrapolated,
}

/// A resolved video offset and how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Resolution {
    pub offset_seconds: f64,
    pub method: ResolutionMethod,
    /// Set when the raw estimate fell inside a dead zone and was moved to its end
    pub shifted_past_dead_zone: bool,
}

/// Resolves (quarter, clock) pairs. Pure and synchronous.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn resolve_play(&self, index: &VideoTimeIndex, play: &PlayRecord) -> Result<Resolution, ResolutionError> {
        match (play.quarter, play.game_clock_seconds) {
            (Some(quarter), Some(clock)) => self.resolve(index, quarter, clock as f64),
            _ => Err(ResolutionError::MissingGameClock {
                sequence_index: play.sequence_index,
            }),
        }
    }

    pub fn resolve(&self, index: &VideoTimeIndex, quarter: u8, clock_seconds: f64) -> Result<Resolution, ResolutionError> {
        if !is_valid_quarter(quarter)
            || !clock_seconds.is_finite()
            || !(0.0..=QUARTER_SECONDS as f64).contains(&clock_seconds)
        {
            return Err(ResolutionError::InvalidClock {
                quarter,
                clock_seconds,
            });
        }

        let timeline = index
            .quarter(quarter)
            .ok_or(ResolutionError::QuarterUnavailable { quarter })?;
        if timeline.degraded || timeline.points.len() < 2 {
            return Err(ResolutionError::QuarterDegraded {
                quarter,
                points: timeline.points.len(),
            });
        }
        let points = &timeline.points;

        // Nearest point within tolerance wins outright.
        let nearest = points
            .iter()
            .map(|p| (p, (p.clock_seconds - clock_seconds).abs()))
            .filter(|(_, distance)| *distance <= self.config.exact_tolerance_seconds)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((point, _)) = nearest {
            return Ok(Resolution {
                offset_seconds: point.video_offset_seconds,
                method: ResolutionMethod::Exact,
                shifted_past_dead_zone: false,
            });
        }

        let (raw, method) = match points
            .windows(2)
            .find(|pair| pair[0].clock_seconds > clock_seconds && clock_seconds > pair[1].clock_seconds)
        {
            Some(pair) => (interpolate(&pair[0], &pair[1], clock_seconds), ResolutionMethod::Interpolated),
            None => (self.extrapolate(points, clock_seconds), ResolutionMethod::Extrapolated),
        };

        let upper = index.duration_seconds.unwrap_or(f64::INFINITY);
        let offset = raw.clamp(0.0, upper.max(0.0));

        let Some(zone) = index.dead_zone_at(offset) else {
            return Ok(Resolution {
                offset_seconds: offset,
                method,
                shifted_past_dead_zone: false,
            });
        };

        // Moving past the zone must keep us inside this quarter's footage.
        let shifted = zone.end_seconds;
        let still_in_quarter = points.iter().any(|p| p.video_offset_seconds >= shifted);
        if !still_in_quarter {
            return Err(ResolutionError::DeadZone {
                quarter,
                clock: format_clock(clock_seconds),
                zone_start: zone.start_seconds,
                zone_end: zone.end_seconds,
            });
        }

        debug!(
            "Q{} {} shifted out of dead zone {:.1}-{:.1}s",
            quarter,
            format_clock(clock_seconds),
            zone.start_seconds,
            zone.end_seconds
        );
        Ok(Resolution {
            offset_seconds: shifted,
            method,
            shifted_past_dead_zone: true,
        })
    }

    /// Straight-line extension from the two points nearest the target.
    fn extrapolate(&self, points: &[VideoCalibrationPoint], clock_seconds: f64) -> f64 {
        let (anchor, slope) = match points {
            [first, second, ..] if clock_seconds > first.clock_seconds => (first, self.slope(first, second)),
            [.., before_last, last] => (last, self.slope(before_last, last)),
            // callers guarantee at least two points
            _ => return 0.0,
        };
        anchor.video_offset_seconds + (anchor.clock_seconds - clock_seconds) * slope
    }

    /// Video seconds per game second between two points.
    fn slope(&self, earlier: &VideoCalibrationPoint, later: &VideoCalibrationPoint) -> f64 {
        let clock_span = earlier.clock_seconds - later.clock_seconds;
        let slope = (later.video_offset_seconds - earlier.video_offset_seconds) / clock_span;
        if slope.is_finite() && slope > 0.0 {
            slope
        } else {
            self.config.nominal_video_per_game_second
        }
    }
}

fn interpolate(prev: &VideoCalibrationPoint, next: &VideoCalibrationPoint, clock_seconds: f64) -> f64 {
    prev.video_offset_seconds
        + (prev.clock_seconds - clock_seconds) / (prev.clock_seconds - next.clock_seconds)
            * (next.video_offset_seconds - prev.video_offset_seconds)
}
