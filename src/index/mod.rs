//! Video time index: maps broadcast game clock readings to video offsets.
//!
//! The index is built once per video from noisy calibration samples
//! ([`IndexBuilder`]), persisted ([`IndexStore`]) and then only read. Readers
//! share it through [`SharedIndex`], which swaps whole indexes atomically.

pub mod builder;
pub mod handle;
pub mod sampler;
pub mod store;

pub use builder::{BuildReport, IndexBuilder};
pub use handle::SharedIndex;
pub use sampler::{
    load_samples, parse_clock_response, ClockReader, ClockReading, SampleCollector, SamplingPlan,
};
pub use store::{IndexStore, IndexStoreStats, StoredIndexInfo};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::clock::{is_valid_quarter, QUARTER_SECONDS};
use crate::error::CacheCorruptionError;

/// Bumped whenever the persisted layout changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Bytes of the video file hashed into its fingerprint.
const FINGERPRINT_BYTES: usize = 1024 * 1024;

/// One raw observation from the frame reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub video_offset_seconds: f64,
    /// Absent when the frame showed no game clock
    #[serde(default)]
    pub quarter: Option<u8>,
    #[serde(default)]
    pub clock_seconds: Option<f64>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Free-form note from the reader, e.g. "halftime"
    #[serde(default)]
    pub label: Option<String>,
}

fn default_confidence() -> f64 {
    1.0
}

impl CalibrationSample {
    pub fn reading(video_offset_seconds: f64, quarter: u8, clock_seconds: f64, confidence: f64) -> Self {
        Self {
            video_offset_seconds,
            quarter: Some(quarter),
            clock_seconds: Some(clock_seconds),
            confidence,
            label: None,
        }
    }

    pub fn no_clock(video_offset_seconds: f64, label: Option<String>) -> Self {
        Self {
            video_offset_seconds,
            quarter: None,
            clock_seconds: None,
            confidence: 1.0,
            label,
        }
    }

    pub fn is_no_clock(&self) -> bool {
        self.quarter.is_none() && self.clock_seconds.is_none()
    }
}

/// Accepted mapping from a game clock reading to a video offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoCalibrationPoint {
    pub quarter: u8,
    pub clock_seconds: f64,
    pub video_offset_seconds: f64,
    pub confidence: f64,
}

/// Offset range with no usable game clock (halftime, breaks, replays).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadZone {
    pub start_seconds: f64,
    pub end_seconds: f64,
    #[serde(default)]
    pub label: Option<String>,
}

impl DeadZone {
    /// Open-interval membership; the boundaries themselves are playable.
    pub fn contains_strictly(&self, offset: f64) -> bool {
        offset > self.start_seconds && offset < self.end_seconds
    }

    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// Calibration points of one quarter, ordered by decreasing clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterTimeline {
    pub quarter: u8,
    pub points: Vec<VideoCalibrationPoint>,
    pub degraded: bool,
}

impl QuarterTimeline {
    pub fn first_offset(&self) -> Option<f64> {
        self.points.first().map(|p| p.video_offset_seconds)
    }

    pub fn last_offset(&self) -> Option<f64> {
        self.points.last().map(|p| p.video_offset_seconds)
    }
}

/// Identity of a video file, used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoIdentity {
    pub video_id: String,
    pub fingerprint: String,
}

impl VideoIdentity {
    /// Identity for a video known only by name (e.g. samples gathered elsewhere).
    pub fn named(video_id: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            fingerprint: format!("{:x}", md5::compute(video_id.as_bytes())),
        }
    }

    /// Fingerprint a video file from its size and leading bytes.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat video {}", path.display()))?;

        let mut file = tokio::fs::File::open(path).await?;
        let mut head = Vec::with_capacity(FINGERPRINT_BYTES.min(metadata.len() as usize));
        (&mut file)
            .take(FINGERPRINT_BYTES as u64)
            .read_to_end(&mut head)
            .await?;

        let mut context = md5::Context::new();
        context.consume(metadata.len().to_le_bytes());
        context.consume(&head);

        let video_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());

        Ok(Self {
            video_id,
            fingerprint: format!("{:x}", context.compute()),
        })
    }

    /// File-system safe cache key, e.g. `sf_at_pit_2023_3f2a9c1b0d4e`.
    pub fn cache_key(&self) -> String {
        let stem: String = self
            .video_id
            .chars()
            .take(40)
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let short: String = self.fingerprint.chars().take(12).collect();
        format!("{}_{}", stem, short)
    }
}

/// Immutable calibration table for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTimeIndex {
    pub schema_version: u32,
    pub video: VideoIdentity,
    pub built_at: DateTime<Utc>,
    /// Video length, when known; bounds extrapolation and clip ends
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    /// One timeline per quarter seen in the samples, ascending by quarter
    pub quarters: Vec<QuarterTimeline>,
    /// Sorted, non-overlapping
    pub dead_zones: Vec<DeadZone>,
}

impl VideoTimeIndex {
    pub fn empty(video: VideoIdentity) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            video,
            built_at: Utc::now(),
            duration_seconds: None,
            quarters: Vec::new(),
            dead_zones: Vec::new(),
        }
    }

    pub fn quarter(&self, quarter: u8) -> Option<&QuarterTimeline> {
        self.quarters.iter().find(|t| t.quarter == quarter)
    }

    pub fn degraded_quarters(&self) -> Vec<u8> {
        self.quarters
            .iter()
            .filter(|t| t.degraded)
            .map(|t| t.quarter)
            .collect()
    }

    pub fn point_count(&self) -> usize {
        self.quarters.iter().map(|t| t.points.len()).sum()
    }

    /// The dead zone strictly containing `offset`, if any.
    pub fn dead_zone_at(&self, offset: f64) -> Option<&DeadZone> {
        self.dead_zones.iter().find(|z| z.contains_strictly(offset))
    }

    /// Check the structural invariants a loaded index must satisfy.
    pub fn check_invariants(&self) -> Result<(), CacheCorruptionError> {
        let fail = |msg: String| Err(CacheCorruptionError::Invariant(msg));

        for (i, timeline) in self.quarters.iter().enumerate() {
            if !is_valid_quarter(timeline.quarter) {
                return fail(format!("invalid quarter {}", timeline.quarter));
            }
            if i > 0 && self.quarters[i - 1].quarter >= timeline.quarter {
                return fail("quarters are not strictly ascending".to_string());
            }
            if timeline.degraded != (timeline.points.len() < 2) {
                return fail(format!("degraded flag inconsistent for Q{}", timeline.quarter));
            }
            for point in &timeline.points {
                let in_range = point.quarter == timeline.quarter
                    && (0.0..=QUARTER_SECONDS as f64).contains(&point.clock_seconds)
                    && point.video_offset_seconds.is_finite()
                    && point.video_offset_seconds >= 0.0;
                if !in_range {
                    return fail(format!("point out of range in Q{}", timeline.quarter));
                }
            }
            for pair in timeline.points.windows(2) {
                if pair[1].clock_seconds >= pair[0].clock_seconds
                    || pair[1].video_offset_seconds < pair[0].video_offset_seconds
                {
                    return fail(format!("Q{} offsets are not monotonic", timeline.quarter));
                }
            }
        }

        for zone in &self.dead_zones {
            if !(zone.start_seconds.is_finite() && zone.end_seconds > zone.start_seconds) {
                return fail(format!(
                    "dead zone [{}, {}] is empty",
                    zone.start_seconds, zone.end_seconds
                ));
            }
        }
        for pair in self.dead_zones.windows(2) {
            if pair[1].start_seconds < pair[0].end_seconds {
                return fail("dead zones overlap or are unsorted".to_string());
            }
        }

        Ok(())
    }

    pub fn summary(&self) -> String {
        let quarters: Vec<String> = self
            .quarters
            .iter()
            .map(|t| {
                format!(
                    "Q{}: {} points{}",
                    t.quarter,
                    t.points.len(),
                    if t.degraded { " (degraded)" } else { "" }
                )
            })
            .collect();
        format!(
            "{} [{}], {} dead zone(s)",
            self.video.video_id,
            quarters.join(", "),
            self.dead_zones.len()
        )
    }
}
