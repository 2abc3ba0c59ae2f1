//! Calibration sample collection.
//!
//! Frame reading itself is external (a vision model behind [`ClockReader`]);
//! this module plans which offsets to read, fans the work out over a bounded
//! pool of tokio tasks and turns the answers into [`CalibrationSample`]s.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use super::CalibrationSample;
use crate::clock::{is_valid_quarter, parse_clock, MAX_QUARTER};
use crate::config::SamplingConfig;

/// What a reader saw in one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClockReading {
    Clock {
        quarter: u8,
        clock_seconds: f64,
        confidence: f64,
    },
    NoClock {
        label: Option<String>,
    },
}

/// Reads the broadcast game clock from the frame at a video offset.
#[async_trait]
pub trait ClockReader: Send + Sync {
    async fn read_clock_at(&self, video_offset_seconds: f64) -> Result<ClockReading>;
}

/// Parse a vision model's free-text answer.
///
/// Expected form is `QUARTER: 2` / `TIME: 8:34`, or `NO_CLOCK_VISIBLE`.
/// Overtime may be given as `QUARTER: OT`.
pub fn parse_clock_response(text: &str) -> ClockReading {
    if text.to_uppercase().contains("NO_CLOCK_VISIBLE") {
        return ClockReading::NoClock { label: None };
    }

    let mut quarter = None;
    if let Ok(re) = Regex::new(r"(?i)QUARTER:\s*(\d|OT)") {
        if let Some(caps) = re.captures(text) {
            quarter = match &caps[1] {
                q if q.eq_ignore_ascii_case("ot") => Some(MAX_QUARTER),
                q => q.parse::<u8>().ok().filter(|q| is_valid_quarter(*q)),
            };
        }
    }

    let mut clock = None;
    if let Ok(re) = Regex::new(r"(?i)TIME:\s*(\d{1,2}:\d{2})") {
        if let Some(caps) = re.captures(text) {
            clock = parse_clock(&caps[1]);
        }
    }

    match (quarter, clock) {
        (Some(quarter), Some(seconds)) => ClockReading::Clock {
            quarter,
            clock_seconds: seconds as f64,
            confidence: 1.0,
        },
        _ => ClockReading::NoClock {
            label: Some("unparsed".to_string()),
        },
    }
}

/// Offsets to read, in ascending order.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPlan {
    pub offsets: Vec<f64>,
    pub duration_seconds: f64,
}

impl SamplingPlan {
    /// One offset every `interval` seconds, starting at zero.
    pub fn every(duration_seconds: f64, interval: f64) -> Self {
        let mut offsets = Vec::new();
        if interval > 0.0 && duration_seconds > 0.0 {
            let count = (duration_seconds / interval).ceil() as usize;
            offsets = (0..count)
                .map(|i| i as f64 * interval)
                .filter(|o| *o < duration_seconds)
                .collect();
        }
        Self {
            offsets,
            duration_seconds,
        }
    }

    /// Split into at most `parts` contiguous, non-empty ranges.
    pub fn ranges(&self, parts: usize) -> Vec<Vec<f64>> {
        if self.offsets.is_empty() {
            return Vec::new();
        }
        let parts = parts.clamp(1, self.offsets.len());
        let chunk = self.offsets.len().div_ceil(parts);
        self.offsets.chunks(chunk).map(<[f64]>::to_vec).collect()
    }

    /// The planned offset and its ±k·step neighbours, nearest first,
    /// clipped to the video.
    pub fn attempts(&self, offset: f64, retries: u32, step: f64) -> Vec<f64> {
        let mut attempts = vec![offset];
        for k in 1..=retries {
            let delta = k as f64 * step;
            for candidate in [offset + delta, offset - delta] {
                if candidate >= 0.0 && candidate < self.duration_seconds {
                    attempts.push(candidate);
                }
            }
        }
        attempts
    }
}

/// Drives a [`ClockReader`] over a sampling plan with bounded concurrency.
pub struct SampleCollector {
    reader: Arc<dyn ClockReader>,
    config: SamplingConfig,
    worker_semaphore: Arc<Semaphore>,
}

impl SampleCollector {
    pub fn new(reader: Arc<dyn ClockReader>, config: SamplingConfig) -> Self {
        let workers = config.workers.max(1);
        info!("🔧 Initializing SampleCollector with {} workers", workers);
        Self {
            reader,
            config,
            worker_semaphore: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Read every planned offset. Samples come back sorted by offset; the
    /// index builder does not depend on that order.
    pub async fn collect(&self, plan: &SamplingPlan) -> Vec<CalibrationSample> {
        let start_time = Instant::now();
        let ranges = plan.ranges(self.config.workers.max(1));
        let total_ranges = ranges.len();
        info!(
            "🎞️ Sampling {} offsets in {} range(s)",
            plan.offsets.len(),
            total_ranges
        );

        let (tx, mut rx) = mpsc::channel(total_ranges.max(1));

        for (index, range) in ranges.into_iter().enumerate() {
            let reader = Arc::clone(&self.reader);
            let semaphore = Arc::clone(&self.worker_semaphore);
            let tx = tx.clone();
            let plan = plan.clone();
            let retries = self.config.max_retries;
            let step = self.config.retry_step_seconds;

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    error!("Worker pool closed before range {} started", index + 1);
                    return;
                };
                debug!("Range {}/{}: {} offsets", index + 1, total_ranges, range.len());

                let mut samples = Vec::with_capacity(range.len());
                for offset in range {
                    samples.push(read_with_retries(reader.as_ref(), &plan, offset, retries, step).await);
                }

                if let Err(e) = tx.send(samples).await {
                    error!("Failed to send samples: {}", e);
                }
            });
        }

        drop(tx);

        let mut samples = Vec::new();
        while let Some(batch) = rx.recv().await {
            samples.extend(batch);
        }
        samples.sort_by(|a, b| a.video_offset_seconds.total_cmp(&b.video_offset_seconds));

        let readings = samples.iter().filter(|s| !s.is_no_clock()).count();
        info!(
            "✅ Collected {} samples ({} with a clock) in {:.2}s",
            samples.len(),
            readings,
            start_time.elapsed().as_secs_f64()
        );
        samples
    }
}

async fn read_with_retries(
    reader: &dyn ClockReader,
    plan: &SamplingPlan,
    offset: f64,
    retries: u32,
    step: f64,
) -> CalibrationSample {
    let mut first_label = None;

    for attempt in plan.attempts(offset, retries, step) {
        match reader.read_clock_at(attempt).await {
            Ok(ClockReading::Clock {
                quarter,
                clock_seconds,
                confidence,
            }) => {
                return CalibrationSample::reading(attempt, quarter, clock_seconds, confidence);
            }
            Ok(ClockReading::NoClock { label }) => {
                if first_label.is_none() {
                    first_label = label;
                }
            }
            Err(e) => {
                warn!("Clock read failed at {:.1}s: {}", attempt, e);
                if first_label.is_none() {
                    first_label = Some("unreadable".to_string());
                }
            }
        }
    }

    CalibrationSample::no_clock(offset, first_label)
}

/// Load a JSON array of calibration samples.
pub async fn load_samples(path: &Path) -> Result<Vec<CalibrationSample>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read samples file {}", path.display()))?;
    let samples: Vec<CalibrationSample> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse samples file {}", path.display()))?;
    info!("📥 Loaded {} calibration samples from {}", samples.len(), path.display());
    Ok(samples)
}
