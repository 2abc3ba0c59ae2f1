//! Builds a [`VideoTimeIndex`] from noisy calibration samples.
//!
//! Samples arrive duplicated, out of order and occasionally wrong. The build
//! is a single deterministic pass over a fully sorted copy of the stream:
//! filter, group by quarter, keep the longest run whose offsets never go
//! backwards as the clock runs down, collapse same-second readings to their
//! median offset, then derive dead zones.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::{
    CalibrationSample, DeadZone, QuarterTimeline, VideoCalibrationPoint, VideoIdentity,
    VideoTimeIndex, SCHEMA_VERSION,
};
use crate::clock::{is_valid_quarter, QUARTER_SECONDS};
use crate::config::IndexConfig;
use crate::error::IndexBuildError;

/// Counters and problems from one build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub total_samples: usize,
    /// Below confidence threshold, out of range, or partial readings
    pub discarded: usize,
    /// Readings dropped by the monotonicity pass
    pub rejected_outliers: usize,
    /// Readings merged into an existing clock bucket
    pub merged_duplicates: usize,
    pub no_clock_samples: usize,
    pub accepted_points: usize,
    pub dead_zones: usize,
    #[serde(skip)]
    pub errors: Vec<IndexBuildError>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Index builder configured from the `[index]` config section.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    config: IndexConfig,
}

fn sample_order(a: &CalibrationSample, b: &CalibrationSample) -> Ordering {
    a.video_offset_seconds
        .total_cmp(&b.video_offset_seconds)
        .then_with(|| a.quarter.cmp(&b.quarter))
        .then_with(|| {
            a.clock_seconds
                .unwrap_or(-1.0)
                .total_cmp(&b.clock_seconds.unwrap_or(-1.0))
        })
        .then_with(|| a.confidence.total_cmp(&b.confidence))
        .then_with(|| a.label.cmp(&b.label))
}

impl IndexBuilder {
    pub fn new(config: IndexConfig) -> Self {
        Self { config }
    }

    /// Build an index. Never fails: problems land in the report and the
    /// affected quarters are marked degraded.
    pub fn build(
        &self,
        video: VideoIdentity,
        duration_seconds: Option<f64>,
        samples: &[CalibrationSample],
    ) -> (VideoTimeIndex, BuildReport) {
        let mut report = BuildReport {
            total_samples: samples.len(),
            ..BuildReport::default()
        };

        let mut sorted: Vec<CalibrationSample> = samples.to_vec();
        sorted.sort_by(sample_order);

        let mut readings: BTreeMap<u8, Vec<VideoCalibrationPoint>> = BTreeMap::new();
        let mut no_clock: Vec<&CalibrationSample> = Vec::new();

        for sample in &sorted {
            if !self.is_usable(sample) {
                report.discarded += 1;
                continue;
            }
            match (sample.quarter, sample.clock_seconds) {
                (Some(quarter), Some(clock)) => {
                    readings.entry(quarter).or_default().push(VideoCalibrationPoint {
                        quarter,
                        clock_seconds: clock,
                        video_offset_seconds: sample.video_offset_seconds,
                        confidence: sample.confidence,
                    })
                }
                (None, None) => no_clock.push(sample),
                _ => report.discarded += 1,
            }
        }
        report.no_clock_samples = no_clock.len();

        let mut quarters = Vec::new();
        for (quarter, candidates) in readings {
            let total = candidates.len();
            let accepted = longest_monotonic_run(candidates);
            report.rejected_outliers += total - accepted.len();

            let before_merge = accepted.len();
            let points = collapse_buckets(accepted);
            report.merged_duplicates += before_merge - points.len();

            let degraded = points.len() < 2;
            if degraded {
                warn!("⚠️ Q{} has only {} calibration point(s), marking degraded", quarter, points.len());
                report.errors.push(IndexBuildError::DegradedQuarter {
                    quarter,
                    accepted: points.len(),
                });
            }
            report.accepted_points += points.len();
            quarters.push(QuarterTimeline {
                quarter,
                points,
                degraded,
            });
        }

        if quarters.is_empty() {
            warn!("⚠️ No usable calibration samples ({} discarded)", report.discarded);
            report.errors.push(IndexBuildError::NoUsableSamples {
                discarded: report.discarded,
            });
        }

        let dead_zones = self.dead_zones(&quarters, &no_clock);
        report.dead_zones = dead_zones.len();

        info!(
            "📐 Built time index for {}: {} points across {} quarter(s), {} dead zone(s), {} outlier(s) rejected",
            video.video_id,
            report.accepted_points,
            quarters.len(),
            report.dead_zones,
            report.rejected_outliers
        );

        let index = VideoTimeIndex {
            schema_version: SCHEMA_VERSION,
            video,
            built_at: Utc::now(),
            duration_seconds,
            quarters,
            dead_zones,
        };
        (index, report)
    }

    fn is_usable(&self, sample: &CalibrationSample) -> bool {
        if !sample.video_offset_seconds.is_finite() || sample.video_offset_seconds < 0.0 {
            return false;
        }
        if sample.confidence.is_nan() || sample.confidence < self.config.confidence_threshold {
            return false;
        }
        if let Some(quarter) = sample.quarter {
            if !is_valid_quarter(quarter) {
                return false;
            }
        }
        if let Some(clock) = sample.clock_seconds {
            if !(0.0..=QUARTER_SECONDS as f64).contains(&clock) {
                return false;
            }
        }
        true
    }

    /// Gap zones between consecutive accepted points plus runs of no-clock
    /// samples, merged when closer than the tolerance.
    fn dead_zones(&self, quarters: &[QuarterTimeline], no_clock: &[&CalibrationSample]) -> Vec<DeadZone> {
        let mut offsets: Vec<f64> = quarters
            .iter()
            .flat_map(|t| t.points.iter().map(|p| p.video_offset_seconds))
            .collect();
        offsets.sort_by(f64::total_cmp);

        let mut zones = Vec::new();
        for pair in offsets.windows(2) {
            if pair[1] - pair[0] > self.config.min_gap_seconds {
                zones.push(DeadZone {
                    start_seconds: pair[0],
                    end_seconds: pair[1],
                    label: None,
                });
            }
        }

        // A run is broken by any accepted point after the previous no-clock
        // sample, up to and including the current one.
        let mut run: Vec<&CalibrationSample> = Vec::new();
        let flush = |run: &mut Vec<&CalibrationSample>, zones: &mut Vec<DeadZone>| {
            if let (Some(first), Some(last)) = (run.first(), run.last()) {
                if last.video_offset_seconds > first.video_offset_seconds {
                    zones.push(DeadZone {
                        start_seconds: first.video_offset_seconds,
                        end_seconds: last.video_offset_seconds,
                        label: run.iter().find_map(|s| s.label.clone()),
                    });
                }
            }
            run.clear();
        };
        for &sample in no_clock {
            if let Some(previous) = run.last() {
                let interrupted = has_point_within(
                    &offsets,
                    previous.video_offset_seconds,
                    sample.video_offset_seconds,
                );
                if interrupted {
                    flush(&mut run, &mut zones);
                }
            }
            run.push(sample);
        }
        flush(&mut run, &mut zones);

        let merged = merge_zones(zones, self.config.merge_tolerance_seconds, &offsets);
        debug!("Derived {} dead zone(s)", merged.len());
        merged
    }
}

/// Longest subsequence whose offsets are non-decreasing, with candidates
/// already ordered by clock descending. Patience method, O(n log n); among
/// equally long runs the one ending earliest in input order wins.
fn longest_monotonic_run(mut candidates: Vec<VideoCalibrationPoint>) -> Vec<VideoCalibrationPoint> {
    // Whole-second buckets first, so jittered readings of one clock value
    // stay in offset order and survive together until they are collapsed.
    candidates.sort_by(|a, b| {
        b.clock_seconds
            .round()
            .total_cmp(&a.clock_seconds.round())
            .then_with(|| a.video_offset_seconds.total_cmp(&b.video_offset_seconds))
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });

    // tails[k]: index of the smallest tail offset of a run of length k+1
    let mut tails: Vec<usize> = Vec::new();
    let mut parent: Vec<Option<usize>> = vec![None; candidates.len()];

    for (i, point) in candidates.iter().enumerate() {
        let offset = point.video_offset_seconds;
        // first tail strictly greater than offset (non-decreasing runs)
        let slot = tails.partition_point(|&t| candidates[t].video_offset_seconds <= offset);
        parent[i] = slot.checked_sub(1).map(|s| tails[s]);
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }

    let mut run = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        run.push(candidates[i]);
        cursor = parent[i];
    }
    run.reverse();
    run
}

/// Collapse readings sharing a whole-second clock into one point at the
/// median offset with the highest confidence.
fn collapse_buckets(points: Vec<VideoCalibrationPoint>) -> Vec<VideoCalibrationPoint> {
    let mut collapsed: Vec<VideoCalibrationPoint> = Vec::new();
    let mut bucket: Vec<VideoCalibrationPoint> = Vec::new();

    let finish = |bucket: &mut Vec<VideoCalibrationPoint>, out: &mut Vec<VideoCalibrationPoint>| {
        if let Some(first) = bucket.first() {
            let mut offsets: Vec<f64> = bucket.iter().map(|p| p.video_offset_seconds).collect();
            offsets.sort_by(f64::total_cmp);
            let mid = offsets.len() / 2;
            let median = if offsets.len() % 2 == 0 {
                (offsets[mid - 1] + offsets[mid]) / 2.0
            } else {
                offsets[mid]
            };
            out.push(VideoCalibrationPoint {
                quarter: first.quarter,
                clock_seconds: first.clock_seconds.round(),
                video_offset_seconds: median,
                confidence: bucket.iter().map(|p| p.confidence).fold(f64::MIN, f64::max),
            });
        }
        bucket.clear();
    };

    for point in points {
        let same_bucket = bucket
            .first()
            .map_or(false, |b| b.clock_seconds.round() == point.clock_seconds.round());
        if !same_bucket {
            finish(&mut bucket, &mut collapsed);
        }
        bucket.push(point);
    }
    finish(&mut bucket, &mut collapsed);
    collapsed
}

/// Whether any accepted offset lies strictly between `a` and `b`.
fn has_point_between(sorted_offsets: &[f64], a: f64, b: f64) -> bool {
    let from = sorted_offsets.partition_point(|&o| o <= a);
    sorted_offsets.get(from).map_or(false, |&o| o < b)
}

/// Whether any accepted offset lies in `(a, b]`.
fn has_point_within(sorted_offsets: &[f64], a: f64, b: f64) -> bool {
    let from = sorted_offsets.partition_point(|&o| o <= a);
    sorted_offsets.get(from).map_or(false, |&o| o <= b)
}

fn merge_zones(mut zones: Vec<DeadZone>, tolerance: f64, point_offsets: &[f64]) -> Vec<DeadZone> {
    zones.sort_by(|a, b| {
        a.start_seconds
            .total_cmp(&b.start_seconds)
            .then_with(|| a.end_seconds.total_cmp(&b.end_seconds))
    });

    let mut merged: Vec<DeadZone> = Vec::new();
    for zone in zones {
        if let Some(current) = merged.last_mut() {
            let gap = zone.start_seconds - current.end_seconds;
            // never swallow an accepted point into the merged zone
            let joins_at_point = point_offsets.contains(&current.end_seconds)
                || point_offsets.contains(&zone.start_seconds)
                || has_point_between(point_offsets, current.end_seconds, zone.start_seconds);
            if gap < 0.0 || (gap <= tolerance && !joins_at_point) {
                current.end_seconds = current.end_seconds.max(zone.end_seconds);
                if current.label.is_none() {
                    current.label = zone.label;
                }
                continue;
            }
        }
        merged.push(zone);
    }
    merged
}
