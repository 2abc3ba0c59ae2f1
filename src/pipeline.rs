//! Query → resolve → clip, end to end.
//!
//! [`ClipSearchPipeline`] is the pure, synchronous core. [`ClipEngine`] wraps
//! it with the session state: the shared play table and the swappable index.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::clips::{ClipBoundaryCalculator, ClipRequestOptions, ClipTimestamp};
use crate::config::Config;
use crate::error::{QueryValidationError, ResolutionError};
use crate::index::{BuildReport, CalibrationSample, IndexBuilder, IndexStore, SharedIndex, VideoTimeIndex};
use crate::plays::{ColumnRegistry, PlayRecord, PlayTable};
use crate::query::{CompiledQuery, QueryExecutor, QueryValidator, StructuredQuery};
use crate::resolver::Resolver;

/// A matched play that could not be placed in the video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedPlay {
    pub sequence_index: usize,
    pub play_id: Option<f64>,
    pub description: Option<String>,
    pub reason: String,
    #[serde(skip)]
    pub error: ResolutionError,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClipSearchResult {
    /// In executor order
    pub clips: Vec<ClipTimestamp>,
    pub dropped: Vec<DroppedPlay>,
    /// Plays returned by the query before resolution
    pub matched: usize,
}

impl ClipSearchResult {
    pub fn summary(&self) -> String {
        format!(
            "{} matched, {} clips, {} dropped",
            self.matched,
            self.clips.len(),
            self.dropped.len()
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClipSearchPipeline {
    registry: ColumnRegistry,
    resolver: Resolver,
    calculator: ClipBoundaryCalculator,
}

impl ClipSearchPipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            registry: ColumnRegistry::standard(),
            resolver: Resolver::new(config.resolver.clone()),
            calculator: ClipBoundaryCalculator::new(config.clips.clone()),
        }
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn compile(&self, query: &StructuredQuery) -> Result<CompiledQuery, QueryValidationError> {
        QueryValidator::new(&self.registry).validate(query)
    }

    /// Run a query and turn every resolvable match into a clip.
    ///
    /// Only validation fails the call; plays that cannot be resolved are
    /// reported in `dropped`.
    pub fn search(
        &self,
        table: &PlayTable,
        index: &VideoTimeIndex,
        query: &StructuredQuery,
        options: &ClipRequestOptions,
    ) -> Result<ClipSearchResult, QueryValidationError> {
        let start_time = Instant::now();
        let compiled = self.compile(query)?;
        let matches = QueryExecutor::new(table).execute(&compiled);
        info!("🔍 {} query matched {} plays", compiled.shape(), matches.len());

        let mut result = ClipSearchResult {
            matched: matches.len(),
            ..ClipSearchResult::default()
        };

        for play in matches {
            match self.resolver.resolve_play(index, play) {
                Ok(resolution) => {
                    let next_offset = self.next_play_offset(table, index, play, resolution.offset_seconds);
                    result
                        .clips
                        .push(self.calculator.clip(index, play, &resolution, next_offset, options));
                }
                Err(error) => {
                    warn!("⚠️ Dropping play {}: {}", play.sequence_index, error);
                    result.dropped.push(DroppedPlay {
                        sequence_index: play.sequence_index,
                        play_id: play.play_id,
                        description: play.description.clone(),
                        reason: error.to_string(),
                        error,
                    });
                }
            }
        }

        info!(
            "🎬 {} in {:.2}ms",
            result.summary(),
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    /// Resolved offset of the first later play in the same game that starts
    /// after `resolved_offset`.
    ///
    /// Rows sharing the clock (incompletions, PATs, timeouts) resolve to the
    /// same offset and are skipped.
    fn next_play_offset(
        &self,
        table: &PlayTable,
        index: &VideoTimeIndex,
        play: &PlayRecord,
        resolved_offset: f64,
    ) -> Option<f64> {
        let mut current = play;
        loop {
            let next = table.next_play(current.sequence_index)?;
            if next.game_id != play.game_id {
                return None;
            }
            match self.resolver.resolve_play(index, next) {
                Ok(resolution) if resolution.offset_seconds > resolved_offset => {
                    return Some(resolution.offset_seconds)
                }
                Ok(_) => current = next,
                Err(e) => {
                    debug!("Next play {} unresolved, clip uncapped: {}", next.sequence_index, e);
                    return None;
                }
            }
        }
    }
}

/// Session state for clip searches over one video.
pub struct ClipEngine {
    plays: Arc<PlayTable>,
    index: SharedIndex,
    pipeline: ClipSearchPipeline,
    builder: IndexBuilder,
    store: IndexStore,
}

impl ClipEngine {
    pub fn new(config: &Config, plays: Arc<PlayTable>, index: VideoTimeIndex) -> Self {
        info!(
            "🚀 Clip engine ready: {} plays, {}",
            plays.len(),
            index.summary()
        );
        Self {
            plays,
            index: SharedIndex::new(index),
            pipeline: ClipSearchPipeline::new(config),
            builder: IndexBuilder::new(config.index.clone()),
            store: IndexStore::new(config.index.cache_dir.clone()),
        }
    }

    pub fn plays(&self) -> &Arc<PlayTable> {
        &self.plays
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn pipeline(&self) -> &ClipSearchPipeline {
        &self.pipeline
    }

    /// Search against the index current at call time. A concurrent rebuild
    /// does not affect a search already running.
    pub async fn search(
        &self,
        query: &StructuredQuery,
        options: &ClipRequestOptions,
    ) -> Result<ClipSearchResult, QueryValidationError> {
        let index = self.index.snapshot().await;
        self.pipeline.search(&self.plays, &index, query, options)
    }

    /// Rebuild the index for the same video from fresh samples, persist it
    /// and swap it in.
    pub async fn rebuild(&self, samples: &[CalibrationSample]) -> Result<BuildReport> {
        let current = self.index.snapshot().await;
        let (index, report) = self
            .builder
            .build(current.video.clone(), current.duration_seconds, samples);
        self.store.save(&index).await?;
        self.index.swap(index).await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DeadZone, QuarterTimeline, VideoCalibrationPoint, VideoIdentity};
    use crate::query::{FilterCondition, FilterGroup, FilterNode, FilterQuery, Operator};
    use serde_json::json;

    fn play(sequence_index: usize, quarter: u8, clock: u32, yards: i32) -> PlayRecord {
        PlayRecord {
            sequence_index,
            game_id: Some("2023_01_SF_PIT".to_string()),
            drive_id: Some(1),
            quarter: Some(quarter),
            game_clock_seconds: Some(clock),
            play_type: Some("pass".to_string()),
            yards_gained: Some(yards),
            ..PlayRecord::default()
        }
    }

    fn point(quarter: u8, clock: f64, offset: f64) -> VideoCalibrationPoint {
        VideoCalibrationPoint {
            quarter,
            clock_seconds: clock,
            video_offset_seconds: offset,
            confidence: 1.0,
        }
    }

    fn index() -> VideoTimeIndex {
        let mut index = VideoTimeIndex::empty(VideoIdentity::named("game"));
        index.duration_seconds = Some(8000.0);
        index.quarters = vec![
            QuarterTimeline {
                quarter: 2,
                points: vec![point(2, 600.0, 2500.0), point(2, 120.0, 3040.0)],
                degraded: false,
            },
            QuarterTimeline {
                quarter: 3,
                points: vec![point(3, 900.0, 4200.0), point(3, 480.0, 4625.0)],
                degraded: false,
            },
        ];
        index.dead_zones = vec![DeadZone {
            start_seconds: 3100.0,
            end_seconds: 4150.0,
            label: Some("halftime".to_string()),
        }];
        index
    }

    fn gained_more_than(yards: i64) -> StructuredQuery {
        StructuredQuery::Filter(FilterQuery {
            filters: FilterGroup::all(vec![FilterNode::Condition(FilterCondition::new(
                "yards_gained",
                Operator::Gt,
                json!(yards),
            ))]),
        })
    }

    #[test]
    fn test_search_drops_unresolvable_plays_and_keeps_others() {
        let table = PlayTable::new(vec![
            play(0, 2, 10, 25),  // lands in halftime
            play(1, 3, 600, 30), // interpolated
            play(2, 1, 500, 40), // quarter missing from the index
            play(3, 3, 300, 2),
        ]);
        let pipeline = ClipSearchPipeline::default();

        let result = pipeline
            .search(&table, &index(), &gained_more_than(20), &ClipRequestOptions::default())
            .unwrap();

        assert_eq!(result.matched, 3);
        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.clips[0].sequence_index, 1);
        let dropped: Vec<usize> = result.dropped.iter().map(|d| d.sequence_index).collect();
        assert_eq!(dropped, vec![0, 2]);
        assert!(matches!(result.dropped[0].error, ResolutionError::DeadZone { .. }));
    }

    #[test]
    fn test_clip_is_capped_by_following_play() {
        // Q3 600 → ~4503.6; the next snap at 590 → ~4513.7
        let table = PlayTable::new(vec![play(0, 3, 600, 30), play(1, 3, 590, 0)]);
        let result = ClipSearchPipeline::default()
            .search(&table, &index(), &gained_more_than(20), &ClipRequestOptions::default())
            .unwrap();

        let clip = &result.clips[0];
        let next_snap = 4200.0 + 310.0 / 420.0 * 425.0;
        assert!((clip.end_offset - (next_snap - 2.0)).abs() < 1e-6);
        assert!(clip.duration() < clip.nominal_duration);
    }

    #[test]
    fn test_rows_sharing_the_clock_do_not_cap_the_clip() {
        // incompletion at Q3 10:00 leaves the next row on the same clock
        let table = PlayTable::new(vec![play(0, 3, 600, 24), play(1, 3, 600, 0)]);
        let result = ClipSearchPipeline::default()
            .search(&table, &index(), &gained_more_than(20), &ClipRequestOptions::default())
            .unwrap();

        let clip = &result.clips[0];
        assert_eq!(clip.nominal_duration, 20.0 + 12.0 + 15.0);
        assert!((clip.duration() - clip.nominal_duration).abs() < 1e-9);

        // the first row that moves the clock still caps it
        let table = PlayTable::new(vec![play(0, 3, 600, 24), play(1, 3, 600, 0), play(2, 3, 590, 3)]);
        let result = ClipSearchPipeline::default()
            .search(&table, &index(), &gained_more_than(20), &ClipRequestOptions::default())
            .unwrap();

        let next_snap = 4200.0 + 310.0 / 420.0 * 425.0;
        assert!((result.clips[0].end_offset - (next_snap - 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_query_fails_whole_search() {
        let query = StructuredQuery::Filter(FilterQuery {
            filters: FilterGroup::all(vec![FilterNode::Condition(FilterCondition::new(
                "no_such_column",
                Operator::Eq,
                json!(1),
            ))]),
        });
        let err = ClipSearchPipeline::default()
            .search(&PlayTable::new(Vec::new()), &index(), &query, &ClipRequestOptions::default())
            .unwrap_err();
        assert!(matches!(err, QueryValidationError::UnknownColumn { .. }));
    }

    #[tokio::test]
    async fn test_engine_rebuild_swaps_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.index.cache_dir = dir.path().to_path_buf();

        let plays = Arc::new(PlayTable::new(vec![play(0, 1, 600, 30)]));
        let engine = ClipEngine::new(&config, plays, VideoTimeIndex::empty(VideoIdentity::named("game")));

        let before = engine
            .search(&gained_more_than(20), &ClipRequestOptions::default())
            .await
            .unwrap();
        assert_eq!(before.dropped.len(), 1);

        let samples = vec![
            CalibrationSample::reading(100.0, 1, 900.0, 0.9),
            CalibrationSample::reading(490.0, 1, 600.0, 0.9),
            CalibrationSample::reading(880.0, 1, 300.0, 0.9),
        ];
        let report = engine.rebuild(&samples).await.unwrap();
        assert_eq!(report.accepted_points, 3);

        let after = engine
            .search(&gained_more_than(20), &ClipRequestOptions::default())
            .await
            .unwrap();
        assert_eq!(after.clips.len(), 1);
        assert_eq!(after.clips[0].start_offset, 485.0);
        assert!(IndexStore::new(dir.path().to_path_buf())
            .load(&VideoIdentity::named("game"))
            .await
            .unwrap()
            .is_some());
    }
}
