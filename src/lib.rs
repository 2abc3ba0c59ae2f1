/// Play Clip Engine
///
/// Finds plays in a play-by-play table with structured queries and turns
/// each match into a clip window of the game video, using a calibration
/// index built from broadcast game clock readings.

pub mod clips;
pub mod clock;
pub mod config;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod plays;
pub mod query;
pub mod resolver;

// Re-export main types for easy access
pub use crate::clips::{ClipBoundaryCalculator, ClipRequestOptions, ClipTimestamp};
pub use crate::clock::GameClock;
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{CacheCorruptionError, IndexBuildError, QueryValidationError, ResolutionError};
pub use crate::index::{
    BuildReport, CalibrationSample, DeadZone, IndexBuilder, IndexStore, SharedIndex,
    VideoCalibrationPoint, VideoIdentity, VideoTimeIndex,
};
pub use crate::pipeline::{ClipEngine, ClipSearchPipeline, ClipSearchResult, DroppedPlay};
pub use crate::plays::{ColumnRegistry, PlayRecord, PlayTable};
pub use crate::query::{QueryExecutor, QueryValidator, StructuredQuery};
pub use crate::resolver::{Resolution, ResolutionMethod, Resolver};
