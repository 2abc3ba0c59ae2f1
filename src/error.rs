//! Error types for query validation, clip resolution and index management

use std::path::PathBuf;
use thiserror::Error;

/// A structured query was rejected before evaluation.
///
/// Raised for unknown columns, operator/type mismatches, unusable literals and
/// malformed shape parameters. No partial results are produced when this fires.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryValidationError {
    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },

    #[error("operator '{operator}' is not supported on {column_type} column '{column}'")]
    OperatorNotSupported {
        column: String,
        operator: String,
        column_type: String,
    },

    #[error("invalid value for '{column}' ({operator}): {reason}")]
    InvalidValue {
        column: String,
        operator: String,
        reason: String,
    },

    #[error("malformed {shape} query: {reason}")]
    MalformedShape { shape: &'static str, reason: String },

    #[error("query could not be parsed: {0}")]
    Parse(String),
}

/// A single play could not be placed on the video timeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("quarter {quarter} has no calibration data")]
    QuarterUnavailable { quarter: u8 },

    #[error("quarter {quarter} is degraded ({points} calibration point(s))")]
    QuarterDegraded { quarter: u8, points: usize },

    #[error("invalid game clock for Q{quarter}: {clock_seconds}s")]
    InvalidClock { quarter: u8, clock_seconds: f64 },

    #[error("play {sequence_index} has no quarter or game clock")]
    MissingGameClock { sequence_index: usize },

    #[error("Q{quarter} {clock} resolves into dead zone [{zone_start:.1}s, {zone_end:.1}s]")]
    DeadZone {
        quarter: u8,
        clock: String,
        zone_start: f64,
        zone_end: f64,
    },
}

/// Problems found while building a video time index.
///
/// These never abort a build; they are collected on the build report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexBuildError {
    #[error("quarter {quarter} ended with {accepted} accepted calibration point(s)")]
    DegradedQuarter { quarter: u8, accepted: usize },

    #[error("no usable calibration samples ({discarded} discarded)")]
    NoUsableSamples { discarded: usize },
}

/// A persisted index failed validation on load and must be rebuilt.
#[derive(Error, Debug)]
pub enum CacheCorruptionError {
    #[error("failed to read cached index {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse cached index {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("schema version mismatch: found {found}, expected {expected}")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("cached index belongs to video '{found}', expected '{expected}'")]
    VideoMismatch { found: String, expected: String },

    #[error("cached index violates invariants: {0}")]
    Invariant(String),
}
