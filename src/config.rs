use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the play clip engine
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Play-by-play data location
    pub data: DataConfig,

    /// Video time index build and cache settings
    pub index: IndexConfig,

    /// Game clock to video offset resolution
    pub resolver: ResolverConfig,

    /// Clip window sizing
    pub clips: ClipConfig,

    /// Calibration sample collection
    pub sampling: SamplingConfig,

    /// Output and logging settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Default play-by-play CSV when none is given on the command line
    pub plays_csv: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding one cached index per video
    pub cache_dir: PathBuf,

    /// Samples below this confidence are discarded
    pub confidence_threshold: f64,

    /// Offset gaps longer than this between accepted points become dead zones
    pub min_gap_seconds: f64,

    /// Dead zones closer than this are merged
    pub merge_tolerance_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    /// A calibration point within this many clock seconds is an exact hit
    pub exact_tolerance_seconds: f64,

    /// Video seconds per game second when the local slope is unusable
    pub nominal_video_per_game_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClipConfig {
    /// Seconds of lead-in before the resolved snap
    pub pre_buffer_seconds: f64,

    /// Seconds appended after the play (overridable per request)
    pub post_play_buffer_seconds: f64,

    /// Gap left before the next play's start
    pub next_play_margin_seconds: f64,

    /// Base duration for pass and run plays
    pub base_scrimmage_seconds: f64,

    /// Base duration for kickoffs and punts
    pub base_kick_seconds: f64,

    /// Base duration for every other play type
    pub base_default_seconds: f64,

    pub touchdown_bonus_seconds: f64,

    /// Added for interceptions and fumbles
    pub turnover_bonus_seconds: f64,

    pub yards_bonus_per_yard: f64,

    pub max_yards_bonus_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Video seconds between planned samples
    pub sample_interval_seconds: f64,

    /// Neighbouring offsets tried when a frame shows no clock
    pub max_retries: u32,

    /// Distance between retry offsets
    pub retry_step_seconds: f64,

    /// Concurrent reader tasks
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,

    /// Pretty-print JSON written by the CLI
    pub pretty_json: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache/indexes"),
            confidence_threshold: 0.5,
            min_gap_seconds: 600.0,
            merge_tolerance_seconds: 10.0,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            exact_tolerance_seconds: 1.0,
            nominal_video_per_game_second: 1.3,
        }
    }
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            pre_buffer_seconds: 5.0,
            post_play_buffer_seconds: 15.0,
            next_play_margin_seconds: 2.0,
            base_scrimmage_seconds: 20.0,
            base_kick_seconds: 25.0,
            base_default_seconds: 20.0,
            touchdown_bonus_seconds: 25.0,
            turnover_bonus_seconds: 15.0,
            yards_bonus_per_yard: 0.5,
            max_yards_bonus_seconds: 20.0,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_interval_seconds: 300.0, // 5 minutes of footage
            max_retries: 3,
            retry_step_seconds: 2.0,
            workers: num_cpus::get().min(8),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            pretty_json: true,
        }
    }
}

const CONFIG_PATHS: [&str; 4] = [
    "playclip.toml",
    "config/playclip.toml",
    "~/.config/playclip/config.toml",
    "/etc/playclip/config.toml",
];

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

impl Config {
    /// Load configuration from the first readable config file, then apply
    /// environment overrides. Falls back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        for path in CONFIG_PATHS {
            let path = expand_home(path);
            if let Ok(config_str) = std::fs::read_to_string(&path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path.display());
                        config.apply_env_overrides();
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from an explicit file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides();
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("PLAYCLIP_CACHE_DIR") {
            self.index.cache_dir = PathBuf::from(dir);
        }

        if let Ok(plays) = std::env::var("PLAYCLIP_PLAYS_CSV") {
            self.data.plays_csv = Some(PathBuf::from(plays));
        }

        if let Ok(threshold) = std::env::var("PLAYCLIP_CONFIDENCE_THRESHOLD") {
            self.index.confidence_threshold = threshold.parse().unwrap_or(0.5);
        }

        if let Ok(workers) = std::env::var("PLAYCLIP_WORKERS") {
            self.sampling.workers = workers.parse().unwrap_or(4);
        }

        if let Ok(buffer) = std::env::var("PLAYCLIP_POST_PLAY_BUFFER") {
            self.clips.post_play_buffer_seconds = buffer.parse().unwrap_or(15.0);
        }

        if let Ok(log_level) = std::env::var("PLAYCLIP_LOG_LEVEL") {
            self.output.log_level = log_level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.index.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be between 0 and 1"));
        }

        if self.index.min_gap_seconds <= 0.0 {
            return Err(anyhow!("min_gap_seconds must be greater than 0"));
        }

        if self.index.merge_tolerance_seconds < 0.0 {
            return Err(anyhow!("merge_tolerance_seconds must not be negative"));
        }

        if self.resolver.nominal_video_per_game_second <= 0.0 {
            return Err(anyhow!("nominal_video_per_game_second must be greater than 0"));
        }

        let clips = &self.clips;
        let durations = [
            clips.pre_buffer_seconds,
            clips.post_play_buffer_seconds,
            clips.next_play_margin_seconds,
            clips.base_scrimmage_seconds,
            clips.base_kick_seconds,
            clips.base_default_seconds,
            clips.touchdown_bonus_seconds,
            clips.turnover_bonus_seconds,
            clips.yards_bonus_per_yard,
            clips.max_yards_bonus_seconds,
        ];
        if durations.iter().any(|d| *d < 0.0 || !d.is_finite()) {
            return Err(anyhow!("clip durations must be finite and not negative"));
        }

        if self.sampling.workers == 0 {
            return Err(anyhow!("sampling workers must be greater than 0"));
        }

        if self.sampling.sample_interval_seconds <= 0.0 {
            return Err(anyhow!("sample_interval_seconds must be greater than 0"));
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Play Clip Configuration:\n\
            - Index Cache: {}\n\
            - Confidence Threshold: {}\n\
            - Dead Zone Min Gap: {}s\n\
            - Clip Buffers: -{}s / +{}s\n\
            - Sample Interval: {}s\n\
            - Workers: {}",
            self.index.cache_dir.display(),
            self.index.confidence_threshold,
            self.index.min_gap_seconds,
            self.clips.pre_buffer_seconds,
            self.clips.post_play_buffer_seconds,
            self.sampling.sample_interval_seconds,
            self.sampling.workers
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.config.index.cache_dir = dir;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.index.confidence_threshold = threshold;
        self
    }

    pub fn with_min_gap(mut self, seconds: f64) -> Self {
        self.config.index.min_gap_seconds = seconds;
        self
    }

    pub fn with_post_play_buffer(mut self, seconds: f64) -> Self {
        self.config.clips.post_play_buffer_seconds = seconds;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.sampling.workers = workers;
        self
    }

    pub fn with_plays_csv(mut self, path: PathBuf) -> Self {
        self.config.data.plays_csv = Some(path);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
