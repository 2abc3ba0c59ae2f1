//! On-disk cache of built time indexes, one JSON file per video
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{BuildReport, VideoIdentity, VideoTimeIndex, SCHEMA_VERSION};
use crate::error::CacheCorruptionError;

/// Manages the index cache directory
#[derive(Debug, Clone)]
pub struct IndexStore {
    /// Cache directory path
    cache_dir: PathBuf,
}

impl IndexStore {
    /// Create a new index store
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    /// Initialize cache directory
    pub async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        info!("📁 Index cache directory initialized: {}", self.cache_dir.display());
        Ok(())
    }

    pub fn path_for(&self, video: &VideoIdentity) -> PathBuf {
        self.cache_dir.join(format!("{}.json", video.cache_key()))
    }

    /// Load the cached index for a video.
    ///
    /// `Ok(None)` when nothing is cached; an error when the file exists but
    /// cannot be trusted, in which case the caller rebuilds.
    pub async fn load(&self, video: &VideoIdentity) -> Result<Option<VideoTimeIndex>, CacheCorruptionError> {
        let path = self.path_for(video);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Cache miss: no index for {}", video.video_id);
                return Ok(None);
            }
            Err(source) => return Err(CacheCorruptionError::Io { path, source }),
        };

        // Check the version before the full body so layout changes report
        // as a version mismatch rather than a parse failure.
        #[derive(Deserialize)]
        struct Header {
            schema_version: u32,
        }
        let header: Header = serde_json::from_str(&content).map_err(|source| {
            CacheCorruptionError::Parse {
                path: path.clone(),
                source,
            }
        })?;
        if header.schema_version != SCHEMA_VERSION {
            return Err(CacheCorruptionError::SchemaVersion {
                found: header.schema_version,
                expected: SCHEMA_VERSION,
            });
        }

        let index: VideoTimeIndex = serde_json::from_str(&content)
            .map_err(|source| CacheCorruptionError::Parse { path, source })?;

        if index.video != *video {
            return Err(CacheCorruptionError::VideoMismatch {
                found: format!("{} ({})", index.video.video_id, index.video.fingerprint),
                expected: format!("{} ({})", video.video_id, video.fingerprint),
            });
        }
        index.check_invariants()?;

        info!("📚 Cache hit: loaded index for {} ({} points)", video.video_id, index.point_count());
        Ok(Some(index))
    }

    /// Save an index, replacing any previous one atomically.
    pub async fn save(&self, index: &VideoTimeIndex) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let path = self.path_for(&index.video);
        let json_content = serde_json::to_vec_pretty(index)?;

        let dir = self.cache_dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&json_content)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target)?;
            Ok(())
        })
        .await??;

        info!("💾 Saved index for {} to cache: {}", index.video.video_id, path.display());
        Ok(path)
    }

    /// Load the cached index, or build and save a fresh one when it is
    /// missing or corrupt.
    pub async fn load_or_build<F>(
        &self,
        video: &VideoIdentity,
        build: F,
    ) -> Result<(VideoTimeIndex, Option<BuildReport>)>
    where
        F: FnOnce() -> (VideoTimeIndex, BuildReport),
    {
        match self.load(video).await {
            Ok(Some(index)) => return Ok((index, None)),
            Ok(None) => info!("🔨 No cached index for {}, building", video.video_id),
            Err(e) => warn!("♻️ Cached index for {} rejected ({}), rebuilding", video.video_id, e),
        }

        let (index, report) = build();
        self.save(&index).await?;
        Ok((index, Some(report)))
    }

    /// Get cache statistics
    pub async fn stats(&self) -> Result<IndexStoreStats> {
        let mut stats = IndexStoreStats::default();
        for entry in self.list().await? {
            stats.total_files += 1;
            if entry.valid {
                stats.valid_files += 1;
                stats.total_points += entry.points;
            } else {
                stats.invalid_files += 1;
            }
        }
        Ok(stats)
    }

    /// Force invalidate the cached index for a video
    pub async fn invalidate(&self, video: &VideoIdentity) -> Result<bool> {
        self.invalidate_key(&video.cache_key()).await
    }

    /// Force invalidate a specific cache entry by key
    pub async fn invalidate_key(&self, cache_key: &str) -> Result<bool> {
        let cache_path = self.cache_dir.join(format!("{}.json", cache_key));

        if tokio::fs::try_exists(&cache_path).await? {
            tokio::fs::remove_file(&cache_path).await?;
            info!("🗑️ Force invalidated index for key: {}", cache_key);
            Ok(true)
        } else {
            debug!("Index file not found for key: {}", cache_key);
            Ok(false)
        }
    }

    /// Remove every cached index
    pub async fn clear(&self) -> Result<usize> {
        let mut cleared_count = 0;
        if !tokio::fs::try_exists(&self.cache_dir).await? {
            return Ok(0);
        }
        let mut entries = tokio::fs::read_dir(&self.cache_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json")
                && tokio::fs::remove_file(&path).await.is_ok()
            {
                cleared_count += 1;
                debug!("🗑️ Removed index file: {}", path.display());
            }
        }

        if cleared_count > 0 {
            info!("🧹 Cleared {} index files", cleared_count);
        }

        Ok(cleared_count)
    }

    /// List all cached indexes, newest first
    pub async fn list(&self) -> Result<Vec<StoredIndexInfo>> {
        let mut indexes = Vec::new();
        if !tokio::fs::try_exists(&self.cache_dir).await? {
            return Ok(indexes);
        }
        let mut entries = tokio::fs::read_dir(&self.cache_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().map_or(false, |ext| ext == "json") {
                continue;
            }
            let cache_key = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();

            let parsed = tokio::fs::read_to_string(&path)
                .await
                .ok()
                .and_then(|content| serde_json::from_str::<VideoTimeIndex>(&content).ok());

            indexes.push(match parsed {
                Some(index) => StoredIndexInfo {
                    cache_key,
                    video_id: index.video.video_id.clone(),
                    built_at: Some(index.built_at),
                    points: index.point_count(),
                    dead_zones: index.dead_zones.len(),
                    degraded_quarters: index.degraded_quarters(),
                    valid: index.schema_version == SCHEMA_VERSION && index.check_invariants().is_ok(),
                },
                None => StoredIndexInfo {
                    cache_key,
                    video_id: String::new(),
                    built_at: None,
                    points: 0,
                    dead_zones: 0,
                    degraded_quarters: Vec::new(),
                    valid: false,
                },
            });
        }

        // Sort by build time (newest first)
        indexes.sort_by(|a, b| b.built_at.cmp(&a.built_at));
        Ok(indexes)
    }
}

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct IndexStoreStats {
    pub total_files: usize,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub total_points: usize,
}

/// Information about one cached index
#[derive(Debug, Clone, Serialize)]
pub struct StoredIndexInfo {
    pub cache_key: String,
    pub video_id: String,
    pub built_at: Option<DateTime<Utc>>,
    pub points: usize,
    pub dead_zones: usize,
    pub degraded_quarters: Vec<u8>,
    pub valid: bool,
}
