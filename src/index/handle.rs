use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::VideoTimeIndex;

/// Shared holder for the current index.
///
/// Readers take a cheap `Arc` snapshot and keep using it even if a rebuild
/// swaps in a new index meanwhile; nobody ever sees a half-built index.
#[derive(Debug, Clone)]
pub struct SharedIndex {
    current: Arc<RwLock<Arc<VideoTimeIndex>>>,
}

impl SharedIndex {
    pub fn new(index: VideoTimeIndex) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    /// The index as of now.
    pub async fn snapshot(&self) -> Arc<VideoTimeIndex> {
        Arc::clone(&*self.current.read().await)
    }

    /// Replace the index, returning the previous one.
    pub async fn swap(&self, index: VideoTimeIndex) -> Arc<VideoTimeIndex> {
        let next = Arc::new(index);
        let mut guard = self.current.write().await;
        info!(
            "🔄 Swapped time index for {} ({} points)",
            next.video.video_id,
            next.point_count()
        );
        std::mem::replace(&mut *guard, next)
    }
}
