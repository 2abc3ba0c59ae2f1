//! Persisted index cache: corruption is detected and triggers a rebuild.

use playclip::config::IndexConfig;
use playclip::{
    BuildReport, CacheCorruptionError, CalibrationSample, IndexBuilder, IndexStore, VideoIdentity,
    VideoTimeIndex,
};
use tempfile::TempDir;

fn samples() -> Vec<CalibrationSample> {
    vec![
        CalibrationSample::reading(120.0, 1, 900.0, 0.95),
        CalibrationSample::reading(510.0, 1, 600.0, 0.95),
        CalibrationSample::reading(900.0, 1, 300.0, 0.95),
    ]
}

fn build(video: &VideoIdentity) -> (VideoTimeIndex, BuildReport) {
    IndexBuilder::new(IndexConfig::default()).build(video.clone(), Some(3600.0), &samples())
}

fn store() -> (TempDir, IndexStore) {
    let dir = TempDir::new().unwrap();
    let store = IndexStore::new(dir.path().to_path_buf());
    (dir, store)
}

async fn rewrite_json(store: &IndexStore, video: &VideoIdentity, edit: impl FnOnce(&mut serde_json::Value)) {
    let path = store.path_for(video);
    let mut value: serde_json::Value =
        serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
    edit(&mut value);
    tokio::fs::write(&path, serde_json::to_string(&value).unwrap()).await.unwrap();
}

#[tokio::test]
async fn test_load_or_build_reuses_valid_cache() {
    let (_dir, store) = store();
    let video = VideoIdentity::named("week1");

    let (first, report) = store.load_or_build(&video, || build(&video)).await.unwrap();
    assert_eq!(report.map(|r| r.accepted_points), Some(3));

    let (second, report) = store
        .load_or_build(&video, || panic!("valid cache must not be rebuilt"))
        .await
        .unwrap();
    assert!(report.is_none());
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_schema_version_mismatch_triggers_rebuild() {
    let (_dir, store) = store();
    let video = VideoIdentity::named("week2");
    store.save(&build(&video).0).await.unwrap();

    rewrite_json(&store, &video, |v| v["schema_version"] = serde_json::json!(99)).await;

    assert!(matches!(
        store.load(&video).await,
        Err(CacheCorruptionError::SchemaVersion { found: 99, .. })
    ));

    let (index, report) = store.load_or_build(&video, || build(&video)).await.unwrap();
    assert!(report.is_some());
    assert_eq!(index.point_count(), 3);
    assert!(store.load(&video).await.unwrap().is_some());
}

#[tokio::test]
async fn test_index_for_another_video_is_rejected() {
    let (_dir, store) = store();
    let expected = VideoIdentity::named("week3");
    let mut other = build(&VideoIdentity::named("week4")).0;
    other.video.fingerprint = "0000".to_string();

    // the other video's index sitting under this video's key
    let json = serde_json::to_string(&other).unwrap();
    tokio::fs::create_dir_all(store.cache_dir()).await.unwrap();
    tokio::fs::write(store.path_for(&expected), json).await.unwrap();

    assert!(matches!(
        store.load(&expected).await,
        Err(CacheCorruptionError::VideoMismatch { .. })
    ));
}

#[tokio::test]
async fn test_unparseable_and_inconsistent_files_are_rejected() {
    let (_dir, store) = store();
    let video = VideoIdentity::named("week5");
    tokio::fs::create_dir_all(store.cache_dir()).await.unwrap();

    tokio::fs::write(store.path_for(&video), "not json").await.unwrap();
    assert!(matches!(
        store.load(&video).await,
        Err(CacheCorruptionError::Parse { .. })
    ));

    store.save(&build(&video).0).await.unwrap();
    rewrite_json(&store, &video, |v| {
        // offsets now run backwards as the clock runs down
        v["quarters"][0]["points"][2]["video_offset_seconds"] = serde_json::json!(10.0);
    })
    .await;
    assert!(matches!(
        store.load(&video).await,
        Err(CacheCorruptionError::Invariant(_))
    ));

    let (_, report) = store.load_or_build(&video, || build(&video)).await.unwrap();
    assert!(report.is_some());
}

#[tokio::test]
async fn test_fingerprint_follows_file_contents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("SF at PIT.mp4");
    tokio::fs::write(&path, b"first cut").await.unwrap();
    let first = VideoIdentity::from_file(&path).await.unwrap();

    tokio::fs::write(&path, b"second cut").await.unwrap();
    let second = VideoIdentity::from_file(&path).await.unwrap();

    assert_eq!(first.video_id, "SF at PIT");
    assert_ne!(first.fingerprint, second.fingerprint);
    assert_ne!(first.cache_key(), second.cache_key());
    assert!(first.cache_key().starts_with("sf_at_pit_"));
}
