//! Unit tests for the checkpoint crate.

use sync_core::{Cursor, PersistenceError};
use tempfile::TempDir;

use crate::{CheckpointStore, FilesystemStore, MemoryStore, Snapshot, WatermarkTracker};

fn cursor(s: &str) -> Cursor {
    Cursor::parse(s).unwrap()
}

// ============================================================================
// FilesystemStore Tests
// ============================================================================

#[tokio::test]
async fn test_missing_file_loads_empty_snapshot() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path().join("state.json"));

    let snapshot = store.load().await.unwrap();
    assert!(snapshot.is_empty());
    // Loading must not create the file
    assert!(!tmp.path().join("state.json").exists());
}

#[tokio::test]
async fn test_empty_and_null_files_load_empty_snapshot() {
    let tmp = TempDir::new().unwrap();
    for content in ["", "null", "{}", "  \n"] {
        let path = tmp.path().join("state.json");
        std::fs::write(&path, content).unwrap();
        let snapshot = FilesystemStore::new(&path).load().await.unwrap();
        assert!(snapshot.is_empty(), "content {content:?} should load empty");
    }
}

#[tokio::test]
async fn test_save_overwrites_whole_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("state.json");
    let store = FilesystemStore::new(&path);

    let mut snapshot = Snapshot::new();
    snapshot.insert("films".to_string(), cursor("2021-01-01T00:00:05Z"));
    snapshot.insert("persons".to_string(), cursor("2021-01-01T00:00:07Z"));
    store.save(&snapshot).await.unwrap();

    snapshot.remove("persons");
    store.save(&snapshot).await.unwrap();

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, serde_json::json!({"films": "2021-01-01T00:00:05Z"}));
    assert_eq!(store.load().await.unwrap(), snapshot);
}

#[tokio::test]
async fn test_reads_legacy_state_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state.json");
    std::fs::write(
        &path,
        r#"{"films": "2021-06-16 20:14:09.221855+00:00", "genres": "2010-01-01 00:00:00"}"#,
    )
    .unwrap();

    let snapshot = FilesystemStore::new(&path).load().await.unwrap();
    assert_eq!(snapshot["films"], cursor("2021-06-16T20:14:09.221855Z"));
    assert_eq!(snapshot["genres"], cursor("2010-01-01"));
}

#[tokio::test]
async fn test_corrupt_file_is_persistence_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state.json");
    std::fs::write(&path, r#"{"films": "not a timestamp"}"#).unwrap();

    let err = FilesystemStore::new(&path).load().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PersistenceError>(),
        Some(PersistenceError::Corrupt { .. })
    ));
}

#[tokio::test]
async fn test_unspecified_path() {
    let store = FilesystemStore::unspecified();
    assert!(store.load().await.unwrap().is_empty());

    let err = store.save(&Snapshot::new()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PersistenceError>(),
        Some(PersistenceError::PathNotSpecified)
    ));
    assert_eq!(
        err.to_string(),
        "The checkpoint file path was not specified"
    );
}

#[tokio::test]
async fn test_unwritable_path_is_persistence_error() {
    let tmp = TempDir::new().unwrap();
    // A regular file where the parent directory should be
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let store = FilesystemStore::new(blocker.join("state.json"));

    let err = store.save(&Snapshot::new()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PersistenceError>(),
        Some(PersistenceError::Write { .. })
    ));
}

// ============================================================================
// WatermarkTracker Tests
// ============================================================================

#[tokio::test]
async fn test_tracker_get_or_default() {
    let tracker = WatermarkTracker::load(MemoryStore::new()).await.unwrap();
    assert_eq!(tracker.get("films"), None);
    assert_eq!(
        tracker.get_or("films", cursor("2010-01-01")),
        cursor("2010-01-01")
    );
}

#[tokio::test]
async fn test_tracker_set_persists_immediately() {
    let store = MemoryStore::new();
    let mut tracker = WatermarkTracker::load(store.clone()).await.unwrap();

    tracker.set("films", cursor("2021-01-01T00:00:05Z")).await.unwrap();
    assert_eq!(store.save_count(), 1);
    assert_eq!(store.persisted()["films"], cursor("2021-01-01T00:00:05Z"));

    tracker.set("persons", cursor("2021-01-01T00:00:09Z")).await.unwrap();
    assert_eq!(store.save_count(), 2);
    // Every save carries the full snapshot
    let persisted = store.persisted();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted["films"], cursor("2021-01-01T00:00:05Z"));
}

#[tokio::test]
async fn test_tracker_loads_existing_snapshot() {
    let mut snapshot = Snapshot::new();
    snapshot.insert("genres".to_string(), cursor("2021-03-01"));
    let tracker = WatermarkTracker::load(MemoryStore::with_snapshot(snapshot))
        .await
        .unwrap();
    assert_eq!(tracker.get("genres"), Some(cursor("2021-03-01")));
}

#[tokio::test]
async fn test_tracker_rolls_back_on_failed_save() {
    let store = MemoryStore::new();
    let mut tracker = WatermarkTracker::load(store.clone()).await.unwrap();
    tracker.set("films", cursor("2021-01-01")).await.unwrap();

    store.fail_saves(true);
    let err = tracker.set("films", cursor("2021-02-01")).await.unwrap_err();
    assert!(err.downcast_ref::<PersistenceError>().is_some());

    assert_eq!(tracker.get("films"), Some(cursor("2021-01-01")));
    assert_eq!(store.persisted()["films"], cursor("2021-01-01"));
}

#[tokio::test]
async fn test_tracker_complete_scan_is_one_write() {
    let store = MemoryStore::new();
    let mut tracker = WatermarkTracker::load(store.clone()).await.unwrap();
    tracker
        .set("persons_film", cursor("2021-01-01T00:00:03Z"))
        .await
        .unwrap();

    tracker
        .complete_scan("persons", cursor("2021-01-01T00:00:08Z"), "persons_film")
        .await
        .unwrap();

    assert_eq!(store.save_count(), 2);
    let persisted = store.persisted();
    assert_eq!(persisted.get("persons"), Some(&cursor("2021-01-01T00:00:08Z")));
    assert!(!persisted.contains_key("persons_film"));
}

#[tokio::test]
async fn test_tracker_remove() {
    let store = MemoryStore::new();
    let mut tracker = WatermarkTracker::load(store.clone()).await.unwrap();
    tracker.set("films", cursor("2021-01-01")).await.unwrap();
    tracker.set("genres", cursor("2021-01-01")).await.unwrap();

    let removed = tracker.remove(&["films", "persons"]).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.persisted().keys().collect::<Vec<_>>(), vec!["genres"]);
}

#[tokio::test]
async fn test_tracker_over_filesystem_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state.json");

    let mut tracker = WatermarkTracker::load(FilesystemStore::new(&path))
        .await
        .unwrap();
    tracker.set("films", cursor("2021-01-01T00:00:09Z")).await.unwrap();
    drop(tracker);

    let reloaded = WatermarkTracker::load(FilesystemStore::new(&path))
        .await
        .unwrap();
    assert_eq!(reloaded.get("films"), Some(cursor("2021-01-01T00:00:09Z")));
}
