//! Error handling and edge case tests.

use datastore::{
    get_data_store, ContentDigest, DataKey, DataStore, FileSystemDataStore, StoreError,
    FILE_SYSTEM_STORE,
};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

// --- Lookup errors ---

#[test]
fn test_missing_path_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = FileSystemDataStore::new(dir.path());

    let err = store
        .get_data_item(&DataKey::unverified("nonexistent.dat"))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(err.is_not_found());
}

#[test]
fn test_directory_path_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = FileSystemDataStore::new(dir.path());
    fs::create_dir(dir.path().join("subdir")).unwrap();

    let err = store
        .get_data_item(&DataKey::unverified("subdir"))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn test_stale_digest_is_mismatch() {
    let dir = TempDir::new().unwrap();
    let store = FileSystemDataStore::new(dir.path());
    fs::write(dir.path().join("results.csv"), b"original").unwrap();
    let key = DataKey::new("results.csv", ContentDigest::from_bytes(b"original"));

    fs::write(dir.path().join("results.csv"), b"overwritten").unwrap();

    let err = store.get_data_item(&key).unwrap_err();
    assert!(matches!(err, StoreError::DigestMismatch { .. }));
    // treated like a miss by callers, but distinguishable for diagnostics
    assert!(err.is_not_found());
}

#[test]
fn test_unverified_key_skips_digest_check() {
    let dir = TempDir::new().unwrap();
    let store = FileSystemDataStore::new(dir.path());
    fs::write(dir.path().join("results.csv"), b"original").unwrap();
    fs::write(dir.path().join("results.csv"), b"overwritten").unwrap();

    let content = store
        .get_content(&DataKey::unverified("results.csv"), None)
        .unwrap();
    assert_eq!(content, b"overwritten");
}

// --- Best-effort deletion ---

/// Route the warnings emitted by best-effort deletion through the test
/// writer so failures show them alongside the assertion output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[test]
fn test_delete_with_missing_key_still_deletes_the_rest() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = FileSystemDataStore::new(dir.path());
    fs::write(dir.path().join("a.dat"), b"a").unwrap();
    fs::write(dir.path().join("b.dat"), b"b").unwrap();

    let keys = vec![
        DataKey::unverified("a.dat"),
        DataKey::unverified("already-gone.dat"),
        DataKey::unverified("b.dat"),
    ];
    store.delete(&keys);

    assert!(!store.contains_path("a.dat"));
    assert!(!store.contains_path("b.dat"));
}

#[test]
fn test_delete_with_stale_digest_leaves_file_alone() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = FileSystemDataStore::new(dir.path());
    fs::write(dir.path().join("a.dat"), b"current").unwrap();

    let stale = DataKey::new("a.dat", ContentDigest::from_bytes(b"previous"));
    store.delete(&[stale]);

    assert!(store.contains_path("a.dat"));
}

// --- contains_path ---

#[test]
fn test_contains_path_only_matches_regular_files() {
    let dir = TempDir::new().unwrap();
    let store = FileSystemDataStore::new(dir.path());
    fs::create_dir(dir.path().join("test_dir")).unwrap();
    fs::write(dir.path().join("test_dir").join("file"), b"x").unwrap();

    assert!(store.contains_path("test_dir/file"));
    assert!(!store.contains_path("test_dir"));
    assert!(!store.contains_path("missing"));
}

// --- Registry errors ---

#[test]
fn test_unregistered_store_name() {
    let err = get_data_store("FooDataStore", &json!({}))
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownStoreType(_)));
}

#[test]
fn test_config_with_unknown_field() {
    let dir = TempDir::new().unwrap();
    let err = get_data_store(
        FILE_SYSTEM_STORE,
        &json!({ "root": dir.path().to_string_lossy(), "compression": "zstd" }),
    )
    .map(|_| ())
    .unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfiguration(_)));
}

#[test]
fn test_config_with_missing_field() {
    let err = get_data_store(FILE_SYSTEM_STORE, &json!({}))
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfiguration(_)));
}

// --- Root creation ---

#[test]
fn test_missing_root_scans_empty_rather_than_failing() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("never-created");
    let store = FileSystemDataStore::new(&root);
    fs::remove_dir_all(&root).unwrap();

    let keys = store.find_new_data(chrono::Local::now()).unwrap();
    assert!(keys.is_empty());
    assert!(!store.contains_path("anything"));
}
