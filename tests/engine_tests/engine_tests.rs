//! Tests for StorageEngine
//!
//! These tests verify:
//! - Basic get/set/remove/clear/keys operations
//! - Inline vs. value-file placement around the threshold
//! - Batch validation (all or nothing)
//! - Rollback when the manifest cannot be written
//! - Persistence and crash recovery across reopen
//! - Merge semantics

use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use stashkv::config::{Config, SyncStrategy};
use stashkv::engine::{merge_json_objects, StorageEngine};
use stashkv::manifest::ManifestEntry;
use stashkv::storage::FileState;
use stashkv::StashError;
use tempfile::TempDir;

const THRESHOLD: usize = 16;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(path: &Path) -> Config {
    Config::builder()
        .storage_dir(path)
        .inline_threshold(THRESHOLD)
        .sync_strategy(SyncStrategy::EveryWrite)
        .build()
}

fn setup_temp_engine() -> (TempDir, StorageEngine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = StorageEngine::open(config_for(temp_dir.path())).unwrap();
    (temp_dir, engine)
}

fn reopen(temp_dir: &TempDir) -> StorageEngine {
    StorageEngine::open(config_for(temp_dir.path())).unwrap()
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn keys(items: &[&str]) -> Vec<String> {
    items.iter().map(|k| k.to_string()).collect()
}

fn big(fill: char) -> String {
    fill.to_string().repeat(THRESHOLD * 4)
}

/// Replace the manifest file with a non-empty directory so the next
/// manifest write fails
fn block_manifest(engine: &StorageEngine) {
    let path = engine.manifest_path().to_path_buf();
    if path.is_file() {
        fs::remove_file(&path).unwrap();
    }
    fs::create_dir_all(path.join("blocker")).unwrap();
}

fn unblock_manifest(engine: &StorageEngine) {
    fs::remove_dir_all(engine.manifest_path()).unwrap();
}

fn parse(value: &str) -> Value {
    serde_json::from_str(value).unwrap()
}

fn committed_files(engine: &StorageEngine) -> usize {
    engine
        .values()
        .scan()
        .unwrap()
        .iter()
        .filter(|f| f.state == FileState::Committed)
        .count()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mystore");

    let engine = StorageEngine::open(config_for(&data_dir)).unwrap();

    assert!(data_dir.is_dir());
    assert!(data_dir.join("values").is_dir());
    assert!(engine.is_empty());
    assert_eq!(engine.storage_dir(), data_dir.as_path());
}

#[test]
fn test_engine_open_rejects_empty_path() {
    let config = Config::builder().storage_dir("").build();

    assert!(matches!(
        StorageEngine::open(config),
        Err(StashError::Config(_))
    ));
}

#[test]
fn test_engine_set_get() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(pairs(&[("hello", "world")])).unwrap();

    assert_eq!(engine.get("hello").unwrap(), Some("world".to_string()));
    assert!(engine.manifest_path().is_file());
}

#[test]
fn test_engine_get_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();

    assert_eq!(engine.get("nonexistent").unwrap(), None);
}

#[test]
fn test_engine_multi_get_preserves_request_order() {
    let (_temp, mut engine) = setup_temp_engine();

    engine
        .multi_set(pairs(&[("a", "1"), ("b", "2"), ("c", "3")]))
        .unwrap();

    let result = engine.multi_get(&keys(&["c", "missing", "a", "c"])).unwrap();

    assert_eq!(
        result,
        vec![
            ("c".to_string(), Some("3".to_string())),
            ("missing".to_string(), None),
            ("a".to_string(), Some("1".to_string())),
            ("c".to_string(), Some("3".to_string())),
        ]
    );
}

#[test]
fn test_engine_set_overwrite() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(pairs(&[("key", "value1")])).unwrap();
    engine.multi_set(pairs(&[("key", "value2")])).unwrap();

    assert_eq!(engine.get("key").unwrap(), Some("value2".to_string()));
    assert_eq!(engine.len(), 1);
}

#[test]
fn test_engine_empty_value_is_stored() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(pairs(&[("empty", "")])).unwrap();

    assert_eq!(engine.get("empty").unwrap(), Some(String::new()));
}

#[test]
fn test_engine_remove() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(pairs(&[("a", "1"), ("b", "2")])).unwrap();
    engine.multi_remove(&keys(&["a"])).unwrap();

    assert_eq!(engine.get("a").unwrap(), None);
    assert_eq!(engine.get("b").unwrap(), Some("2".to_string()));
}

#[test]
fn test_engine_remove_nonexistent_key() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_remove(&keys(&["nonexistent", ""])).unwrap();

    assert_eq!(engine.get("nonexistent").unwrap(), None);
}

#[test]
fn test_engine_all_keys_sorted() {
    let (_temp, mut engine) = setup_temp_engine();

    engine
        .multi_set(pairs(&[("zeta", "1"), ("alpha", "2")]))
        .unwrap();
    engine.multi_set(vec![("mid".to_string(), big('m'))]).unwrap();

    assert_eq!(engine.all_keys(), keys(&["alpha", "mid", "zeta"]));
}

#[test]
fn test_engine_clear() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(pairs(&[("a", "1")])).unwrap();
    engine
        .multi_set(vec![("b".to_string(), big('b')), ("c".to_string(), big('c'))])
        .unwrap();

    engine.clear().unwrap();

    assert!(engine.all_keys().is_empty());
    assert_eq!(committed_files(&engine), 0);
    assert_eq!(engine.get("b").unwrap(), None);
}

// =============================================================================
// Placement Tests
// =============================================================================

#[test]
fn test_engine_threshold_boundary() {
    let (_temp, mut engine) = setup_temp_engine();
    let at = "a".repeat(THRESHOLD);
    let over = "o".repeat(THRESHOLD + 1);

    engine
        .multi_set(vec![("at".to_string(), at.clone()), ("over".to_string(), over.clone())])
        .unwrap();

    assert_eq!(engine.entry("at"), Some(&ManifestEntry::Inline(at.clone())));
    assert!(engine.entry("over").unwrap().is_external());
    assert!(engine.values().path_for("over").is_file());
    assert!(!engine.values().path_for("at").exists());

    assert_eq!(engine.get("at").unwrap(), Some(at));
    assert_eq!(engine.get("over").unwrap(), Some(over));
    assert_eq!(engine.inline_count(), 1);
    assert_eq!(engine.external_count(), 1);
}

#[test]
fn test_engine_threshold_counts_bytes() {
    let (_temp, mut engine) = setup_temp_engine();
    // 6 chars, 18 bytes in UTF-8
    let value = "日本語日本語".to_string();

    engine.multi_set(vec![("jp".to_string(), value.clone())]).unwrap();

    assert!(engine.entry("jp").unwrap().is_external());
    assert_eq!(engine.get("jp").unwrap(), Some(value));
}

#[test]
fn test_engine_large_to_small_removes_value_file() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(vec![("key".to_string(), big('x'))]).unwrap();
    assert!(engine.values().path_for("key").is_file());

    engine.multi_set(pairs(&[("key", "tiny")])).unwrap();

    assert!(!engine.values().path_for("key").exists());
    assert_eq!(engine.get("key").unwrap(), Some("tiny".to_string()));
    assert_eq!(engine.all_keys(), keys(&["key"]));
}

#[test]
fn test_engine_small_to_large() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(pairs(&[("key", "tiny")])).unwrap();
    engine.multi_set(vec![("key".to_string(), big('y'))]).unwrap();

    assert!(engine.entry("key").unwrap().is_external());
    assert_eq!(engine.get("key").unwrap(), Some(big('y')));
}

#[test]
fn test_engine_large_overwrite() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(vec![("key".to_string(), big('1'))]).unwrap();
    engine.multi_set(vec![("key".to_string(), big('2'))]).unwrap();

    assert_eq!(engine.get("key").unwrap(), Some(big('2')));
    assert_eq!(committed_files(&engine), 1);
    assert!(engine.values().scan().unwrap().iter().all(|f| f.state == FileState::Committed));
}

#[test]
fn test_engine_remove_deletes_value_file() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(vec![("key".to_string(), big('z'))]).unwrap();
    engine.multi_remove(&keys(&["key"])).unwrap();

    assert!(!engine.values().path_for("key").exists());
    assert_eq!(engine.get("key").unwrap(), None);
}

#[test]
fn test_engine_same_key_twice_in_batch() {
    let (_temp, mut engine) = setup_temp_engine();

    // Large then small: nothing left on disk for the key
    engine
        .multi_set(vec![("k1".to_string(), big('a')), ("k1".to_string(), "small".to_string())])
        .unwrap();
    // Small then large: value file wins
    engine
        .multi_set(vec![("k2".to_string(), "small".to_string()), ("k2".to_string(), big('b'))])
        .unwrap();

    assert_eq!(engine.get("k1").unwrap(), Some("small".to_string()));
    assert_eq!(engine.get("k2").unwrap(), Some(big('b')));
    assert_eq!(engine.values().scan().unwrap().len(), 1);
}

#[test]
fn test_engine_very_long_key_spills() {
    let temp_dir = TempDir::new().unwrap();
    let key = "k".repeat(2100);
    {
        let mut engine = reopen(&temp_dir);

        engine.multi_set(vec![(key.clone(), "small".to_string())]).unwrap();
        engine.multi_set(vec![(key.clone(), big('v'))]).unwrap();

        assert!(engine.entry(&key).unwrap().is_external());
        assert_eq!(engine.get(&key).unwrap(), Some(big('v')));
    }

    let mut engine = reopen(&temp_dir);
    assert_eq!(engine.get(&key).unwrap(), Some(big('v')));
    assert_eq!(committed_files(&engine), 1);

    engine.multi_remove(&[key.clone()]).unwrap();
    assert!(engine.values().scan().unwrap().is_empty());
}

#[test]
fn test_engine_long_keys_do_not_share_files() {
    let (_temp, mut engine) = setup_temp_engine();
    let key_a = "x".repeat(3000);
    let key_b = format!("{}y", "x".repeat(2999));

    engine
        .multi_set(vec![(key_a.clone(), big('a')), (key_b.clone(), big('b'))])
        .unwrap();

    assert_eq!(engine.get(&key_a).unwrap(), Some(big('a')));
    assert_eq!(engine.get(&key_b).unwrap(), Some(big('b')));
    assert_eq!(committed_files(&engine), 2);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_engine_empty_key_fails_whole_batch() {
    let (_temp, mut engine) = setup_temp_engine();

    let result = engine.multi_set(vec![
        ("good".to_string(), "1".to_string()),
        ("big".to_string(), big('q')),
        (String::new(), "bad".to_string()),
    ]);

    assert!(matches!(result, Err(StashError::InvalidType { .. })));
    assert!(engine.is_empty());
    assert!(!engine.manifest_path().exists());
    assert!(engine.values().scan().unwrap().is_empty());
}

#[test]
fn test_engine_merge_validates_too() {
    let (_temp, mut engine) = setup_temp_engine();

    let result = engine.multi_merge(pairs(&[("ok", "{}"), ("", "{}")]));

    assert!(matches!(result, Err(StashError::InvalidType { .. })));
    assert!(engine.is_empty());
}

// =============================================================================
// Rollback Tests
// =============================================================================

#[test]
fn test_engine_set_rolls_back_on_manifest_failure() {
    let (_temp, mut engine) = setup_temp_engine();
    block_manifest(&engine);

    let result = engine.multi_set(vec![
        ("small".to_string(), "1".to_string()),
        ("large".to_string(), big('l')),
    ]);

    assert!(matches!(result, Err(StashError::Io(_))));
    assert!(engine.is_empty());
    assert_eq!(engine.get("large").unwrap(), None);
    assert!(engine.values().scan().unwrap().is_empty());

    unblock_manifest(&engine);
    engine.multi_set(pairs(&[("small", "1")])).unwrap();
    assert_eq!(engine.get("small").unwrap(), Some("1".to_string()));
}

#[test]
fn test_engine_failed_overwrite_keeps_old_value() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(vec![("key".to_string(), big('o'))]).unwrap();
    block_manifest(&engine);

    assert!(engine.multi_set(vec![("key".to_string(), big('n'))]).is_err());
    assert!(engine.multi_set(pairs(&[("key", "small")])).is_err());

    // Old value still readable from the untouched value file
    assert_eq!(engine.get("key").unwrap(), Some(big('o')));
    assert_eq!(committed_files(&engine), 1);
}

#[test]
fn test_engine_remove_rolls_back_on_manifest_failure() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(pairs(&[("a", "1")])).unwrap();
    engine.multi_set(vec![("b".to_string(), big('b'))]).unwrap();
    block_manifest(&engine);

    assert!(engine.multi_remove(&keys(&["a", "b"])).is_err());

    assert_eq!(engine.get("a").unwrap(), Some("1".to_string()));
    assert_eq!(engine.get("b").unwrap(), Some(big('b')));
}

#[test]
fn test_engine_clear_rolls_back_on_manifest_failure() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(pairs(&[("a", "1")])).unwrap();
    engine.multi_set(vec![("b".to_string(), big('b'))]).unwrap();
    block_manifest(&engine);

    assert!(matches!(engine.clear(), Err(StashError::Io(_))));

    assert_eq!(engine.all_keys(), keys(&["a", "b"]));
    assert_eq!(engine.get("b").unwrap(), Some(big('b')));
}

#[test]
fn test_engine_failed_promotion_keeps_committed_batch() {
    let temp_dir = TempDir::new().unwrap();
    let mut engine = reopen(&temp_dir);
    engine.multi_set(vec![("k".to_string(), big('o'))]).unwrap();

    // The staged file cannot be renamed over a non-empty directory
    let committed = engine.values().path_for("k");
    fs::remove_file(&committed).unwrap();
    fs::create_dir_all(committed.join("blocker")).unwrap();

    engine.multi_set(vec![("k".to_string(), big('n'))]).unwrap();

    assert!(engine.entry("k").unwrap().matches_file(big('n').as_bytes()));
    assert_eq!(engine.get("k").unwrap(), Some(big('n')));
    assert!(engine.values().staged_path_for("k").is_file());
    drop(engine);

    // Next open finishes the rename once the path is free again
    fs::remove_dir_all(&committed).unwrap();
    let engine = reopen(&temp_dir);

    assert_eq!(engine.get("k").unwrap(), Some(big('n')));
    assert!(committed.is_file());
    assert!(!engine.values().staged_path_for("k").exists());
}

#[test]
fn test_engine_remove_after_failed_promotion_leaves_no_staged_file() {
    let (_temp, mut engine) = setup_temp_engine();
    let committed = engine.values().path_for("k");
    fs::create_dir_all(committed.join("blocker")).unwrap();

    engine.multi_set(vec![("k".to_string(), big('n'))]).unwrap();
    engine.multi_remove(&keys(&["k"])).unwrap();

    assert_eq!(engine.get("k").unwrap(), None);
    assert!(!engine.values().staged_path_for("k").exists());
}

// =============================================================================
// Persistence & Recovery Tests
// =============================================================================

#[test]
fn test_engine_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut engine = reopen(&temp_dir);
        engine.multi_set(pairs(&[("small", "value")])).unwrap();
        engine.multi_set(vec![("large".to_string(), big('p'))]).unwrap();
        engine.multi_remove(&keys(&["gone"])).unwrap();
    }

    let engine = reopen(&temp_dir);

    assert_eq!(engine.get("small").unwrap(), Some("value".to_string()));
    assert_eq!(engine.get("large").unwrap(), Some(big('p')));
    assert_eq!(engine.len(), 2);
}

#[test]
fn test_engine_survives_abrupt_drop() {
    let temp_dir = TempDir::new().unwrap();
    let mut engine = reopen(&temp_dir);
    engine.multi_set(vec![("big".to_string(), big('d'))]).unwrap();

    // No shutdown path runs
    std::mem::forget(engine);

    let engine = reopen(&temp_dir);
    assert_eq!(engine.get("big").unwrap(), Some(big('d')));
}

#[test]
fn test_engine_corrupt_manifest_starts_empty() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut engine = reopen(&temp_dir);
        engine.multi_set(pairs(&[("a", "1")])).unwrap();
        engine.multi_set(vec![("b".to_string(), big('b'))]).unwrap();
        fs::write(engine.manifest_path(), b"definitely not a manifest").unwrap();
    }

    let mut engine = reopen(&temp_dir);

    assert!(engine.is_empty());
    // Value files of the lost manifest are orphans now
    assert!(engine.values().scan().unwrap().is_empty());

    engine.multi_set(pairs(&[("fresh", "start")])).unwrap();
    drop(engine);
    assert_eq!(reopen(&temp_dir).get("fresh").unwrap(), Some("start".to_string()));
}

#[test]
fn test_engine_recovery_commits_staged_file() {
    let temp_dir = TempDir::new().unwrap();
    let (committed, pending) = {
        let mut engine = reopen(&temp_dir);
        engine.multi_set(vec![("key".to_string(), big('2'))]).unwrap();
        let committed = engine.values().path_for("key");
        let pending = engine.values().staged_path_for("key");
        (committed, pending)
    };

    // Crash after the manifest commit but before the rename
    fs::rename(&committed, &pending).unwrap();
    fs::write(&committed, big('1')).unwrap();

    let engine = reopen(&temp_dir);

    assert_eq!(engine.get("key").unwrap(), Some(big('2')));
    assert!(!pending.exists());
}

#[test]
fn test_engine_recovery_discards_uncommitted_staged_file() {
    let temp_dir = TempDir::new().unwrap();
    let pending = {
        let mut engine = reopen(&temp_dir);
        engine.multi_set(vec![("key".to_string(), big('1'))]).unwrap();
        engine.values().staged_path_for("key")
    };

    // Crash after staging but before the manifest commit
    fs::write(&pending, big('2')).unwrap();

    let engine = reopen(&temp_dir);

    assert_eq!(engine.get("key").unwrap(), Some(big('1')));
    assert!(!pending.exists());
}

#[test]
fn test_engine_recovery_removes_orphan_files() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = reopen(&temp_dir);
        engine.values().write("orphan", b"left behind").unwrap();
        fs::write(temp_dir.path().join("manifest.stash.tmp"), b"partial").unwrap();
    }

    let engine = reopen(&temp_dir);

    assert!(engine.values().scan().unwrap().is_empty());
    assert!(!temp_dir.path().join("manifest.stash.tmp").exists());
}

#[test]
fn test_engine_missing_value_file_reads_as_absent() {
    let (_temp, mut engine) = setup_temp_engine();

    engine
        .multi_set(vec![("lost".to_string(), big('l')), ("kept".to_string(), "ok".to_string())])
        .unwrap();
    fs::remove_file(engine.values().path_for("lost")).unwrap();

    let result = engine.multi_get(&keys(&["lost", "kept"])).unwrap();

    assert_eq!(
        result,
        vec![
            ("lost".to_string(), None),
            ("kept".to_string(), Some("ok".to_string())),
        ]
    );
    // Still listed until removed
    assert_eq!(engine.all_keys(), keys(&["kept", "lost"]));
}

#[test]
fn test_engine_mismatched_value_file_reads_as_absent() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(vec![("key".to_string(), big('a'))]).unwrap();
    fs::write(engine.values().path_for("key"), big('b')).unwrap();

    assert_eq!(engine.get("key").unwrap(), None);
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_merge_json_objects_is_shallow() {
    let merged = merge_json_objects(
        r#"{"a":1,"nested":{"x":1,"y":2}}"#,
        r#"{"b":2,"nested":{"z":3}}"#,
    )
    .unwrap();

    assert_eq!(parse(&merged), json!({"a": 1, "b": 2, "nested": {"z": 3}}));
}

#[test]
fn test_merge_json_objects_requires_objects() {
    assert_eq!(merge_json_objects("[1,2]", r#"{"a":1}"#), None);
    assert_eq!(merge_json_objects(r#"{"a":1}"#, "3"), None);
    assert_eq!(merge_json_objects("not json", r#"{"a":1}"#), None);
}

#[test]
fn test_engine_merge_into_existing_object() {
    let (_temp, mut engine) = setup_temp_engine();

    engine
        .multi_set(pairs(&[("user", r#"{"name":"ada","age":36}"#)]))
        .unwrap();
    engine
        .multi_merge(pairs(&[("user", r#"{"age":37,"lang":"en"}"#)]))
        .unwrap();

    let stored = engine.get("user").unwrap().unwrap();
    assert_eq!(parse(&stored), json!({"name": "ada", "age": 37, "lang": "en"}));
}

#[test]
fn test_engine_merge_without_existing_value_sets() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_merge(pairs(&[("new", r#"{"a":1}"#)])).unwrap();

    assert_eq!(engine.get("new").unwrap(), Some(r#"{"a":1}"#.to_string()));
}

#[test]
fn test_engine_merge_non_object_overwrites() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(pairs(&[("k", "plain text")])).unwrap();
    engine.multi_merge(pairs(&[("k", r#"{"a":1}"#)])).unwrap();

    assert_eq!(engine.get("k").unwrap(), Some(r#"{"a":1}"#.to_string()));
}

#[test]
fn test_engine_merge_twice_in_one_batch() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(pairs(&[("k", r#"{"a":1}"#)])).unwrap();
    engine
        .multi_merge(pairs(&[("k", r#"{"b":2}"#), ("k", r#"{"c":3}"#)]))
        .unwrap();

    let stored = engine.get("k").unwrap().unwrap();
    assert_eq!(parse(&stored), json!({"a": 1, "b": 2, "c": 3}));
}

#[test]
fn test_engine_merge_crosses_threshold() {
    let (_temp, mut engine) = setup_temp_engine();

    engine.multi_set(pairs(&[("k", r#"{"a":1}"#)])).unwrap();
    assert!(!engine.entry("k").unwrap().is_external());

    engine
        .multi_merge(pairs(&[("k", r#"{"padding":"xxxxxxxxxxxxxxxxxxxxxxxx"}"#)]))
        .unwrap();

    assert!(engine.entry("k").unwrap().is_external());
    let stored = engine.get("k").unwrap().unwrap();
    assert_eq!(
        parse(&stored),
        json!({"a": 1, "padding": "xxxxxxxxxxxxxxxxxxxxxxxx"})
    );
}
