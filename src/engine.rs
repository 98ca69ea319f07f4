//! Engine Module
//!
//! The storage engine that owns the manifest and the value files.
//!
//! ## Responsibilities
//! - Load the manifest on open and recover from interrupted writes
//! - Decide per key whether a value is inline or spilled to a file
//! - Persist the manifest after every mutation, rolling back on failure
//! - Serve get/set/merge/remove/clear/keys
//!
//! The engine is deliberately single-threaded (`&mut self` for writes). The
//! serial queue owns it and is the only thing that ever calls it.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::Config;
use crate::error::{Result, StashError};
use crate::manifest::{self, Manifest, ManifestEntry};
use crate::storage::{self, FileState, ValueFileStore};

/// Undo record: a key and the entry it held before the current operation
type UndoLog = Vec<(String, Option<ManifestEntry>)>;

/// The main storage engine
///
/// ## Write Path
///
/// 1. Validate the whole batch (nothing touched on failure)
/// 2. Stage large values as `.val.pending` files
/// 3. Apply the batch to the in-memory manifest, recording an undo log
/// 4. Atomically replace the manifest file
/// 5. Rename staged files into place, delete files made stale
///
/// A failure in 2 or 4 undoes 3 and discards the staged files, so memory and
/// disk never diverge. Once 4 succeeds the batch is committed: a failed
/// rename in 5 is logged, reads fall back to the staged file, and the next
/// open finishes the rename. A crash between 4 and 5 is repaired the same way.
pub struct StorageEngine {
    /// Engine configuration
    config: Config,

    /// Path of the committed manifest blob
    manifest_path: PathBuf,

    /// Scratch path used while replacing the manifest
    manifest_tmp_path: PathBuf,

    /// In-memory manifest (the only copy anything reads)
    manifest: Manifest,

    /// Files for values above the inline threshold
    values: ValueFileStore,
}

impl StorageEngine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const MANIFEST_FILENAME: &'static str = "manifest.stash";
    const MANIFEST_TMP_FILENAME: &'static str = "manifest.stash.tmp";
    const VALUES_DIR: &'static str = "values";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create storage directories
    /// 2. Load the manifest (corrupt → start empty)
    /// 3. Reconcile value files with the manifest
    pub fn open(config: Config) -> Result<Self> {
        if config.storage_dir.as_os_str().is_empty() {
            return Err(StashError::Config(
                "storage directory must not be empty".to_string(),
            ));
        }

        // Step 1: Create directories (paths derived from storage_dir)
        fs::create_dir_all(&config.storage_dir)?;
        let manifest_path = config.storage_dir.join(Self::MANIFEST_FILENAME);
        let manifest_tmp_path = config.storage_dir.join(Self::MANIFEST_TMP_FILENAME);
        let values = ValueFileStore::open(
            &config.storage_dir.join(Self::VALUES_DIR),
            config.sync_strategy,
        )?;

        // A leftover scratch manifest was never committed
        match fs::remove_file(&manifest_tmp_path) {
            Ok(()) => tracing::debug!("Removed uncommitted manifest scratch file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // Step 2: Load manifest
        let manifest = Self::load_manifest(&manifest_path)?;

        let engine = Self {
            config,
            manifest_path,
            manifest_tmp_path,
            manifest,
            values,
        };

        // Step 3: Recover value files
        engine.recover_value_files()?;

        tracing::debug!(
            "Opened store at {} ({} keys, {} in value files)",
            engine.config.storage_dir.display(),
            engine.len(),
            engine.external_count()
        );

        Ok(engine)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified storage directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.storage_dir = path.to_path_buf();
        Self::open(config)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up several keys at once
    ///
    /// Returns one pair per requested key, in request order. Missing keys
    /// pair with `None`.
    pub fn multi_get(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>> {
        keys.iter()
            .map(|key| Ok((key.clone(), self.get(key)?)))
            .collect()
    }

    /// Look up a single key
    ///
    /// A value file that is missing or does not match its manifest entry
    /// reads as absent; only unexpected I/O errors fail.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let entry = match self.manifest.get(key) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let bytes = match entry {
            ManifestEntry::Inline(value) => return Ok(Some(value.clone())),
            ManifestEntry::External { .. } => match self.read_external(key, entry)? {
                Some(bytes) => bytes,
                None => return Ok(None),
            },
        };

        match String::from_utf8(bytes) {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                tracing::warn!("Value file for key {:?} is not UTF-8; treating as absent", key);
                Ok(None)
            }
        }
    }

    /// All keys currently stored, sorted
    pub fn all_keys(&self) -> Vec<String> {
        self.manifest.keys().cloned().collect()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store several key/value pairs as one operation
    ///
    /// The whole batch is validated before anything is written; later pairs
    /// win over earlier ones for the same key.
    pub fn multi_set(&mut self, pairs: Vec<(String, String)>) -> Result<()> {
        validate_pairs(&pairs)?;
        self.apply_pairs(pairs)
    }

    /// Merge several key/value pairs as one operation
    ///
    /// When both the stored value and the new value are JSON objects, the
    /// new object's top-level members are written over the stored object.
    /// Anything else behaves like `multi_set`.
    pub fn multi_merge(&mut self, pairs: Vec<(String, String)>) -> Result<()> {
        validate_pairs(&pairs)?;

        // Later pairs for the same key merge onto earlier results
        let mut overlay: HashMap<String, String> = HashMap::new();
        let mut merged = Vec::with_capacity(pairs.len());

        for (key, value) in pairs {
            let existing = match overlay.get(&key) {
                Some(value) => Some(value.clone()),
                None => self.get(&key)?,
            };

            let result = match existing {
                Some(existing) => merge_json_objects(&existing, &value).unwrap_or(value),
                None => value,
            };

            overlay.insert(key.clone(), result.clone());
            merged.push((key, result));
        }

        self.apply_pairs(merged)
    }

    /// Remove several keys as one operation; missing keys are ignored
    pub fn multi_remove(&mut self, keys: &[String]) -> Result<()> {
        let mut undo: UndoLog = Vec::new();
        let mut files_to_delete = Vec::new();

        for key in keys {
            if let Some(old) = self.manifest.remove(key) {
                if old.is_external() {
                    files_to_delete.push(key.clone());
                }
                undo.push((key.clone(), Some(old)));
            }
        }

        if undo.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.persist_manifest() {
            self.rollback(undo);
            return Err(e);
        }

        for key in &files_to_delete {
            self.delete_quietly(key);
        }

        Ok(())
    }

    /// Remove every key and every value file
    pub fn clear(&mut self) -> Result<()> {
        let previous = std::mem::take(&mut self.manifest);

        if let Err(e) = self.persist_manifest() {
            self.manifest = previous;
            return Err(e);
        }

        // Committed; leftover files are orphans and are removed on next open
        if let Err(e) = self.values.delete_all() {
            tracing::error!("Failed to delete value files after clear: {}", e);
        }

        tracing::debug!("Cleared store ({} keys removed)", previous.len());
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    /// Number of keys whose value lives in the manifest
    pub fn inline_count(&self) -> usize {
        self.manifest.values().filter(|e| !e.is_external()).count()
    }

    /// Number of keys whose value lives in a value file
    pub fn external_count(&self) -> usize {
        self.manifest.values().filter(|e| e.is_external()).count()
    }

    /// The manifest entry for `key`, if any
    pub fn entry(&self, key: &str) -> Option<&ManifestEntry> {
        self.manifest.get(key)
    }

    /// Get the storage directory path
    pub fn storage_dir(&self) -> &Path {
        &self.config.storage_dir
    }

    /// Get the manifest file path
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Get the value file store
    pub fn values(&self) -> &ValueFileStore {
        &self.values
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Place and persist an already validated batch
    fn apply_pairs(&mut self, pairs: Vec<(String, String)>) -> Result<()> {
        let threshold = self.config.inline_threshold;

        // Keys whose committed value file may become stale
        let was_external: BTreeSet<String> = pairs
            .iter()
            .filter(|(key, _)| self.manifest.get(key).is_some_and(ManifestEntry::is_external))
            .map(|(key, _)| key.clone())
            .collect();

        let mut undo: UndoLog = Vec::with_capacity(pairs.len());
        let mut staged: BTreeSet<String> = BTreeSet::new();
        let mut stale: BTreeSet<String> = BTreeSet::new();

        for (key, value) in pairs {
            let entry = if value.len() <= threshold {
                if staged.remove(&key) {
                    self.discard_quietly(&key);
                }
                if was_external.contains(&key) {
                    stale.insert(key.clone());
                }
                ManifestEntry::Inline(value)
            } else {
                if let Err(e) = self.values.stage(&key, value.as_bytes()) {
                    self.discard_quietly(&key);
                    self.abort(undo, &staged);
                    return Err(e);
                }
                staged.insert(key.clone());
                stale.remove(&key);
                ManifestEntry::external_for(value.as_bytes())
            };

            let old = self.manifest.insert(key.clone(), entry);
            undo.push((key, old));
        }

        if let Err(e) = self.persist_manifest() {
            self.abort(undo, &staged);
            return Err(e);
        }

        // The batch is committed from here on. A staged file that cannot be
        // renamed stays readable through `read_external` and is promoted on
        // the next open.
        for key in &staged {
            if let Err(e) = self.values.commit_staged(key) {
                tracing::error!("Failed to promote staged value file for {:?}: {}", key, e);
            }
        }
        for key in &stale {
            self.delete_quietly(key);
        }

        Ok(())
    }

    /// Undo in-memory changes and discard staged files
    fn abort(&mut self, undo: UndoLog, staged: &BTreeSet<String>) {
        self.rollback(undo);
        for key in staged {
            self.discard_quietly(key);
        }
    }

    /// Restore manifest entries from an undo log (newest change first)
    fn rollback(&mut self, undo: UndoLog) {
        for (key, old) in undo.into_iter().rev() {
            match old {
                Some(entry) => {
                    self.manifest.insert(key, entry);
                }
                None => {
                    self.manifest.remove(&key);
                }
            }
        }
    }

    /// Read an External value, preferring the committed file and falling
    /// back to a staged file left by an interrupted promotion
    ///
    /// `None` if neither file matches the entry.
    fn read_external(&self, key: &str, entry: &ManifestEntry) -> Result<Option<Vec<u8>>> {
        let committed_error = match self.values.read(key) {
            Ok(bytes) if entry.matches_file(&bytes) => return Ok(Some(bytes)),
            Ok(_) => None,
            Err(StashError::NotFound(_)) => None,
            Err(e) => Some(e),
        };

        match self.values.read_staged(key) {
            Ok(bytes) if entry.matches_file(&bytes) => return Ok(Some(bytes)),
            Ok(_) | Err(StashError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        if let Some(e) = committed_error {
            return Err(e);
        }

        tracing::warn!(
            "Value file for key {:?} is missing or does not match manifest; treating as absent",
            key
        );
        Ok(None)
    }

    /// Delete a key's committed file and any staged leftover
    fn delete_quietly(&self, key: &str) {
        if let Err(e) = self.values.delete(key) {
            tracing::warn!("Failed to delete value file for {:?}: {}", key, e);
        }
        self.discard_quietly(key);
    }

    fn discard_quietly(&self, key: &str) {
        if let Err(e) = self.values.discard_staged(key) {
            tracing::warn!("Failed to discard staged value file for {:?}: {}", key, e);
        }
    }

    /// Atomically replace the manifest file with the in-memory manifest
    fn persist_manifest(&self) -> Result<()> {
        let blob = manifest::encode(&self.manifest)?;
        storage::replace_file(
            &self.manifest_tmp_path,
            &self.manifest_path,
            &blob,
            self.config.sync_strategy.should_sync(),
        )?;
        Ok(())
    }

    /// Read the manifest, starting empty if it is missing or corrupt
    fn load_manifest(path: &Path) -> Result<Manifest> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Manifest::new()),
            Err(e) => return Err(e.into()),
        };

        match manifest::decode(&bytes) {
            Ok(manifest) => Ok(manifest),
            Err(StashError::CorruptManifest(reason)) => {
                tracing::warn!(
                    "Manifest at {} is corrupt ({}); starting with an empty store",
                    path.display(),
                    reason
                );
                Ok(Manifest::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Bring value files in line with the committed manifest
    ///
    /// - staged file matching its External entry → rename into place
    /// - any other staged file → discard
    /// - committed file for a key that is not External → delete
    ///
    /// Long keys are not recoverable from their file names, so files are
    /// matched to keys through the stems of the External entries.
    fn recover_value_files(&self) -> Result<()> {
        let mut promoted = 0usize;
        let mut removed = 0usize;

        let external: HashMap<String, (&String, &ManifestEntry)> = self
            .manifest
            .iter()
            .filter(|(_, entry)| entry.is_external())
            .map(|(key, entry)| (storage::file_stem(key), (key, entry)))
            .collect();

        for file in self.values.scan()? {
            let owner = external.get(&file.stem).copied();

            match (file.state, owner) {
                (FileState::Pending, Some((key, entry))) => {
                    let bytes = self.values.read_staged(key)?;
                    if !entry.matches_file(&bytes) {
                        self.values.discard(&file)?;
                        removed += 1;
                    } else if let Err(e) = self.values.commit_staged(key) {
                        // Still served from the staged file by `get`
                        tracing::error!("Failed to promote staged value file for {:?}: {}", key, e);
                    } else {
                        promoted += 1;
                    }
                }
                (_, None) => {
                    self.values.discard(&file)?;
                    removed += 1;
                }
                (FileState::Committed, Some(_)) => {}
            }
        }

        if promoted > 0 || removed > 0 {
            tracing::info!(
                "Value file recovery: {} staged files committed, {} orphaned files removed",
                promoted,
                removed
            );
        }

        Ok(())
    }
}

/// Reject batches containing empty keys
///
/// Keys and values are already `String`s here; loosely typed input is
/// converted (and rejected) by the bridge before it reaches the engine.
fn validate_pairs(pairs: &[(String, String)]) -> Result<()> {
    for (key, _) in pairs {
        if key.is_empty() {
            return Err(StashError::invalid_type(
                "Invalid key - must be a non-empty string",
                Some(key),
            ));
        }
    }
    Ok(())
}

/// Shallow-merge two serialized JSON objects
///
/// Returns `None` unless both inputs parse as JSON objects.
pub fn merge_json_objects(existing: &str, incoming: &str) -> Option<String> {
    let existing: Value = serde_json::from_str(existing).ok()?;
    let incoming: Value = serde_json::from_str(incoming).ok()?;

    match (existing, incoming) {
        (Value::Object(mut base), Value::Object(update)) => {
            base.extend(update);
            serde_json::to_string(&Value::Object(base)).ok()
        }
        _ => None,
    }
}
