//! Value File Store
//!
//! Reads and writes large values as individual files under one directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::SyncStrategy;
use crate::error::{Result, StashError};

use super::naming::{file_name, key_from_stem, parse_file_name, FileState};
use super::{sync_dir, write_file};

/// A value file found on disk by `ValueFileStore::scan`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFile {
    /// File name without its suffix
    pub stem: String,
    pub state: FileState,
}

impl ValueFile {
    /// The key, when it can be read off the name (short keys only)
    pub fn key(&self) -> Option<String> {
        key_from_stem(&self.stem)
    }
}

/// Owns the value files directory
///
/// Writes go through a staged `.val.pending` file that is renamed into
/// place, so a reader never sees a half-written value.
pub struct ValueFileStore {
    /// Directory holding all value files
    dir: PathBuf,

    /// Whether to fsync after writes and renames
    sync: bool,
}

impl ValueFileStore {
    /// Open or create the value directory
    pub fn open(dir: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            sync: sync_strategy.should_sync(),
        })
    }

    /// Create or overwrite the value file for `key`
    pub fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.stage(key, bytes)?;
        self.commit_staged(key)
    }

    /// Read the value file for `key`
    ///
    /// Returns `NotFound` if there is no committed file for the key.
    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.read_state(key, FileState::Committed)
    }

    /// Remove the value file for `key`; a missing file is not an error
    pub fn delete(&self, key: &str) -> Result<()> {
        self.remove_path(&self.path_with_state(key, FileState::Committed))
    }

    /// Remove every value file, committed or staged
    pub fn delete_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.dir)?;

        if self.sync {
            if let Some(parent) = self.dir.parent() {
                sync_dir(parent)?;
            }
        }

        Ok(())
    }

    // =========================================================================
    // Staging
    // =========================================================================

    /// Write `bytes` to the staged file for `key` without touching the
    /// committed file
    pub fn stage(&self, key: &str, bytes: &[u8]) -> Result<()> {
        write_file(&self.path_with_state(key, FileState::Pending), bytes, self.sync)?;
        Ok(())
    }

    /// Rename the staged file for `key` over its committed file
    pub fn commit_staged(&self, key: &str) -> Result<()> {
        fs::rename(
            self.path_with_state(key, FileState::Pending),
            self.path_for(key),
        )?;

        if self.sync {
            sync_dir(&self.dir)?;
        }

        Ok(())
    }

    /// Read the staged file for `key`
    pub fn read_staged(&self, key: &str) -> Result<Vec<u8>> {
        self.read_state(key, FileState::Pending)
    }

    /// Remove the staged file for `key`, if any
    pub fn discard_staged(&self, key: &str) -> Result<()> {
        self.remove_path(&self.path_with_state(key, FileState::Pending))
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// List every recognizable value file in the directory, sorted by stem
    ///
    /// Entries whose names `file_name` could not have produced are skipped.
    pub fn scan(&self) -> Result<Vec<ValueFile>> {
        let mut found = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();

            let parsed = match (entry.file_type()?.is_file(), name.to_str()) {
                (true, Some(name)) => parse_file_name(name),
                _ => None,
            };

            match parsed {
                Some((stem, state)) => found.push(ValueFile { stem, state }),
                None => tracing::debug!(
                    "Ignoring unrecognized entry in value store: {}",
                    entry.path().display()
                ),
            }
        }

        found.sort_by(|a, b| a.stem.cmp(&b.stem));
        Ok(found)
    }

    /// Remove a file returned by `scan`
    pub fn discard(&self, file: &ValueFile) -> Result<()> {
        self.remove_path(&self.dir.join(format!("{}{}", file.stem, file.state.suffix())))
    }

    /// Absolute path of the committed file for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.path_with_state(key, FileState::Committed)
    }

    /// Absolute path of the staged file for `key`
    pub fn staged_path_for(&self, key: &str) -> PathBuf {
        self.path_with_state(key, FileState::Pending)
    }

    /// Get the value directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn path_with_state(&self, key: &str, state: FileState) -> PathBuf {
        self.dir.join(file_name(key, state))
    }

    fn read_state(&self, key: &str, state: FileState) -> Result<Vec<u8>> {
        match fs::read(self.path_with_state(key, state)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StashError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove_path(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
