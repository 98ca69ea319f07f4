//! Configuration for StashKV
//!
//! Centralized configuration with sensible defaults. Every store instance
//! carries its own `Config`, so several stores can live in one process.

use std::path::PathBuf;

/// Values up to this many bytes are stored inline in the manifest
pub const DEFAULT_INLINE_THRESHOLD: usize = 1024;

/// Main configuration for a StashKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {storage_dir}/
    ///     ├── manifest.stash   (inline values + external placeholders)
    ///     └── values/          (one file per large value)
    pub storage_dir: PathBuf,

    /// Largest value (in bytes) kept inline in the manifest
    pub inline_threshold: usize,

    /// Sync strategy: whether to fsync after each committed write
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Lifecycle Configuration
    // -------------------------------------------------------------------------
    /// Remove all stored data when the store is invalidated
    pub clear_on_invalidate: bool,
}

/// Sync strategy for manifest and value file writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync files and the parent directory on every commit (safest)
    EveryWrite,

    /// Leave flushing to the OS (survives process crashes, not power loss)
    OsBuffered,
}

impl SyncStrategy {
    pub fn should_sync(&self) -> bool {
        matches!(self, SyncStrategy::EveryWrite)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./stashkv_data"),
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            sync_strategy: SyncStrategy::EveryWrite,
            clear_on_invalidate: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the storage directory (root for all files)
    pub fn storage_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = path.into();
        self
    }

    /// Set the inline value threshold (in bytes)
    pub fn inline_threshold(mut self, bytes: usize) -> Self {
        self.config.inline_threshold = bytes;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Clear all data when the store is invalidated
    pub fn clear_on_invalidate(mut self, enabled: bool) -> Self {
        self.config.clear_on_invalidate = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
