//! Store Module
//!
//! The public face of StashKV: batch operations that return immediately
//! with a `Pending` handle, executed one at a time by the serial queue.

use std::path::Path;

use crate::config::Config;
use crate::engine::StorageEngine;
use crate::error::Result;
use crate::queue::{LifecycleState, Pending, SerialQueue, Task};

/// A persistent, asynchronous, string-keyed key-value store
///
/// Each call is one task on the queue, so a batch is never observed
/// half-applied by another batch. Independent `Store`s (for example one per
/// tenant or per test) can coexist as long as their storage directories
/// differ.
///
/// ```no_run
/// use stashkv::{Config, Store};
///
/// let store = Store::open(Config::builder().storage_dir("/tmp/stash").build())?;
/// store.multi_set(vec![("a".into(), "1".into())]).wait()?;
/// let values = store.multi_get(vec!["a".into(), "b".into()]).wait()?;
/// assert_eq!(values[1], ("b".to_string(), None));
/// # Ok::<(), stashkv::StashError>(())
/// ```
pub struct Store {
    /// Store configuration
    config: Config,

    /// Queue owning the engine
    queue: SerialQueue,
}

impl Store {
    /// Open the engine and start its queue
    pub fn open(config: Config) -> Result<Self> {
        let engine = StorageEngine::open(config.clone())?;
        let queue = SerialQueue::start(engine)?;

        tracing::info!("Store opened at {}", config.storage_dir.display());

        Ok(Self { config, queue })
    }

    /// Open with a path (convenience method)
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().storage_dir(path).build())
    }

    // =========================================================================
    // Batch Operations
    // =========================================================================

    /// Look up keys; missing keys pair with `None`, in request order
    pub fn multi_get(&self, keys: Vec<String>) -> Pending<Vec<(String, Option<String>)>> {
        self.queue.call(move |engine| engine.multi_get(&keys))
    }

    /// Store key/value pairs; all or nothing
    pub fn multi_set(&self, pairs: Vec<(String, String)>) -> Pending<()> {
        self.queue.call(move |engine| engine.multi_set(pairs))
    }

    /// Shallow-merge JSON object values into existing ones
    pub fn multi_merge(&self, pairs: Vec<(String, String)>) -> Pending<()> {
        self.queue.call(move |engine| engine.multi_merge(pairs))
    }

    /// Remove keys; missing keys are ignored
    pub fn multi_remove(&self, keys: Vec<String>) -> Pending<()> {
        self.queue.call(move |engine| engine.multi_remove(&keys))
    }

    /// Remove everything
    pub fn clear(&self) -> Pending<()> {
        self.queue.call(|engine| engine.clear())
    }

    /// All stored keys, sorted
    pub fn get_all_keys(&self) -> Pending<Vec<String>> {
        self.queue.call(|engine| Ok(engine.all_keys()))
    }

    // =========================================================================
    // Single-key Conveniences
    // =========================================================================

    pub fn get(&self, key: impl Into<String>) -> Pending<Option<String>> {
        let key = key.into();
        self.queue.call(move |engine| engine.get(&key))
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Pending<()> {
        self.multi_set(vec![(key.into(), value.into())])
    }

    pub fn remove(&self, key: impl Into<String>) -> Pending<()> {
        self.multi_remove(vec![key.into()])
    }

    /// Run an arbitrary closure against the engine as one queued task
    pub fn with_engine<T, F>(&self, op: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut StorageEngine) -> Result<T> + Send + 'static,
    {
        self.queue.call(op)
    }

    /// Enqueue a raw task (used by the bridge to run callbacks on the worker)
    pub fn submit(&self, task: Task) {
        self.queue.submit(task)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop accepting operations
    ///
    /// Operations already queued still complete. With
    /// `clear_on_invalidate` set, all data is removed after them. Blocks
    /// until the worker has finished, also when several threads invalidate
    /// at once; called from inside a queued task it returns immediately.
    pub fn invalidate(&self) {
        let clear: Option<Task> = if self.config.clear_on_invalidate {
            Some(Box::new(|engine| {
                let result = engine.and_then(|engine| engine.clear());
                if let Err(e) = result {
                    tracing::error!("Failed to clear store on invalidate: {}", e);
                }
            }))
        } else {
            None
        };

        self.queue.invalidate(clear);
        tracing::info!("Store at {} invalidated", self.config.storage_dir.display());
    }

    pub fn is_valid(&self) -> bool {
        self.queue.is_valid()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.queue.lifecycle()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tasks enqueued but not yet finished
    pub fn pending_tasks(&self) -> usize {
        self.queue.pending_tasks()
    }
}
