//! Serial Execution Queue
//!
//! Every storage operation runs as one task on a single worker thread.
//!
//! ## Responsibilities
//! - Own the `StorageEngine` exclusively (no lock around the manifest)
//! - Run tasks strictly in submission order, each to completion
//! - Reject new work once invalidated, drain what was already queued
//!
//! ## Lifecycle
//! ```text
//!   Valid ──invalidate()──▶ Invalidated
//!     │                        │
//!     │ submit → enqueued      │ submit → task runs inline with Err(Invalidated)
//!     │                        │ backlog drained, worker joined
//! ```

mod pending;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::engine::StorageEngine;
use crate::error::{Result, StashError};

pub use pending::Pending;

/// A unit of work for the worker
///
/// Receives the engine, or `Err(Invalidated)` if the queue refused the task.
/// Either way the task is called exactly once.
pub type Task = Box<dyn FnOnce(Result<&mut StorageEngine>) + Send + 'static>;

/// Lifecycle of a queue (and of the store that owns it)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Accepting new operations
    Valid,

    /// Rejecting new operations; one-way
    Invalidated,
}

/// Single-worker FIFO queue in front of a `StorageEngine`
pub struct SerialQueue {
    /// Submission side; `None` once invalidated
    sender: Mutex<Option<Sender<Task>>>,

    /// Worker thread, taken when joined
    worker: Mutex<Option<JoinHandle<()>>>,

    /// Id of the worker thread, for invalidation from inside a task
    worker_id: ThreadId,

    /// Shared counters and lifecycle flag
    state: Arc<QueueState>,
}

struct QueueState {
    valid: AtomicBool,
    pending: AtomicUsize,
    completed: AtomicU64,
}

impl SerialQueue {
    /// Move `engine` onto a new worker thread and start accepting tasks
    pub fn start(engine: StorageEngine) -> Result<Self> {
        let (sender, receiver) = channel::unbounded();
        let state = Arc::new(QueueState {
            valid: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
        });

        let worker_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name("stashkv-queue".into())
            .spawn(move || {
                tracing::debug!("Queue worker started");
                worker_main(engine, receiver, worker_state);
                tracing::debug!("Queue worker exiting");
            })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
            state,
        })
    }

    /// Enqueue a task
    ///
    /// Never blocks on the worker. If the queue has been invalidated the
    /// task is called right away, on this thread, with `Err(Invalidated)`.
    pub fn submit(&self, task: Task) {
        let rejected = {
            let guard = self.sender.lock();
            match guard.as_ref() {
                Some(sender) => {
                    self.state.pending.fetch_add(1, Ordering::AcqRel);
                    match sender.send(task) {
                        Ok(()) => None,
                        Err(channel::SendError(task)) => {
                            self.state.pending.fetch_sub(1, Ordering::AcqRel);
                            Some(task)
                        }
                    }
                }
                None => Some(task),
            }
        };

        // Run outside the lock so the task may submit again
        if let Some(task) = rejected {
            tracing::trace!("Rejecting task submitted after invalidation");
            task(Err(StashError::Invalidated));
        }
    }

    /// Enqueue `op` and return a handle to its result
    pub fn call<T, F>(&self, op: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut StorageEngine) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = channel::bounded(1);
        self.submit(Box::new(move |engine| {
            // Receiver may have been dropped; nobody is waiting then
            let _ = tx.send(engine.and_then(op));
        }));
        Pending::new(rx)
    }

    /// Stop accepting tasks, drain the backlog, and join the worker
    ///
    /// If `then_run` is given it is queued behind the backlog as the final
    /// task; only the first call's `then_run` is used. Every caller returns
    /// after the worker has finished, except a call made from inside a task,
    /// which returns at once and lets the worker wind down by itself.
    pub fn invalidate(&self, then_run: Option<Task>) {
        let sender = {
            let mut guard = self.sender.lock();
            self.state.valid.store(false, Ordering::SeqCst);
            guard.take()
        };

        if let Some(sender) = sender {
            if let Some(task) = then_run {
                self.state.pending.fetch_add(1, Ordering::AcqRel);
                if sender.send(task).is_err() {
                    self.state.pending.fetch_sub(1, Ordering::AcqRel);
                }
            }
            // Dropping the last sender lets the worker exit once drained
            drop(sender);
        }

        if thread::current().id() == self.worker_id {
            return;
        }

        // Held across the join so concurrent callers wait for it too
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                tracing::error!("Queue worker terminated abnormally");
            }
            tracing::debug!(
                "Queue invalidated after {} completed tasks",
                self.completed_tasks()
            );
        }
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> LifecycleState {
        if self.state.valid.load(Ordering::SeqCst) {
            LifecycleState::Valid
        } else {
            LifecycleState::Invalidated
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lifecycle() == LifecycleState::Valid
    }

    /// Tasks enqueued but not yet finished
    pub fn pending_tasks(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Tasks finished since start
    pub fn completed_tasks(&self) -> u64 {
        self.state.completed.load(Ordering::Relaxed)
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.invalidate(None);
    }
}

fn worker_main(mut engine: StorageEngine, receiver: Receiver<Task>, state: Arc<QueueState>) {
    // recv keeps yielding queued tasks after the senders are gone
    while let Ok(task) = receiver.recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(Ok(&mut engine))));

        state.pending.fetch_sub(1, Ordering::AcqRel);
        state.completed.fetch_add(1, Ordering::Relaxed);

        if outcome.is_err() {
            tracing::error!("Storage task panicked; continuing with next task");
        }
    }
}
