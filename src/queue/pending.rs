//! Pending results
//!
//! Handle returned for every queued operation.

use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{Result, StashError};

/// The eventual result of a queued operation
///
/// Dropping it does not cancel the operation.
#[must_use = "the operation runs regardless; drop the handle only if the result does not matter"]
pub struct Pending<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> Pending<T> {
    pub(crate) fn new(receiver: Receiver<Result<T>>) -> Self {
        Self { receiver }
    }

    /// Block until the operation has run
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().unwrap_or(Err(StashError::TaskAborted))
    }

    /// Block for at most `timeout`; `None` if the operation has not run yet
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(StashError::TaskAborted)),
        }
    }

    /// Take the result if the operation has already run
    pub fn try_take(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(StashError::TaskAborted)),
        }
    }
}
