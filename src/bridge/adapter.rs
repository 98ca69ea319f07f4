//! Bridge adapter
//!
//! Translates host calls into store tasks and marshals results back.

use serde::Serialize;
use serde_json::Value;

use crate::engine::StorageEngine;
use crate::error::{Result, StashError};
use crate::store::Store;

use super::convert::{keys_from_value, pairs_from_value};

/// Error as seen by the host: a message and, when known, the key at fault
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeError {
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl BridgeError {
    /// JSON form handed to the host
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.message.clone()))
    }
}

impl From<&StashError> for BridgeError {
    fn from(error: &StashError) -> Self {
        let message = match error {
            StashError::InvalidType { message, .. } => message.clone(),
            other => other.to_string(),
        };

        Self {
            message,
            key: error.key().map(str::to_owned),
        }
    }
}

impl From<StashError> for BridgeError {
    fn from(error: StashError) -> Self {
        BridgeError::from(&error)
    }
}

/// Host-facing adapter over a `Store`
///
/// Every callback is invoked exactly once: on the worker thread after the
/// task ran, or on the calling thread if the arguments were invalid or the
/// store was already invalidated.
pub struct Bridge {
    store: Store,
}

impl Bridge {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn multi_get<F>(&self, keys: &Value, callback: F)
    where
        F: FnOnce(std::result::Result<Vec<(String, Option<String>)>, BridgeError>) + Send + 'static,
    {
        match keys_from_value(keys) {
            Ok(keys) => self.dispatch(move |engine| engine.multi_get(&keys), callback),
            Err(e) => callback(Err(e.into())),
        }
    }

    pub fn multi_set<F>(&self, pairs: &Value, callback: F)
    where
        F: FnOnce(Option<BridgeError>) + Send + 'static,
    {
        match pairs_from_value(pairs) {
            Ok(pairs) => self.dispatch(move |engine| engine.multi_set(pairs), error_slot(callback)),
            Err(e) => callback(Some(e.into())),
        }
    }

    pub fn multi_merge<F>(&self, pairs: &Value, callback: F)
    where
        F: FnOnce(Option<BridgeError>) + Send + 'static,
    {
        match pairs_from_value(pairs) {
            Ok(pairs) => {
                self.dispatch(move |engine| engine.multi_merge(pairs), error_slot(callback))
            }
            Err(e) => callback(Some(e.into())),
        }
    }

    pub fn multi_remove<F>(&self, keys: &Value, callback: F)
    where
        F: FnOnce(Option<BridgeError>) + Send + 'static,
    {
        match keys_from_value(keys) {
            Ok(keys) => {
                self.dispatch(move |engine| engine.multi_remove(&keys), error_slot(callback))
            }
            Err(e) => callback(Some(e.into())),
        }
    }

    pub fn clear<F>(&self, callback: F)
    where
        F: FnOnce(Option<BridgeError>) + Send + 'static,
    {
        self.dispatch(|engine| engine.clear(), error_slot(callback));
    }

    pub fn get_all_keys<F>(&self, callback: F)
    where
        F: FnOnce(std::result::Result<Vec<String>, BridgeError>) + Send + 'static,
    {
        self.dispatch(|engine| Ok(engine.all_keys()), callback);
    }

    /// Host teardown hook
    pub fn invalidate(&self) {
        self.store.invalidate();
    }

    pub fn is_valid(&self) -> bool {
        self.store.is_valid()
    }

    /// Get the underlying store
    pub fn store(&self) -> &Store {
        &self.store
    }

    fn dispatch<T, Op, F>(&self, op: Op, callback: F)
    where
        T: 'static,
        Op: FnOnce(&mut StorageEngine) -> Result<T> + Send + 'static,
        F: FnOnce(std::result::Result<T, BridgeError>) + Send + 'static,
    {
        self.store.submit(Box::new(move |engine| {
            let result = engine.and_then(op).map_err(BridgeError::from);
            callback(result);
        }));
    }
}

/// Adapt an error-slot callback to a `Result<(), _>` callback
fn error_slot<F>(callback: F) -> impl FnOnce(std::result::Result<(), BridgeError>) + Send + 'static
where
    F: FnOnce(Option<BridgeError>) + Send + 'static,
{
    move |result| callback(result.err())
}
