//! Bridge Module
//!
//! Adapter between a scripting host and the store.
//!
//! ## Responsibilities
//! - Accept loosely typed arguments (`serde_json::Value`) and convert them
//!   to strict string types before anything is queued
//! - Deliver results through a callback, exactly once, from the worker
//! - Report failures as a serializable `BridgeError`, never a panic
//!
//! ## Callback Shapes
//! ```text
//! multi_get     (keys)  → cb(Ok([(key, value|null)]) | Err(e))
//! multi_set     (pairs) → cb(None | Some(e))
//! multi_merge   (pairs) → cb(None | Some(e))
//! multi_remove  (keys)  → cb(None | Some(e))
//! clear         ()      → cb(None | Some(e))
//! get_all_keys  ()      → cb(Ok([key]) | Err(e))
//! ```

mod adapter;
mod convert;

pub use adapter::{Bridge, BridgeError};
pub use convert::{keys_from_value, pairs_from_value, pairs_to_value};
