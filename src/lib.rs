//! # StashKV
//!
//! A persistent, asynchronous, string-keyed key-value store with:
//! - Small values kept inline in a single checksummed manifest
//! - Large values spilled to one file per key
//! - A serial execution queue that makes every batch appear atomic
//! - Rollback of in-memory state when a write cannot be persisted
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Host / Bridge Adapter                        │
//! │          (loosely typed calls, callbacks)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Store + Serial Queue                        │
//! │         (one worker thread, FIFO, one task per batch)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Storage Engine                            │
//! │          (in-memory manifest, placement, undo)               │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌─────────────────┐            ┌─────────────────┐
//!   │    Manifest     │            │   Value Files   │
//!   │ (inline values) │            │ (large values)  │
//!   └─────────────────┘            └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod manifest;
pub mod storage;
pub mod engine;
pub mod queue;
pub mod store;
pub mod bridge;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StashError, Result};
pub use config::{Config, SyncStrategy, DEFAULT_INLINE_THRESHOLD};
pub use engine::StorageEngine;
pub use queue::{LifecycleState, Pending};
pub use store::Store;
pub use bridge::{Bridge, BridgeError};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StashKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
