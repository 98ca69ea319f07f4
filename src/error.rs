//! Error types for StashKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StashError
pub type Result<T> = std::result::Result<T, StashError>;

/// Unified error type for StashKV operations
#[derive(Debug, Error)]
pub enum StashError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    /// A key or value was missing, empty, or not a string
    #[error("Invalid type: {message}")]
    InvalidType {
        message: String,
        key: Option<String>,
    },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Corrupt manifest: {0}")]
    CorruptManifest(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Store has been invalidated")]
    Invalidated,

    /// The worker dropped a task without producing a result
    #[error("Task aborted before completion")]
    TaskAborted,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StashError {
    /// Build an `InvalidType` error, optionally naming the offending key
    pub fn invalid_type(message: impl Into<String>, key: Option<&str>) -> Self {
        StashError::InvalidType {
            message: message.into(),
            key: key.map(str::to_owned),
        }
    }

    /// The key this error refers to, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            StashError::InvalidType { key, .. } => key.as_deref(),
            StashError::NotFound(key) => Some(key),
            _ => None,
        }
    }
}
