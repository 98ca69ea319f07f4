//! Manifest Module
//!
//! The manifest maps every stored key to either its value (small values) or
//! a placeholder saying the value lives in a value file.
//!
//! ## Responsibilities
//! - Define the in-memory manifest representation
//! - Serialize/deserialize it to a single checksummed blob
//!
//! The codec is a pure transform. Reading and writing the blob is the
//! engine's job.
//!
//! ## Blob Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                            │
//! │   Magic: "STKM" (4) | Version: u16 (2) | PayloadLen: u32 (4) │
//! │   PayloadCRC: u32 (4)                                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (PayloadLen bytes)                                   │
//! │   bincode(BTreeMap<String, ManifestEntry>)                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod codec;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use codec::{decode, encode};

/// Magic bytes identifying a StashKV manifest blob
pub const MAGIC: &[u8; 4] = b"STKM";

/// Current manifest format version
pub const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + PayloadLen (4) + CRC (4) = 14 bytes
pub const HEADER_SIZE: usize = 14;

/// Where a key's value lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestEntry {
    /// Value stored directly in the manifest
    Inline(String),

    /// Value stored in the key's value file; size and CRC32 of its bytes
    /// identify which file contents belong to this manifest
    External { size: u64, checksum: u32 },
}

impl ManifestEntry {
    /// Placeholder for `value` once it has been written to a value file
    pub fn external_for(value: &[u8]) -> Self {
        ManifestEntry::External {
            size: value.len() as u64,
            checksum: crc32fast::hash(value),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ManifestEntry::External { .. })
    }

    /// Whether `bytes` are the contents this placeholder refers to
    pub fn matches_file(&self, bytes: &[u8]) -> bool {
        match self {
            ManifestEntry::External { size, checksum } => {
                *size == bytes.len() as u64 && *checksum == crc32fast::hash(bytes)
            }
            ManifestEntry::Inline(_) => false,
        }
    }
}

/// In-memory manifest, sorted by key so encoding is deterministic
pub type Manifest = BTreeMap<String, ManifestEntry>;
