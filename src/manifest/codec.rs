//! Manifest codec
//!
//! Encoding and decoding of the manifest blob. See the module docs in
//! `manifest/mod.rs` for the layout.

use crate::error::{Result, StashError};

use super::{Manifest, HEADER_SIZE, MAGIC, VERSION};

/// Encode a manifest to bytes
///
/// Format: magic (4) + version (2) + payload_len (4) + crc (4) + payload
pub fn encode(manifest: &Manifest) -> Result<Vec<u8>> {
    let payload = bincode::serialize(manifest)
        .map_err(|e| StashError::Serialization(format!("manifest encode failed: {}", e)))?;

    let payload_len = u32::try_from(payload.len()).map_err(|_| {
        StashError::Serialization(format!(
            "manifest payload too large: {} bytes",
            payload.len()
        ))
    })?;
    let crc = crc32fast::hash(&payload);

    let mut blob = Vec::with_capacity(HEADER_SIZE + payload.len());
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(&VERSION.to_le_bytes());
    blob.extend_from_slice(&payload_len.to_le_bytes());
    blob.extend_from_slice(&crc.to_le_bytes());
    blob.extend_from_slice(&payload);

    Ok(blob)
}

/// Decode a manifest from bytes
///
/// Any structural problem is reported as `CorruptManifest`.
pub fn decode(bytes: &[u8]) -> Result<Manifest> {
    if bytes.len() < HEADER_SIZE {
        return Err(StashError::CorruptManifest(format!(
            "incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    if &bytes[0..4] != MAGIC {
        return Err(StashError::CorruptManifest(format!(
            "invalid magic: expected STKM, got {:?}",
            &bytes[0..4]
        )));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(StashError::CorruptManifest(format!(
            "unsupported version: {}",
            version
        )));
    }

    let payload_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let stored_crc = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != payload_len {
        return Err(StashError::CorruptManifest(format!(
            "payload length mismatch: header says {}, found {}",
            payload_len,
            payload.len()
        )));
    }

    let computed_crc = crc32fast::hash(payload);
    if computed_crc != stored_crc {
        return Err(StashError::CorruptManifest(format!(
            "checksum mismatch: stored {:08x}, computed {:08x}",
            stored_crc, computed_crc
        )));
    }

    bincode::deserialize(payload)
        .map_err(|e| StashError::CorruptManifest(format!("payload decode failed: {}", e)))
}
