//! Value file naming
//!
//! Short keys are named by the lowercase hex encoding of their UTF-8 bytes,
//! so the key can be read straight off the file name. Keys whose hex form
//! would exceed `MAX_HEX_STEM_LEN` are named `h` + hex(SHA-256(key)) instead,
//! which keeps every name the same bounded length no matter how long the key
//! is. The `h` prefix is not a hex digit, so the two forms never collide.
//!
//! Either way the name only contains `[0-9a-fh.]` plus the suffix: no
//! separators, no `..`, nothing a filesystem reserves.

use sha2::{Digest, Sha256};

/// Longest stem that is plain hex (keys up to 64 bytes)
pub const MAX_HEX_STEM_LEN: usize = 128;

/// Prefix of digest-named stems
const DIGEST_PREFIX: char = 'h';

/// Suffix of a committed value file
pub(crate) const COMMITTED_SUFFIX: &str = ".val";

/// Suffix of a staged value file
pub(crate) const PENDING_SUFFIX: &str = ".val.pending";

/// Whether a value file is live or staged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Referenced by the committed manifest
    Committed,

    /// Written but not yet renamed into place
    Pending,
}

impl FileState {
    pub(crate) fn suffix(self) -> &'static str {
        match self {
            FileState::Committed => COMMITTED_SUFFIX,
            FileState::Pending => PENDING_SUFFIX,
        }
    }
}

/// Stem (name without suffix) of `key`'s value file
///
/// "hello" → "68656c6c6f"
pub fn file_stem(key: &str) -> String {
    let encoded = hex::encode(key.as_bytes());
    if encoded.len() <= MAX_HEX_STEM_LEN {
        return encoded;
    }

    let digest = Sha256::digest(key.as_bytes());
    format!("{}{}", DIGEST_PREFIX, hex::encode(digest))
}

/// Full file name of `key`'s value file in the given state
pub fn file_name(key: &str, state: FileState) -> String {
    format!("{}{}", file_stem(key), state.suffix())
}

/// Split a file name into its stem and state
///
/// Returns `None` for anything `file_name` could not have produced.
pub fn parse_file_name(name: &str) -> Option<(String, FileState)> {
    let (stem, state) = if let Some(stem) = name.strip_suffix(PENDING_SUFFIX) {
        (stem, FileState::Pending)
    } else if let Some(stem) = name.strip_suffix(COMMITTED_SUFFIX) {
        (stem, FileState::Committed)
    } else {
        return None;
    };

    let is_lower_hex = |s: &str| s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));

    let valid = match stem.strip_prefix(DIGEST_PREFIX) {
        Some(digest) => digest.len() == 64 && is_lower_hex(digest),
        None => {
            !stem.is_empty()
                && stem.len() <= MAX_HEX_STEM_LEN
                && stem.len() % 2 == 0
                && is_lower_hex(stem)
        }
    };

    valid.then(|| (stem.to_string(), state))
}

/// Recover the key from a plain hex stem
///
/// Digest stems are one-way and yield `None`; the caller resolves them
/// against the keys it knows.
pub fn key_from_stem(stem: &str) -> Option<String> {
    if stem.starts_with(DIGEST_PREFIX) {
        return None;
    }
    let bytes = hex::decode(stem).ok()?;
    String::from_utf8(bytes).ok()
}
