//! Storage Module
//!
//! Large values live outside the manifest, one file per key.
//!
//! ## Responsibilities
//! - Map keys to bounded-length file names (deterministic, injective)
//! - Write value files atomically (stage, then rename into place)
//! - Enumerate committed and staged files for crash recovery
//!
//! ## Directory Layout
//! ```text
//! values/
//!   ├── 68656c6c6f.val            key "hello"
//!   ├── 776f726c64.val.pending    key "world", staged, awaiting commit
//!   └── h<64 hex chars>.val       key longer than 64 bytes, SHA-256 named
//! ```

mod naming;
mod value_store;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

pub use naming::{file_name, file_stem, key_from_stem, parse_file_name, FileState, MAX_HEX_STEM_LEN};
pub use value_store::{ValueFile, ValueFileStore};

/// Create/truncate `path` and write `bytes`, optionally fsyncing the file
pub(crate) fn write_file(path: &Path, bytes: &[u8], sync: bool) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    file.write_all(bytes)?;
    file.flush()?;

    if sync {
        file.sync_all()?;
    }

    Ok(())
}

/// Write `bytes` to `tmp`, then atomically rename it over `path`
///
/// Readers of `path` see either the old contents or the new ones.
pub(crate) fn replace_file(tmp: &Path, path: &Path, bytes: &[u8], sync: bool) -> io::Result<()> {
    write_file(tmp, bytes, sync)?;

    if let Err(e) = fs::rename(tmp, path) {
        let _ = fs::remove_file(tmp);
        return Err(e);
    }

    if sync {
        if let Some(parent) = path.parent() {
            sync_dir(parent)?;
        }
    }

    Ok(())
}

/// fsync a directory so renames and unlinks inside it are durable
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
