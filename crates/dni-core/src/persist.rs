//! Shared atomic-write helper for durable state (§4.6, §6, SPEC_FULL §B.4).
//!
//! Every persisted file (identity, contact book, message queue) is written
//! the same way: serialize, write to a sibling temp file, `fsync`, then
//! rename over the destination. Rename is atomic on the same filesystem,
//! so a crash mid-write never leaves a half-written file in place of a
//! good one.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Atomically replace the contents of `path` with `data`.
///
/// # Errors
///
/// Returns the underlying `io::Error` if creating the temp file, writing,
/// syncing, or renaming fails.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(data)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn atomic_write_replaces_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn no_leftover_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        atomic_write(&path, b"data").unwrap();
        assert!(!path.with_extension("tmp").exists());
    }
}
