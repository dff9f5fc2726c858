//! Raw File Storage.
//!
//! File operations used by the config-store backend.
//!
//! # Security
//! - Files are written atomically (write-sync-rename).
//! - Files are created owner-only (0600) on Unix.

use super::StorageError;

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound for anything this crate reads back.
const MAX_FILE_LEN: u64 = 64 * 1024;

/// Distinguishes temp files of concurrent writers within one process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Writes data to a file atomically.
pub fn write_atomic<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<(), StorageError> {
    let path = path.as_ref();
    let filename = path.file_name().ok_or(StorageError::InvalidPath)?;

    let mut temp_path = path.to_path_buf();
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    temp_path.set_file_name(format!(
        "{}.{}.{}.tmp",
        filename.to_string_lossy(),
        std::process::id(),
        seq
    ));

    let mut file = create_private(&temp_path)?;
    let written = file.write_all(data).and_then(|_| file.sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    // Atomic on POSIX
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(())
}

#[cfg(unix)]
fn create_private(path: &Path) -> Result<File, StorageError> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> Result<File, StorageError> {
    Ok(OpenOptions::new().write(true).create(true).truncate(true).open(path)?)
}

/// Reads data from a file.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, StorageError> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    if len > MAX_FILE_LEN {
        return Err(StorageError::Corruption);
    }

    let mut buffer = Vec::with_capacity(len as usize);
    file.read_to_end(&mut buffer)?;

    Ok(buffer)
}

/// Checks if a file exists.
pub fn exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists()
}

/// Deletes a file.
pub fn delete<P: AsRef<Path>>(path: P) -> Result<(), StorageError> {
    if path.as_ref().exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
