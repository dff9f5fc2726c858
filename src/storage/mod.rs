//! Storage Module.
//!
//! Persistence of the encrypted PoD seed, including:
//! - Backends for the config store and the `rdkbEncryptedClientSeed` mirror.
//! - Atomic file helpers.
//! - The persistence worker that takes writes off the caller's thread.

pub mod backend;
pub mod raw_files;
pub mod worker;

use core::fmt;

use crate::seed::cipher::EncryptedSeed;

/// Errors related to storage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// File not found.
    NotFound,
    /// Permission denied.
    PermissionDenied,
    /// IO error (generic).
    IoError,
    /// Stored record is corrupt or unreadable.
    Corruption,
    /// Invalid path or filename.
    InvalidPath,
    /// The persistence queue is full.
    QueueFull,
    /// The persistence worker has stopped.
    WorkerGone,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound => write!(f, "File not found"),
            StorageError::PermissionDenied => write!(f, "Permission denied"),
            StorageError::IoError => write!(f, "I/O error"),
            StorageError::Corruption => write!(f, "Stored seed record is corrupt"),
            StorageError::InvalidPath => write!(f, "Invalid storage path"),
            StorageError::QueueFull => write!(f, "Persistence queue full"),
            StorageError::WorkerGone => write!(f, "Persistence worker stopped"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound,
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied,
            _ => StorageError::IoError,
        }
    }
}

/// A place the encrypted seed is persisted to.
///
/// Backends are moved onto the persistence worker, so they must be `Send`.
pub trait SeedBackend: Send {
    /// Short identifier used in log lines.
    fn name(&self) -> &'static str;

    /// Loads the persisted record, `Ok(None)` if nothing was provisioned yet.
    fn load(&self) -> Result<Option<EncryptedSeed>, StorageError>;

    /// Replaces the persisted record.
    fn store(&mut self, record: &EncryptedSeed) -> Result<(), StorageError>;
}
