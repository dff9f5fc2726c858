//! Seed Backends.
//!
//! - `MemoryBackend`: volatile, for devices without a config store and for tests.
//! - `FileBackend`: the config store, one hex-encoded record per file.
//! - `MirroredBackend`: config store plus the `rdkbEncryptedClientSeed`
//!   mirror, written together so both always carry the same record.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{raw_files, SeedBackend, StorageError};
use crate::seed::cipher::EncryptedSeed;

/// Volatile backend.
///
/// Clones share the same slot, so a host can keep a handle after the
/// backend has been moved onto the persistence worker.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    slot: Arc<Mutex<Option<EncryptedSeed>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds `record`.
    pub fn with_record(record: EncryptedSeed) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(record))),
        }
    }

    /// Returns the currently persisted record.
    pub fn snapshot(&self) -> Option<EncryptedSeed> {
        match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SeedBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self) -> Result<Option<EncryptedSeed>, StorageError> {
        Ok(self.snapshot())
    }

    fn store(&mut self, record: &EncryptedSeed) -> Result<(), StorageError> {
        let mut slot = self.slot.lock().map_err(|_| StorageError::IoError)?;
        *slot = Some(record.clone());
        Ok(())
    }
}

/// Config-store backend holding the hex-encoded record in a single file.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
    name: &'static str,
}

impl FileBackend {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            name: "config-file",
        }
    }

    /// Same as [`FileBackend::new`] with a custom log name.
    pub fn named<P: Into<PathBuf>>(path: P, name: &'static str) -> Self {
        Self {
            path: path.into(),
            name,
        }
    }

    /// File the record is written to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SeedBackend for FileBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load(&self) -> Result<Option<EncryptedSeed>, StorageError> {
        if !raw_files::exists(&self.path) {
            return Ok(None);
        }
        let data = raw_files::read_file(&self.path)?;
        let text = core::str::from_utf8(&data).map_err(|_| StorageError::Corruption)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        EncryptedSeed::from_hex(text)
            .map(Some)
            .map_err(|_| StorageError::Corruption)
    }

    fn store(&mut self, record: &EncryptedSeed) -> Result<(), StorageError> {
        let mut line = record.to_hex();
        line.push('\n');
        raw_files::write_atomic(&self.path, line.as_bytes())
    }
}

/// Keeps a primary store and a mirror in sync.
pub struct MirroredBackend<P, M> {
    primary: P,
    mirror: M,
}

impl<P: SeedBackend, M: SeedBackend> MirroredBackend<P, M> {
    pub fn new(primary: P, mirror: M) -> Self {
        Self { primary, mirror }
    }
}

impl<P: SeedBackend, M: SeedBackend> SeedBackend for MirroredBackend<P, M> {
    fn name(&self) -> &'static str {
        "mirrored"
    }

    /// Loads from the primary, falling back to the mirror when the primary
    /// is empty or unreadable.
    fn load(&self) -> Result<Option<EncryptedSeed>, StorageError> {
        let primary = self.primary.load();
        match primary {
            Ok(Some(record)) => {
                match self.mirror.load() {
                    Ok(Some(ref mirrored)) if *mirrored == record => {}
                    Ok(_) | Err(_) => {
                        log::warn!(
                            "Seed mirror '{}' diverges from '{}'; using '{}'",
                            self.mirror.name(),
                            self.primary.name(),
                            self.primary.name()
                        );
                    }
                }
                Ok(Some(record))
            }
            Ok(None) => self.mirror.load(),
            Err(e) => {
                log::warn!("Seed store '{}' unreadable ({}); trying mirror '{}'", self.primary.name(), e, self.mirror.name());
                match self.mirror.load() {
                    Ok(Some(record)) => Ok(Some(record)),
                    _ => Err(e),
                }
            }
        }
    }

    fn store(&mut self, record: &EncryptedSeed) -> Result<(), StorageError> {
        self.primary.store(record)?;
        if let Err(e) = self.mirror.store(record) {
            log::error!("Seed mirror '{}' not updated: {}", self.mirror.name(), e);
            return Err(e);
        }
        Ok(())
    }
}
