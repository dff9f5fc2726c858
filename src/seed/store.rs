//! Shared PoD Seed State.
//!
//! `SeedStore` is the single owner of the device's seed. It keeps the current
//! record encrypted in memory and swaps it as a whole, so concurrent readers
//! see either the old or the new seed, never a mix. Decryption happens on
//! demand in the reader's thread, outside the lock.
//!
//! Persistence is delegated to a [`PersistWorker`]; `store` returns once the
//! write is queued.

use std::sync::{Arc, RwLock};

use super::cipher::{EncryptedSeed, SeedCipher};
use super::{PodSeed, SeedError};
use crate::storage::worker::{PersistWorker, WorkerStats};
use crate::storage::{SeedBackend, StorageError};

/// Provisioning time recorded for a seed set while the clock was untrusted.
///
/// Such a seed is anchored with [`SeedStore::anchor`] at the first trusted
/// clock reading; its lifetime counts from there.
pub const UNANCHORED: u64 = 0;

struct Current {
    record: EncryptedSeed,
    generation: u64,
}

/// Decrypted snapshot of the current seed.
#[derive(Debug)]
pub struct ProvisionedSeed {
    pub seed: PodSeed,
    /// Unix time the seed was provisioned.
    pub provisioned_at: u64,
    /// Increments on every successful `store`; identifies this seed instance.
    pub generation: u64,
}

pub struct SeedStore {
    cipher: SeedCipher,
    current: RwLock<Option<Arc<Current>>>,
    worker: PersistWorker,
}

impl SeedStore {
    /// Loads any persisted seed from `backend` and starts the persistence worker.
    ///
    /// An unreadable backend does not fail the open: the device still boots,
    /// unprovisioned, and the condition is logged.
    pub fn open(cipher: SeedCipher, backend: Box<dyn SeedBackend>, queue_depth: usize) -> Result<Self, SeedError> {
        let initial = match backend.load() {
            Ok(Some(record)) => {
                log::info!("Loaded encrypted PoD seed from '{}'", backend.name());
                Some(Arc::new(Current { record, generation: 1 }))
            }
            Ok(None) => {
                log::info!("No PoD seed provisioned in '{}'", backend.name());
                None
            }
            Err(e) => {
                log::error!("Failed to load PoD seed from '{}': {}", backend.name(), e);
                None
            }
        };

        let worker = PersistWorker::spawn(backend, queue_depth)?;

        Ok(Self {
            cipher,
            current: RwLock::new(initial),
            worker,
        })
    }

    /// Replaces the seed and queues it for persistence.
    ///
    /// Never waits for I/O. If the write cannot be queued the in-memory seed
    /// is left unchanged and the error returned.
    pub fn store(&self, seed: &PodSeed, now: u64) -> Result<u64, SeedError> {
        let record = self.cipher.seal(seed, now)?;

        let mut current = self.current.write().map_err(|_| SeedError::Storage(StorageError::IoError))?;
        self.worker.submit(record.clone())?;

        let generation = current.as_ref().map_or(1, |c| c.generation + 1);
        *current = Some(Arc::new(Current { record, generation }));
        Ok(generation)
    }

    /// Sets the provisioning time of an unanchored seed to `now`.
    ///
    /// Acts only while `current` is still the active seed and is unanchored,
    /// and returns whether the record was replaced. The generation is kept.
    pub fn anchor(&self, current: &ProvisionedSeed, now: u64) -> Result<bool, SeedError> {
        if current.provisioned_at != UNANCHORED {
            return Ok(false);
        }
        let record = self.cipher.seal(&current.seed, now)?;

        let mut active = self.current.write().map_err(|_| SeedError::Storage(StorageError::IoError))?;
        match active.as_ref() {
            Some(c) if c.generation == current.generation && c.record.provisioned_at == UNANCHORED => {}
            _ => return Ok(false),
        }
        self.worker.submit(record.clone())?;

        *active = Some(Arc::new(Current {
            record,
            generation: current.generation,
        }));
        Ok(true)
    }

    /// Returns the current encrypted record.
    pub fn load(&self) -> Option<EncryptedSeed> {
        self.snapshot().map(|c| c.record.clone())
    }

    /// Decrypts the current seed.
    ///
    /// # Errors
    /// * `SeedError::NotProvisioned` if no seed was ever set.
    /// * `SeedError::DecryptionFailed` if the record fails authentication.
    pub fn decrypt(&self) -> Result<ProvisionedSeed, SeedError> {
        let current = self.snapshot().ok_or(SeedError::NotProvisioned)?;
        let seed = self.cipher.open(&current.record)?;
        Ok(ProvisionedSeed {
            seed,
            provisioned_at: current.record.provisioned_at,
            generation: current.generation,
        })
    }

    pub fn is_provisioned(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Waits until all queued writes have reached the backend.
    pub fn flush(&self) -> Result<(), SeedError> {
        Ok(self.worker.flush()?)
    }

    pub fn worker_stats(&self) -> &WorkerStats {
        self.worker.stats()
    }

    fn snapshot(&self) -> Option<Arc<Current>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::cipher::DeviceKey;
    use crate::storage::backend::{FileBackend, MemoryBackend};
    use crate::types::SEED_LEN;

    fn cipher() -> SeedCipher {
        SeedCipher::new(&DeviceKey::from_bytes([0x42; 32]))
    }

    #[test]
    fn test_store_and_decrypt() {
        let backend = MemoryBackend::new();
        let store = SeedStore::open(cipher(), Box::new(backend.clone()), 4).unwrap();
        assert!(!store.is_provisioned());
        assert_eq!(store.decrypt().unwrap_err(), SeedError::NotProvisioned);

        let seed = PodSeed::new([0x11; SEED_LEN]);
        assert_eq!(store.store(&seed, 1_700_000_000).unwrap(), 1);

        let current = store.decrypt().unwrap();
        assert_eq!(current.seed, seed);
        assert_eq!(current.provisioned_at, 1_700_000_000);

        store.flush().unwrap();
        assert_eq!(backend.snapshot(), store.load());
    }

    #[test]
    fn test_generation_advances() {
        let store = SeedStore::open(cipher(), Box::new(MemoryBackend::new()), 4).unwrap();
        assert_eq!(store.store(&PodSeed::new([1; SEED_LEN]), 10).unwrap(), 1);
        assert_eq!(store.store(&PodSeed::new([2; SEED_LEN]), 20).unwrap(), 2);
        assert_eq!(store.decrypt().unwrap().generation, 2);
    }

    #[test]
    fn test_anchor_unanchored_seed() {
        let backend = MemoryBackend::new();
        let store = SeedStore::open(cipher(), Box::new(backend.clone()), 4).unwrap();
        let seed = PodSeed::new([0x21; SEED_LEN]);
        store.store(&seed, UNANCHORED).unwrap();

        let current = store.decrypt().unwrap();
        assert_eq!(current.provisioned_at, UNANCHORED);
        assert!(store.anchor(&current, 1_700_000_500).unwrap());

        let anchored = store.decrypt().unwrap();
        assert_eq!(anchored.seed, seed);
        assert_eq!(anchored.provisioned_at, 1_700_000_500);
        assert_eq!(anchored.generation, current.generation);
        assert!(!store.anchor(&anchored, 1_700_009_999).unwrap());

        store.flush().unwrap();
        assert_eq!(backend.snapshot().unwrap().provisioned_at, 1_700_000_500);
    }

    #[test]
    fn test_anchor_ignores_replaced_seed() {
        let store = SeedStore::open(cipher(), Box::new(MemoryBackend::new()), 4).unwrap();
        store.store(&PodSeed::new([1; SEED_LEN]), UNANCHORED).unwrap();
        let stale = store.decrypt().unwrap();
        store.store(&PodSeed::new([2; SEED_LEN]), UNANCHORED).unwrap();

        assert!(!store.anchor(&stale, 77).unwrap());
        let current = store.decrypt().unwrap();
        assert_eq!(current.seed, PodSeed::new([2; SEED_LEN]));
        assert_eq!(current.provisioned_at, UNANCHORED);
    }

    #[test]
    fn test_reload_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pod_seed.enc");
        let seed = PodSeed::new([0x77; SEED_LEN]);

        {
            let store = SeedStore::open(cipher(), Box::new(FileBackend::new(&path)), 4).unwrap();
            store.store(&seed, 1_234).unwrap();
        }

        let store = SeedStore::open(cipher(), Box::new(FileBackend::new(&path)), 4).unwrap();
        let current = store.decrypt().unwrap();
        assert_eq!(current.seed, seed);
        assert_eq!(current.provisioned_at, 1_234);
    }

    #[test]
    fn test_foreign_key_cannot_decrypt() {
        let record = cipher().seal(&PodSeed::new([3; SEED_LEN]), 1).unwrap();
        let other = SeedCipher::new(&DeviceKey::from_bytes([0x43; 32]));
        let store = SeedStore::open(other, Box::new(MemoryBackend::with_record(record)), 4).unwrap();

        assert!(store.is_provisioned());
        assert_eq!(store.decrypt().unwrap_err(), SeedError::DecryptionFailed);
    }

    #[test]
    fn test_corrupt_backend_opens_unprovisioned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pod_seed.enc");
        std::fs::write(&path, "corrupt").unwrap();

        let store = SeedStore::open(cipher(), Box::new(FileBackend::new(&path)), 4).unwrap();
        assert!(!store.is_provisioned());
    }
}
