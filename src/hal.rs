//! MSO Management HAL context.
//!
//! `MsoHal` bundles everything the three HAL operations share: the trusted
//! clock, the seed store and the validation policy. Hosts that link the
//! crate from Rust use it directly; the C entry points in `ffi` wrap one
//! process-wide instance.

use core::fmt;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::clock::{Clock, ClockError, SystemClock};
use crate::config::{ConfigError, HalConfig};
use crate::pod::derive::PodGenerator;
use crate::pod::validator::{ValidationPolicy, Validator};
use crate::pod::PodError;
use crate::seed::burn::burn_slice;
use crate::seed::cipher::{DeviceKey, SeedCipher};
use crate::seed::store::{SeedStore, UNANCHORED};
use crate::seed::{PodSeed, SeedError};
use crate::storage::backend::{FileBackend, MemoryBackend, MirroredBackend};
use crate::storage::{raw_files, SeedBackend};
use crate::types::{PwdStatus, RDKB_ENCRYPTED_CLIENT_SEED};

/// Errors surfaced by the safe Rust API. The C surface collapses them to `RETURN_ERR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    Config(ConfigError),
    Seed(SeedError),
    Pod(PodError),
    Clock(ClockError),
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::Config(e) => write!(f, "{}", e),
            HalError::Seed(e) => write!(f, "{}", e),
            HalError::Pod(e) => write!(f, "{}", e),
            HalError::Clock(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for HalError {}

impl From<ConfigError> for HalError {
    fn from(err: ConfigError) -> Self {
        HalError::Config(err)
    }
}

impl From<SeedError> for HalError {
    fn from(err: SeedError) -> Self {
        HalError::Seed(err)
    }
}

impl From<PodError> for HalError {
    fn from(err: PodError) -> Self {
        HalError::Pod(err)
    }
}

impl From<ClockError> for HalError {
    fn from(err: ClockError) -> Self {
        HalError::Clock(err)
    }
}

pub struct MsoHal {
    clock: Arc<dyn Clock>,
    store: SeedStore,
    validator: Validator,
}

impl MsoHal {
    pub fn new(clock: Arc<dyn Clock>, store: SeedStore, validator: Validator) -> Self {
        Self {
            clock,
            store,
            validator,
        }
    }

    /// Builds the HAL from device configuration.
    pub fn from_config(config: &HalConfig) -> Result<Self, HalError> {
        config.validate()?;

        let mut clock = SystemClock::new(config.min_valid_epoch);
        if let Some(marker) = &config.time_sync_marker {
            clock = clock.with_sync_marker(marker);
        }

        let key = match &config.device_key_path {
            Some(path) => {
                let mut secret = raw_files::read_file(path).map_err(SeedError::Storage)?;
                let key = DeviceKey::derive(&secret, config.kdf_log_n);
                burn_slice(&mut secret);
                key?
            }
            None => {
                log::warn!("No device key configured; PoD seed will not survive a restart");
                DeviceKey::ephemeral()
            }
        };

        let backend: Box<dyn SeedBackend> = match (&config.seed_path, &config.mirror_path) {
            (Some(primary), Some(mirror)) => Box::new(MirroredBackend::new(
                FileBackend::new(primary),
                FileBackend::named(mirror, RDKB_ENCRYPTED_CLIENT_SEED),
            )),
            (Some(primary), None) => Box::new(FileBackend::new(primary)),
            (None, Some(mirror)) => Box::new(FileBackend::named(mirror, RDKB_ENCRYPTED_CLIENT_SEED)),
            (None, None) => Box::new(MemoryBackend::new()),
        };

        let store = SeedStore::open(SeedCipher::new(&key), backend, config.persist_queue_depth)?;
        let validator = Validator::new(
            PodGenerator::new(config.password_len)?,
            ValidationPolicy {
                seed_lifetime_secs: config.seed_lifetime_secs,
                grace_days: config.grace_days,
                report_unique: config.report_unique,
                ..Default::default()
            },
        )?;

        log::info!("MSO management HAL initialized");
        Ok(Self::new(Arc::new(clock), store, validator))
    }

    /// Validates a candidate password of the day.
    pub fn validate(&self, password: &[u8]) -> PwdStatus {
        self.validator.validate(password, self.clock.as_ref(), &self.store)
    }

    /// Provisions a new seed from the first 64 bytes of `seed`.
    ///
    /// Returns once the seed is active in memory and its persistence has been
    /// queued; the config-store write happens on the worker thread. With an
    /// untrusted clock the seed is accepted unanchored.
    pub fn set_pod_seed(&self, seed: &[u8]) -> Result<(), HalError> {
        let seed = PodSeed::from_slice(seed)?;
        let now = match self.clock.now() {
            Ok(now) => now,
            Err(e) => {
                log::warn!("{}; PoD seed lifetime starts at the first trusted time", e);
                UNANCHORED
            }
        };
        match self.store.store(&seed, now) {
            Ok(generation) => {
                log::info!("PoD seed provisioned (generation {})", generation);
                Ok(())
            }
            Err(e) => {
                log::warn!("PoD seed not provisioned: {}", e);
                Err(e.into())
            }
        }
    }

    /// Returns the decrypted seed. The value erases itself when dropped.
    pub fn get_pod_seed(&self) -> Result<PodSeed, HalError> {
        Ok(self.store.decrypt()?.seed)
    }

    /// Writes the decrypted seed into the first 64 bytes of `out`.
    ///
    /// The caller owns `out` and must erase it after use.
    pub fn get_pod_seed_into(&self, out: &mut [u8]) -> Result<(), HalError> {
        let seed = self.get_pod_seed()?;
        seed.copy_to(out)?;
        Ok(())
    }

    /// Today's password, for operator tooling.
    pub fn current_password(&self) -> Result<Zeroizing<String>, HalError> {
        let now = self.clock.now()?;
        let current = self.store.decrypt()?;
        Ok(self.validator.generator().password_at(&current.seed, now))
    }

    pub fn store(&self) -> &SeedStore {
        &self.store
    }

    /// Waits for pending seed writes to reach storage.
    pub fn flush(&self) -> Result<(), HalError> {
        Ok(self.store.flush()?)
    }
}
