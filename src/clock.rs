//! Time sources for password-of-the-day validation.
//!
//! Validation needs a wall clock it can trust. A device that has not yet
//! synchronized (NTP/ToD from the CMTS) usually boots at the epoch, so any
//! clock reading below a plausibility floor is treated as unsynchronized.

use core::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// 2016-01-01T00:00:00Z.
pub const DEFAULT_MIN_VALID_EPOCH: u64 = 1_451_606_400;

/// Reasons the current time cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// The system clock could not be read.
    Unavailable,
    /// Time has not been synchronized yet.
    NotSynchronized,
    /// The clock reports a time before the plausibility floor.
    Implausible,
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::Unavailable => write!(f, "System clock unavailable"),
            ClockError::NotSynchronized => write!(f, "System time not synchronized"),
            ClockError::Implausible => write!(f, "System time is implausible"),
        }
    }
}

impl std::error::Error for ClockError {}

/// A source of trusted Unix time in seconds.
pub trait Clock: Send + Sync {
    /// Returns the current Unix time, or why it cannot be trusted.
    fn now(&self) -> Result<u64, ClockError>;
}

/// Wall clock with synchronization checks.
#[derive(Debug, Clone)]
pub struct SystemClock {
    min_valid_epoch: u64,
    sync_marker: Option<PathBuf>,
}

impl SystemClock {
    /// Creates a clock that only checks the plausibility floor.
    pub fn new(min_valid_epoch: u64) -> Self {
        Self {
            min_valid_epoch,
            sync_marker: None,
        }
    }

    /// Requires `marker` to exist before the clock is considered synchronized.
    ///
    /// Time managers on broadband devices touch such a file once ToD/NTP
    /// has converged.
    pub fn with_sync_marker<P: Into<PathBuf>>(mut self, marker: P) -> Self {
        self.sync_marker = Some(marker.into());
        self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_VALID_EPOCH)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Result<u64, ClockError> {
        if let Some(marker) = &self.sync_marker {
            if !marker.exists() {
                return Err(ClockError::NotSynchronized);
            }
        }
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ClockError::Unavailable)?
            .as_secs();
        if secs < self.min_valid_epoch {
            return Err(ClockError::Implausible);
        }
        Ok(secs)
    }
}

/// Manually driven clock.
///
/// Lets a host pin time during manufacturing tests, and lets tests advance
/// time or inject synchronization faults.
#[derive(Debug)]
pub struct ManualClock {
    secs: AtomicU64,
    synchronized: AtomicBool,
}

impl ManualClock {
    /// Creates a synchronized clock at `secs`.
    pub fn new(secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(secs),
            synchronized: AtomicBool::new(true),
        }
    }

    /// Moves the clock to `secs`, forwards or backwards.
    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    /// Moves the clock forward by `delta` seconds.
    pub fn advance(&self, delta: u64) {
        self.secs.fetch_add(delta, Ordering::SeqCst);
    }

    /// Marks the clock as (un)synchronized.
    pub fn set_synchronized(&self, synchronized: bool) {
        self.synchronized.store(synchronized, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<u64, ClockError> {
        if !self.synchronized.load(Ordering::SeqCst) {
            return Err(ClockError::NotSynchronized);
        }
        Ok(self.secs.load(Ordering::SeqCst))
    }
}
