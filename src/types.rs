//! Constants and status types shared by every MSO Management HAL operation.
//!
//! Numeric values match the vendor HAL header so the C surface stays
//! binary-compatible with existing management agents.

use core::fmt;

/// Operation succeeded.
pub const RETURN_OK: i32 = 0;
/// Operation failed. No further detail crosses the C boundary.
pub const RETURN_ERR: i32 = -1;
/// Generic error marker kept for header parity.
pub const ERROR: i32 = -1;

/// Lifetime of a provisioned seed, one non-leap calendar year.
pub const SEC_PER_YEAR: u64 = 31_536_000;
/// Length of one PoD day.
pub const SECS_PER_DAY: u64 = 86_400;

/// Size in bytes of the legacy Arris HTTP client seed.
pub const SIZE_ARRIS_CM_DEV_HTTP_CLIENT_SEED: usize = 8;

/// Minimum size of every seed buffer exchanged with the caller.
pub const SEED_LEN: usize = 64;

/// SNMP object that mirrors the encrypted seed held in the config store.
pub const RDKB_ENCRYPTED_CLIENT_SEED: &str = "rdkbEncryptedClientSeed";

/// Outcome of a single password-of-the-day validation.
///
/// The discriminants are the `mso_pwd_ret_status` values of the C header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub enum PwdStatus {
    /// Password does not match.
    Invalid = 0,
    /// Password matches today's password of the day.
    Good = 1,
    /// Password matches and is reported as unique. Only produced when the
    /// host enables first-use reporting.
    Unique = 2,
    /// Password belonged to an elapsed validity window.
    Expired = 3,
    /// The clock cannot be trusted to compute "today".
    TimeError = 4,
}

impl PwdStatus {
    /// Returns true when the candidate was accepted.
    pub fn is_accepted(self) -> bool {
        matches!(self, PwdStatus::Good | PwdStatus::Unique)
    }
}

impl fmt::Display for PwdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PwdStatus::Invalid => write!(f, "Invalid_PWD"),
            PwdStatus::Good => write!(f, "Good_PWD"),
            PwdStatus::Unique => write!(f, "Unique_PWD"),
            PwdStatus::Expired => write!(f, "Expired_PWD"),
            PwdStatus::TimeError => write!(f, "TimeError"),
        }
    }
}
