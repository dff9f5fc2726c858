//! C ABI of the MSO Management HAL.
//!
//! Exposes the vendor HAL entry points on top of one process-wide
//! [`MsoHal`]. The instance is created by `mso_hal_init`, or lazily with
//! default settings on first use.
//!
//! # Safety
//! Pointers are only dereferenced after a null check. Seed buffers are
//! accessed for exactly `SEED_LEN` bytes; the caller guarantees they are at
//! least that large. Panics never unwind into C.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use crate::config::HalConfig;
use crate::hal::MsoHal;
use crate::types::{PwdStatus, RETURN_ERR, RETURN_OK, SEED_LEN};

/// HAL version, `0xMMmmpp`.
pub const MSO_HAL_VERSION: u32 = 0x000100;

/// Validation status as seen by C callers.
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum mso_pwd_ret_status {
    /// Password is Invalid.
    Invalid_PWD = 0,
    /// Password is Good.
    Good_PWD = 1,
    /// Password is Unique.
    Unique_PWD = 2,
    /// Password is Expired.
    Expired_PWD = 3,
    /// Time error during password validation.
    TimeError = 4,
}

impl From<PwdStatus> for mso_pwd_ret_status {
    fn from(status: PwdStatus) -> Self {
        match status {
            PwdStatus::Invalid => mso_pwd_ret_status::Invalid_PWD,
            PwdStatus::Good => mso_pwd_ret_status::Good_PWD,
            PwdStatus::Unique => mso_pwd_ret_status::Unique_PWD,
            PwdStatus::Expired => mso_pwd_ret_status::Expired_PWD,
            PwdStatus::TimeError => mso_pwd_ret_status::TimeError,
        }
    }
}

static HAL: RwLock<Option<Arc<MsoHal>>> = RwLock::new(None);

/// Runs `f`, turning a panic into `fallback` so it never unwinds into C.
fn guarded<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            log::error!("Panic caught at the MSO HAL boundary");
            fallback
        }
    }
}

fn status_code(result: Result<(), ()>) -> c_int {
    match result {
        Ok(()) => RETURN_OK,
        Err(()) => RETURN_ERR,
    }
}

fn lock_hal() -> RwLockWriteGuard<'static, Option<Arc<MsoHal>>> {
    HAL.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returns the process-wide HAL, creating it with defaults if needed.
fn instance() -> Option<Arc<MsoHal>> {
    {
        let guard = HAL.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(hal) = guard.as_ref() {
            return Some(Arc::clone(hal));
        }
    }

    let mut guard = lock_hal();
    if guard.is_none() {
        log::info!("MSO HAL used before mso_hal_init; initializing with defaults");
        match MsoHal::from_config(&HalConfig::default()) {
            Ok(hal) => *guard = Some(Arc::new(hal)),
            Err(e) => {
                log::error!("MSO HAL initialization failed: {}", e);
                return None;
            }
        }
    }
    guard.as_ref().map(Arc::clone)
}

/// Takes the installed instance out and waits until its queued seed writes
/// have reached storage.
///
/// Called with the `HAL` lock held, so no replacement can read the store
/// while the old worker is still writing to it.
fn drain(slot: &mut Option<Arc<MsoHal>>) -> Option<Arc<MsoHal>> {
    let previous = slot.take()?;
    if let Err(e) = previous.flush() {
        log::warn!("Pending PoD seed writes not confirmed: {}", e);
    }
    Some(previous)
}

fn load_config(config_path: *const c_char) -> Option<HalConfig> {
    if config_path.is_null() {
        return Some(HalConfig::default());
    }
    // SAFETY: non-null and NUL-terminated per the init contract.
    let path = unsafe { CStr::from_ptr(config_path) }.to_str().ok()?;

    #[cfg(feature = "config-json")]
    {
        match HalConfig::load(path) {
            Ok(config) => Some(config),
            Err(e) => {
                log::error!("Cannot load HAL configuration {}: {}", path, e);
                None
            }
        }
    }

    #[cfg(not(feature = "config-json"))]
    {
        log::error!("Cannot load HAL configuration {}: built without config-json", path);
        None
    }
}

/// Initializes (or re-initializes) the HAL.
///
/// `config_path` names a JSON configuration file; NULL selects defaults.
/// A previously installed instance is flushed before the new one loads the
/// seed. Returns `RETURN_OK` or `RETURN_ERR`.
///
/// # Safety
/// `config_path` must be NULL or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mso_hal_init(config_path: *const c_char) -> c_int {
    guarded(RETURN_ERR, || status_code(reinstall(load_config(config_path))))
}

fn reinstall(config: Option<HalConfig>) -> Result<(), ()> {
    let config = config.ok_or(())?;
    let mut slot = lock_hal();
    let previous = drain(&mut slot);
    match MsoHal::from_config(&config) {
        Ok(hal) => {
            *slot = Some(Arc::new(hal));
            Ok(())
        }
        Err(e) => {
            log::error!("MSO HAL initialization failed: {}; keeping previous instance", e);
            *slot = previous;
            Err(())
        }
    }
}

/// Releases the HAL. Pending seed writes are completed first.
#[no_mangle]
pub extern "C" fn mso_hal_shutdown() {
    guarded((), || {
        let mut slot = lock_hal();
        if drain(&mut slot).is_some() {
            log::info!("MSO management HAL shut down");
        }
    })
}

#[no_mangle]
pub extern "C" fn mso_hal_version() -> u32 {
    MSO_HAL_VERSION
}

/// Validates whether `pwd` matches the password of the day for the MSO user.
///
/// # Safety
/// `pwd` must be NULL or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mso_validatepwd(pwd: *mut c_char) -> mso_pwd_ret_status {
    if pwd.is_null() {
        return mso_pwd_ret_status::Invalid_PWD;
    }
    guarded(PwdStatus::Invalid, || {
        // SAFETY: checked non-null above; NUL-terminated per contract.
        let candidate = unsafe { CStr::from_ptr(pwd) }.to_bytes();
        match instance() {
            Some(hal) => hal.validate(candidate),
            None => PwdStatus::Invalid,
        }
    })
    .into()
}

/// Sets the PoD seed from the first 64 bytes of `p_seed`.
///
/// Does not block: persistence is queued to the HAL's worker thread.
///
/// # Safety
/// `p_seed` must be NULL or valid for reads of `SEED_LEN` bytes.
#[no_mangle]
pub unsafe extern "C" fn mso_set_pod_seed(p_seed: *mut c_char) -> c_int {
    if p_seed.is_null() {
        return RETURN_ERR;
    }
    guarded(RETURN_ERR, || {
        // SAFETY: checked non-null above; caller guarantees SEED_LEN readable bytes.
        let seed = unsafe { core::slice::from_raw_parts(p_seed as *const u8, SEED_LEN) };
        status_code(instance().ok_or(()).and_then(|hal| hal.set_pod_seed(seed).map_err(|_| ())))
    })
}

/// Writes the decrypted PoD seed into the first 64 bytes of `p_seed`.
///
/// The caller MUST overwrite the buffer after use.
///
/// # Safety
/// `p_seed` must be NULL or valid for writes of `SEED_LEN` bytes.
#[no_mangle]
pub unsafe extern "C" fn mso_get_pod_seed(p_seed: *mut c_char) -> c_int {
    if p_seed.is_null() {
        return RETURN_ERR;
    }
    guarded(RETURN_ERR, || {
        // SAFETY: checked non-null above; caller guarantees SEED_LEN writable bytes.
        let out = unsafe { core::slice::from_raw_parts_mut(p_seed as *mut u8, SEED_LEN) };
        status_code(instance().ok_or(()).and_then(|hal| hal.get_pod_seed_into(out).map_err(|_| ())))
    })
}
