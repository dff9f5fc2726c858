//! Secure erasure of seed material.
//!
//! Used for every temporary plaintext copy that is not already held in a
//! `Zeroizing` container, e.g. staging buffers at the C boundary.
//!
//! # Security
//! - **Volatile Writes**: `zeroize` writes cannot be optimized away.
//! - **Paranoid Mode**: multi-pass overwrite (0xFF, pattern, 0x00) when the
//!   `paranoid` feature is enabled.

use zeroize::Zeroize;

/// Irreversibly overwrites `slice`.
#[inline(never)]
pub fn burn_slice(slice: &mut [u8]) {
    #[cfg(feature = "paranoid")]
    {
        for byte in slice.iter_mut() {
            // SAFETY: `byte` is a valid, exclusive reference.
            unsafe { core::ptr::write_volatile(byte, 0xFF) };
        }
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);

        for (i, byte) in slice.iter_mut().enumerate() {
            // SAFETY: as above.
            unsafe { core::ptr::write_volatile(byte, (i % 255) as u8) };
        }
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    }

    slice.zeroize();
    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
}
