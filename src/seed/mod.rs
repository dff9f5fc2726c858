//! PoD Seed Handling.
//!
//! The seed is the 64-byte secret from which every password of the day is
//! derived. Plaintext only ever lives in a [`PodSeed`], which wipes itself on
//! drop; at rest and in the shared store it is held encrypted.
//!
//! # Components
//! - `cipher`: device key and AEAD sealing of the seed record.
//! - `store`: the shared, explicitly owned seed state.
//! - `burn`: secure erasure of caller-visible buffers.

pub mod burn;
pub mod cipher;
pub mod store;

use core::fmt;
use zeroize::{Zeroize, Zeroizing};

use crate::storage::StorageError;
use crate::types::SEED_LEN;

/// Errors related to seed handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedError {
    /// Caller buffer shorter than `SEED_LEN`.
    BufferTooShort,
    /// No seed has been provisioned.
    NotProvisioned,
    /// Encrypted record is malformed.
    MalformedRecord,
    /// Record failed authentication or decryption.
    DecryptionFailed,
    /// Encryption or key derivation failed.
    CryptoError,
    /// The backing store rejected the operation.
    Storage(StorageError),
}

impl fmt::Display for SeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedError::BufferTooShort => write!(f, "Seed buffer shorter than {} bytes", SEED_LEN),
            SeedError::NotProvisioned => write!(f, "No PoD seed provisioned"),
            SeedError::MalformedRecord => write!(f, "Malformed encrypted seed record"),
            SeedError::DecryptionFailed => write!(f, "Seed decryption failed"),
            SeedError::CryptoError => write!(f, "Seed encryption failed"),
            SeedError::Storage(e) => write!(f, "Seed storage error: {}", e),
        }
    }
}

impl std::error::Error for SeedError {}

impl From<StorageError> for SeedError {
    fn from(err: StorageError) -> Self {
        SeedError::Storage(err)
    }
}

/// Plaintext PoD seed.
///
/// Returned by the getter as a scoped secret: the bytes are overwritten when
/// the value goes out of scope, so callers no longer have to remember to
/// erase the buffer themselves.
pub struct PodSeed {
    bytes: Zeroizing<[u8; SEED_LEN]>,
}

impl PodSeed {
    /// Wraps an owned 64-byte seed.
    pub fn new(bytes: [u8; SEED_LEN]) -> Self {
        let mut bytes = bytes;
        let seed = Self {
            bytes: Zeroizing::new(bytes),
        };
        bytes.zeroize();
        seed
    }

    /// Copies the first `SEED_LEN` bytes of `buf`.
    ///
    /// # Errors
    /// `SeedError::BufferTooShort` if `buf` holds fewer than 64 bytes.
    pub fn from_slice(buf: &[u8]) -> Result<Self, SeedError> {
        if buf.len() < SEED_LEN {
            return Err(SeedError::BufferTooShort);
        }
        let mut bytes = Zeroizing::new([0u8; SEED_LEN]);
        bytes.copy_from_slice(&buf[..SEED_LEN]);
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.bytes
    }

    /// Writes the seed into the first `SEED_LEN` bytes of `out`.
    pub fn copy_to(&self, out: &mut [u8]) -> Result<(), SeedError> {
        if out.len() < SEED_LEN {
            return Err(SeedError::BufferTooShort);
        }
        out[..SEED_LEN].copy_from_slice(&self.bytes[..]);
        Ok(())
    }
}

impl PartialEq for PodSeed {
    fn eq(&self, other: &Self) -> bool {
        let mut diff = 0u8;
        for (a, b) in self.bytes.iter().zip(other.bytes.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl Eq for PodSeed {}

impl fmt::Debug for PodSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PodSeed([REDACTED])")
    }
}
