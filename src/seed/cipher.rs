//! Seed Encryption at Rest.
//!
//! The seed never touches the config store or the SNMP mirror in plaintext.
//! It is sealed with ChaCha20-Poly1305 under a per-device key.
//!
//! # Record Format
//! `[Magic "MSOS" (4)] [Version (1)] [Provisioned At, u64 LE (8)] [Nonce (12)] [Ciphertext + Tag (80)]`
//!
//! The first 13 bytes are bound to the ciphertext as associated data, so the
//! provisioning timestamp cannot be altered without failing authentication.
//!
//! # Key Derivation
//! `DeviceKey = Scrypt(device_secret, "MSO_MGMT_HAL_DEVICE_KEY")`
//!
//! # Nonces
//! `Nonce = BLAKE3-keyed(nonce_key, counter)[..12]`, where `nonce_key` is
//! drawn from the OS once, when the cipher is built. Sealing never touches
//! the entropy pool.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand_core::{OsRng, RngCore};
use std::sync::atomic::{AtomicU64, Ordering};
use zeroize::Zeroizing;

use super::{PodSeed, SeedError};
use crate::types::SEED_LEN;

const MAGIC: &[u8; 4] = b"MSOS";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 8;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
/// Total size of an encoded record.
pub const RECORD_LEN: usize = HEADER_LEN + NONCE_LEN + SEED_LEN + TAG_LEN;

const KDF_SALT: &[u8] = b"MSO_MGMT_HAL_DEVICE_KEY";
const KDF_R: u32 = 8;
const KDF_P: u32 = 1;

/// Symmetric key that protects the seed on this device.
pub struct DeviceKey {
    key: Zeroizing<[u8; 32]>,
}

impl DeviceKey {
    /// Uses `key` as-is. For devices that expose a hardware-held key.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Derives the key from a device secret with scrypt (`N = 2^log_n`).
    pub fn derive(device_secret: &[u8], log_n: u8) -> Result<Self, SeedError> {
        let params = scrypt::Params::new(log_n, KDF_R, KDF_P, 32).map_err(|_| SeedError::CryptoError)?;
        let mut key = Zeroizing::new([0u8; 32]);
        scrypt::scrypt(device_secret, KDF_SALT, &params, &mut *key).map_err(|_| SeedError::CryptoError)?;
        Ok(Self { key })
    }

    /// Random key that only lives as long as the process.
    ///
    /// Records sealed with it cannot be read after a restart.
    pub fn ephemeral() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *key);
        Self { key }
    }
}

/// Encrypted seed as held by the store and its backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSeed {
    /// Unix time at which the seed was provisioned.
    pub provisioned_at: u64,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl EncryptedSeed {
    fn header(provisioned_at: u64) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(MAGIC);
        header[4] = VERSION;
        header[5..].copy_from_slice(&provisioned_at.to_le_bytes());
        header
    }

    /// Serializes the record.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_LEN);
        out.extend_from_slice(&Self::header(self.provisioned_at));
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parses a record. Authenticity is only checked by [`SeedCipher::open`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, SeedError> {
        if data.len() != RECORD_LEN {
            return Err(SeedError::MalformedRecord);
        }
        if &data[..4] != MAGIC || data[4] != VERSION {
            return Err(SeedError::MalformedRecord);
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&data[5..HEADER_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&data[HEADER_LEN..HEADER_LEN + NONCE_LEN]);

        Ok(Self {
            provisioned_at: u64::from_le_bytes(ts),
            nonce,
            ciphertext: data[HEADER_LEN + NONCE_LEN..].to_vec(),
        })
    }

    /// Lowercase hex, the form written to the config store and the OID.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parses the hex form; surrounding whitespace is ignored.
    pub fn from_hex(text: &str) -> Result<Self, SeedError> {
        let data = hex::decode(text.trim()).map_err(|_| SeedError::MalformedRecord)?;
        Self::from_bytes(&data)
    }
}

/// Seals and opens seed records under a [`DeviceKey`].
pub struct SeedCipher {
    aead: ChaCha20Poly1305,
    nonce_key: Zeroizing<[u8; 32]>,
    nonce_seq: AtomicU64,
}

impl SeedCipher {
    /// Builds a cipher for `key`.
    ///
    /// Draws the nonce key from the OS here, so later calls to [`seal`](Self::seal)
    /// cannot block on entropy.
    pub fn new(key: &DeviceKey) -> Self {
        let mut nonce_key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *nonce_key);
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(&key.key[..])),
            nonce_key,
            nonce_seq: AtomicU64::new(0),
        }
    }

    fn next_nonce(&self) -> [u8; NONCE_LEN] {
        let seq = self.nonce_seq.fetch_add(1, Ordering::Relaxed);
        let mut hasher = blake3::Hasher::new_keyed(&self.nonce_key);
        hasher.update(&seq.to_le_bytes());
        let mut nonce = [0u8; NONCE_LEN];
        hasher.finalize_xof().fill(&mut nonce);
        nonce
    }

    /// Encrypts `seed` under a nonce that is unique for this cipher.
    pub fn seal(&self, seed: &PodSeed, provisioned_at: u64) -> Result<EncryptedSeed, SeedError> {
        let nonce = self.next_nonce();
        let header = EncryptedSeed::header(provisioned_at);

        let ciphertext = self
            .aead
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &seed.as_bytes()[..],
                    aad: &header,
                },
            )
            .map_err(|_| SeedError::CryptoError)?;

        Ok(EncryptedSeed {
            provisioned_at,
            nonce,
            ciphertext,
        })
    }

    /// Authenticates and decrypts `record`.
    pub fn open(&self, record: &EncryptedSeed) -> Result<PodSeed, SeedError> {
        let header = EncryptedSeed::header(record.provisioned_at);
        let plaintext = Zeroizing::new(
            self.aead
                .decrypt(
                    Nonce::from_slice(&record.nonce),
                    Payload {
                        msg: &record.ciphertext,
                        aad: &header,
                    },
                )
                .map_err(|_| SeedError::DecryptionFailed)?,
        );
        if plaintext.len() != SEED_LEN {
            return Err(SeedError::MalformedRecord);
        }
        PodSeed::from_slice(&plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_seed() -> PodSeed {
        let mut bytes = [0u8; SEED_LEN];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(7);
        }
        PodSeed::new(bytes)
    }

    #[test]
    fn test_seal_open() {
        let cipher = SeedCipher::new(&DeviceKey::from_bytes([1u8; 32]));
        let seed = test_seed();
        let record = cipher.seal(&seed, 1_700_000_000).unwrap();

        assert_eq!(record.to_bytes().len(), RECORD_LEN);
        assert_ne!(&record.ciphertext[..SEED_LEN], &seed.as_bytes()[..]);
        assert_eq!(cipher.open(&record).unwrap(), seed);
    }

    #[test]
    fn test_wrong_key() {
        let record = SeedCipher::new(&DeviceKey::from_bytes([1u8; 32]))
            .seal(&test_seed(), 5)
            .unwrap();
        let other = SeedCipher::new(&DeviceKey::from_bytes([2u8; 32]));
        assert_eq!(other.open(&record).unwrap_err(), SeedError::DecryptionFailed);
    }

    #[test]
    fn test_timestamp_is_authenticated() {
        let cipher = SeedCipher::new(&DeviceKey::from_bytes([3u8; 32]));
        let mut record = cipher.seal(&test_seed(), 1_000).unwrap();
        record.provisioned_at = 2_000;
        assert_eq!(cipher.open(&record).unwrap_err(), SeedError::DecryptionFailed);
    }

    #[test]
    fn test_hex_encoding() {
        let cipher = SeedCipher::new(&DeviceKey::from_bytes([4u8; 32]));
        let record = cipher.seal(&test_seed(), 42).unwrap();
        let text = record.to_hex();
        assert_eq!(text.len(), RECORD_LEN * 2);

        let parsed = EncryptedSeed::from_hex(&format!("{}\n", text)).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.provisioned_at, 42);
    }

    #[test]
    fn test_malformed_records() {
        assert_eq!(EncryptedSeed::from_bytes(&[0u8; 10]).unwrap_err(), SeedError::MalformedRecord);
        assert_eq!(EncryptedSeed::from_hex("zz").unwrap_err(), SeedError::MalformedRecord);

        let cipher = SeedCipher::new(&DeviceKey::from_bytes([5u8; 32]));
        let mut bytes = cipher.seal(&test_seed(), 1).unwrap().to_bytes();
        bytes[0] = b'X';
        assert_eq!(EncryptedSeed::from_bytes(&bytes).unwrap_err(), SeedError::MalformedRecord);
    }

    #[test]
    fn test_nonces_do_not_repeat() {
        let key = DeviceKey::from_bytes([6u8; 32]);
        let cipher = SeedCipher::new(&key);
        let seed = test_seed();

        let records: Vec<_> = (0..64).map(|_| cipher.seal(&seed, 7).unwrap()).collect();
        let mut nonces: Vec<_> = records.iter().map(|r| r.nonce).collect();
        nonces.sort();
        nonces.dedup();
        assert_eq!(nonces.len(), records.len());

        // A second cipher over the same key (next boot) starts a new nonce stream.
        let restarted = SeedCipher::new(&key);
        let again = restarted.seal(&seed, 7).unwrap();
        assert_ne!(again.nonce, records[0].nonce);

        for record in records.iter().chain(core::iter::once(&again)) {
            assert_eq!(restarted.open(record).unwrap(), seed);
        }
    }

    #[test]
    fn test_derived_key_is_deterministic() {
        let a = DeviceKey::derive(b"device-secret", 4).unwrap();
        let b = DeviceKey::derive(b"device-secret", 4).unwrap();
        let record = SeedCipher::new(&a).seal(&test_seed(), 9).unwrap();
        assert_eq!(SeedCipher::new(&b).open(&record).unwrap(), test_seed());
    }
}
