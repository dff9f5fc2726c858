//! Daily Password Derivation.
//!
//! # Scheme
//! 1. **Key**: `K = BLAKE3_KDF(context="MSO_MGMT_HAL POD v1", seed)`
//! 2. **Digest**: `BLAKE3_Keyed(K, "pod" || day_le64)` read through the XOF
//! 3. **Encoding**: each output byte selects one of 32 symbols
//!
//! `day` is the number of whole UTC days since the Unix epoch. The alphabet
//! leaves out I, L, O and U so passwords can be read out over the phone.

use zeroize::Zeroizing;

use super::PodError;
use crate::seed::PodSeed;
use crate::types::SECS_PER_DAY;

const KDF_CONTEXT: &str = "MSO_MGMT_HAL POD v1";
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 32;
pub const DEFAULT_PASSWORD_LEN: usize = 10;

/// UTC day index of `unix_secs`.
pub fn day_of(unix_secs: u64) -> u64 {
    unix_secs / SECS_PER_DAY
}

/// Derives passwords of the day from a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PodGenerator {
    len: usize,
}

impl PodGenerator {
    pub fn new(len: usize) -> Result<Self, PodError> {
        if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
            return Err(PodError::InvalidLength);
        }
        Ok(Self { len })
    }

    pub fn password_len(&self) -> usize {
        self.len
    }

    /// Password for UTC day `day`.
    pub fn password_for_day(&self, seed: &PodSeed, day: u64) -> Zeroizing<String> {
        let mut raw = self.derive(seed, day);
        for b in raw.iter_mut() {
            *b = ALPHABET[(*b & 0x1F) as usize];
        }
        let text = raw.iter().map(|&b| b as char).collect::<String>();
        Zeroizing::new(text)
    }

    /// Password valid at `unix_secs`.
    pub fn password_at(&self, seed: &PodSeed, unix_secs: u64) -> Zeroizing<String> {
        self.password_for_day(seed, day_of(unix_secs))
    }

    /// Checks `candidate` against the password of `day`.
    ///
    /// Letters compare case-insensitively. The comparison time does not
    /// depend on where the first mismatch is.
    pub fn matches(&self, seed: &PodSeed, day: u64, candidate: &[u8]) -> bool {
        if candidate.len() != self.len {
            return false;
        }
        let expected = self.password_for_day(seed, day);
        let mut diff = 0u8;
        for (&e, &c) in expected.as_bytes().iter().zip(candidate.iter()) {
            diff |= e ^ c.to_ascii_uppercase();
        }
        diff == 0
    }

    fn derive(&self, seed: &PodSeed, day: u64) -> Zeroizing<Vec<u8>> {
        let key = Zeroizing::new(blake3::derive_key(KDF_CONTEXT, &seed.as_bytes()[..]));
        let mut hasher = blake3::Hasher::new_keyed(&key);
        hasher.update(b"pod");
        hasher.update(&day.to_le_bytes());

        let mut out = Zeroizing::new(vec![0u8; self.len]);
        hasher.finalize_xof().fill(&mut out);
        out
    }
}

impl Default for PodGenerator {
    fn default() -> Self {
        Self {
            len: DEFAULT_PASSWORD_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SEED_LEN;

    fn seed(fill: u8) -> PodSeed {
        PodSeed::new([fill; SEED_LEN])
    }

    #[test]
    fn test_length_bounds() {
        assert_eq!(PodGenerator::new(5).unwrap_err(), PodError::InvalidLength);
        assert_eq!(PodGenerator::new(33).unwrap_err(), PodError::InvalidLength);
        assert_eq!(PodGenerator::new(8).unwrap().password_len(), 8);
    }

    #[test]
    fn test_deterministic_within_day() {
        let gen = PodGenerator::default();
        let s = seed(1);
        let morning = gen.password_at(&s, 19_000 * SECS_PER_DAY + 60);
        let evening = gen.password_at(&s, 19_000 * SECS_PER_DAY + SECS_PER_DAY - 1);
        assert_eq!(*morning, *evening);
        assert_eq!(morning.len(), DEFAULT_PASSWORD_LEN);
        assert!(morning.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_changes_with_day_and_seed() {
        let gen = PodGenerator::default();
        assert_ne!(*gen.password_for_day(&seed(1), 19_000), *gen.password_for_day(&seed(1), 19_001));
        assert_ne!(*gen.password_for_day(&seed(1), 19_000), *gen.password_for_day(&seed(2), 19_000));
    }

    #[test]
    fn test_matches_case_insensitive() {
        let gen = PodGenerator::default();
        let s = seed(3);
        let pwd = gen.password_for_day(&s, 20_000);
        assert!(gen.matches(&s, 20_000, pwd.as_bytes()));
        assert!(gen.matches(&s, 20_000, pwd.to_ascii_lowercase().as_bytes()));
        assert!(!gen.matches(&s, 20_001, pwd.as_bytes()));
        assert!(!gen.matches(&s, 20_000, &pwd.as_bytes()[..DEFAULT_PASSWORD_LEN - 1]));
    }

    #[test]
    fn test_day_of() {
        assert_eq!(day_of(0), 0);
        assert_eq!(day_of(SECS_PER_DAY - 1), 0);
        assert_eq!(day_of(SECS_PER_DAY), 1);
    }
}
