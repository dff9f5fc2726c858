//! Password Validation Policy.
//!
//! Rules, first match wins:
//! 1. Untrusted clock: `TimeError`.
//! 2. No usable seed: `Invalid`.
//!
//! A seed provisioned while the clock was untrusted has its lifetime anchored
//! at the first validation that passes rule 1.
//!
//! 3. Clock earlier than the seed's provisioning time (beyond skew): `TimeError`.
//! 4. Malformed candidate: `Invalid`.
//! 5. Seed past its lifetime: `Expired` if the candidate would otherwise
//!    match, `Invalid` otherwise.
//! 6. Today's password: `Good`, or `Unique` on first use when enabled.
//! 7. A password from the grace window: `Expired`.
//! 8. Anything else: `Invalid`.

use std::sync::Mutex;

use super::derive::{day_of, PodGenerator};
use super::PodError;
use crate::clock::Clock;
use crate::seed::store::{ProvisionedSeed, SeedStore, UNANCHORED};
use crate::seed::PodSeed;
use crate::types::{PwdStatus, SECS_PER_DAY, SEC_PER_YEAR};

/// Longest candidate that is even looked at.
pub const MAX_CANDIDATE_LEN: usize = 64;
/// Largest supported grace window in days.
pub const MAX_GRACE_DAYS: u32 = 7;

/// Tunables for [`Validator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Seconds after provisioning at which the seed stops producing valid passwords.
    pub seed_lifetime_secs: u64,
    /// Previous days whose password is reported as `Expired` instead of `Invalid`.
    pub grace_days: u32,
    /// Report the first accepted use of each day's password as `Unique`.
    pub report_unique: bool,
    /// Tolerated clock lag behind the provisioning timestamp.
    pub clock_skew_secs: u64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            seed_lifetime_secs: SEC_PER_YEAR,
            grace_days: 1,
            report_unique: false,
            clock_skew_secs: SECS_PER_DAY,
        }
    }
}

/// Remembers whether today's password has been accepted for the current seed.
#[derive(Debug, Default)]
struct FirstUseTracker {
    seen: Option<(u64, u64)>,
}

impl FirstUseTracker {
    /// Returns true the first time `(generation, day)` is recorded.
    fn record(&mut self, generation: u64, day: u64) -> bool {
        if self.seen == Some((generation, day)) {
            return false;
        }
        self.seen = Some((generation, day));
        true
    }
}

pub struct Validator {
    generator: PodGenerator,
    policy: ValidationPolicy,
    first_use: Mutex<FirstUseTracker>,
}

impl Validator {
    pub fn new(generator: PodGenerator, policy: ValidationPolicy) -> Result<Self, PodError> {
        if policy.grace_days > MAX_GRACE_DAYS {
            return Err(PodError::InvalidGraceWindow);
        }
        Ok(Self {
            generator,
            policy,
            first_use: Mutex::new(FirstUseTracker::default()),
        })
    }

    pub fn generator(&self) -> &PodGenerator {
        &self.generator
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Validates `candidate` against the seed in `store` at the time given by `clock`.
    pub fn validate(&self, candidate: &[u8], clock: &dyn Clock, store: &SeedStore) -> PwdStatus {
        let now = match clock.now() {
            Ok(now) => now,
            Err(e) => {
                log::warn!("PoD validation refused: {}", e);
                return PwdStatus::TimeError;
            }
        };

        let mut current = match store.decrypt() {
            Ok(current) => current,
            Err(e) => {
                log::warn!("PoD validation without usable seed: {}", e);
                return PwdStatus::Invalid;
            }
        };

        if current.provisioned_at == UNANCHORED {
            match store.anchor(&current, now) {
                Ok(true) => log::info!("PoD seed lifetime anchored at {}", now),
                Ok(false) => {}
                Err(e) => log::warn!("PoD seed provisioning time not recorded: {}", e),
            }
            current.provisioned_at = now;
        }

        let status = self.evaluate(candidate, now, &current);
        log::debug!("PoD validation result: {}", status);
        status
    }

    /// Applies rules 3 to 8 for a known time and seed.
    pub fn evaluate(&self, candidate: &[u8], now: u64, current: &ProvisionedSeed) -> PwdStatus {
        if now.saturating_add(self.policy.clock_skew_secs) < current.provisioned_at {
            log::warn!("Clock is behind the PoD seed provisioning time");
            return PwdStatus::TimeError;
        }

        if candidate.is_empty() || candidate.len() > MAX_CANDIDATE_LEN || !candidate.is_ascii() {
            return PwdStatus::Invalid;
        }

        let today = day_of(now);
        let seed = &current.seed;
        let matches_today = self.generator.matches(seed, today, candidate);
        let matches_grace = !matches_today && self.matches_grace_window(seed, today, candidate);

        let age = now.saturating_sub(current.provisioned_at);
        if age >= self.policy.seed_lifetime_secs {
            return if matches_today || matches_grace {
                PwdStatus::Expired
            } else {
                PwdStatus::Invalid
            };
        }

        if matches_today {
            if self.policy.report_unique && self.record_first_use(current.generation, today) {
                return PwdStatus::Unique;
            }
            return PwdStatus::Good;
        }

        if matches_grace {
            return PwdStatus::Expired;
        }

        PwdStatus::Invalid
    }

    fn matches_grace_window(&self, seed: &PodSeed, today: u64, candidate: &[u8]) -> bool {
        (1..=u64::from(self.policy.grace_days))
            .filter_map(|back| today.checked_sub(back))
            .any(|day| self.generator.matches(seed, day, candidate))
    }

    fn record_first_use(&self, generation: u64, day: u64) -> bool {
        match self.first_use.lock() {
            Ok(mut tracker) => tracker.record(generation, day),
            Err(poisoned) => poisoned.into_inner().record(generation, day),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SEED_LEN;

    const NOW: u64 = 1_760_000_000;

    fn provisioned(at: u64, generation: u64) -> ProvisionedSeed {
        ProvisionedSeed {
            seed: PodSeed::new([0x3C; SEED_LEN]),
            provisioned_at: at,
            generation,
        }
    }

    fn validator(policy: ValidationPolicy) -> Validator {
        Validator::new(PodGenerator::default(), policy).unwrap()
    }

    fn password(v: &Validator, current: &ProvisionedSeed, at: u64) -> String {
        v.generator().password_at(&current.seed, at).to_string()
    }

    #[test]
    fn test_good_and_invalid() {
        let v = validator(ValidationPolicy::default());
        let current = provisioned(NOW - 100, 1);
        let pwd = password(&v, &current, NOW);

        assert_eq!(v.evaluate(pwd.as_bytes(), NOW, &current), PwdStatus::Good);
        assert_eq!(v.evaluate(b"0000000000", NOW, &current), PwdStatus::Invalid);
        assert_eq!(v.evaluate(b"", NOW, &current), PwdStatus::Invalid);
        assert_eq!(v.evaluate(&[b'A'; 65], NOW, &current), PwdStatus::Invalid);
        assert_eq!(v.evaluate("ÄÄÄÄÄ".as_bytes(), NOW, &current), PwdStatus::Invalid);
    }

    #[test]
    fn test_yesterday_is_expired() {
        let v = validator(ValidationPolicy::default());
        let current = provisioned(NOW - 10 * SECS_PER_DAY, 1);
        let pwd = password(&v, &current, NOW);

        assert_eq!(v.evaluate(pwd.as_bytes(), NOW + SECS_PER_DAY, &current), PwdStatus::Expired);
        // Outside the one-day grace window it is just wrong.
        assert_eq!(v.evaluate(pwd.as_bytes(), NOW + 2 * SECS_PER_DAY, &current), PwdStatus::Invalid);
    }

    #[test]
    fn test_no_grace_window() {
        let v = validator(ValidationPolicy {
            grace_days: 0,
            ..Default::default()
        });
        let current = provisioned(NOW - 10 * SECS_PER_DAY, 1);
        let pwd = password(&v, &current, NOW);
        assert_eq!(v.evaluate(pwd.as_bytes(), NOW + SECS_PER_DAY, &current), PwdStatus::Invalid);
    }

    #[test]
    fn test_seed_lifetime() {
        let v = validator(ValidationPolicy::default());
        let current = provisioned(NOW, 1);
        let later = NOW + SEC_PER_YEAR;
        let pwd = password(&v, &current, later);

        assert_eq!(v.evaluate(pwd.as_bytes(), later, &current), PwdStatus::Expired);
        assert_eq!(v.evaluate(b"ZZZZZZZZZZ", later, &current), PwdStatus::Invalid);

        let before = later - 1;
        let pwd = password(&v, &current, before);
        assert_eq!(v.evaluate(pwd.as_bytes(), before, &current), PwdStatus::Good);
    }

    #[test]
    fn test_clock_behind_provisioning() {
        let v = validator(ValidationPolicy::default());
        let current = provisioned(NOW, 1);
        let pwd = password(&v, &current, NOW - 2 * SECS_PER_DAY);
        assert_eq!(
            v.evaluate(pwd.as_bytes(), NOW - 2 * SECS_PER_DAY, &current),
            PwdStatus::TimeError
        );
        // Within the skew allowance validation proceeds.
        let pwd = password(&v, &current, NOW - 60);
        assert_eq!(v.evaluate(pwd.as_bytes(), NOW - 60, &current), PwdStatus::Good);
    }

    #[test]
    fn test_unique_first_use() {
        let v = validator(ValidationPolicy {
            report_unique: true,
            ..Default::default()
        });
        let current = provisioned(NOW - 100, 1);
        let pwd = password(&v, &current, NOW);

        assert_eq!(v.evaluate(pwd.as_bytes(), NOW, &current), PwdStatus::Unique);
        assert_eq!(v.evaluate(pwd.as_bytes(), NOW, &current), PwdStatus::Good);
        // A wrong guess does not consume the first use of the next seed.
        let reseeded = provisioned(NOW - 50, 2);
        let pwd2 = password(&v, &reseeded, NOW);
        assert_eq!(v.evaluate(b"0000000000", NOW, &reseeded), PwdStatus::Invalid);
        assert_eq!(v.evaluate(pwd2.as_bytes(), NOW, &reseeded), PwdStatus::Unique);
    }

    #[test]
    fn test_unique_disabled_by_default() {
        let v = validator(ValidationPolicy::default());
        let current = provisioned(NOW - 100, 1);
        let pwd = password(&v, &current, NOW);
        assert_eq!(v.evaluate(pwd.as_bytes(), NOW, &current), PwdStatus::Good);
    }

    #[test]
    fn test_grace_window_bound() {
        let policy = ValidationPolicy {
            grace_days: MAX_GRACE_DAYS + 1,
            ..Default::default()
        };
        assert_eq!(
            Validator::new(PodGenerator::default(), policy).err(),
            Some(PodError::InvalidGraceWindow)
        );
    }
}
