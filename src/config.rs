//! Configuration management for the MSO Management HAL.
//!
//! Defines the structure for device-specific settings. The platform
//! integration either fills it in directly or, with the `config-json`
//! feature, loads it from a JSON file.

use core::fmt;

use crate::clock::DEFAULT_MIN_VALID_EPOCH;
use crate::pod::derive::{DEFAULT_PASSWORD_LEN, MAX_PASSWORD_LEN, MIN_PASSWORD_LEN};
use crate::pod::validator::MAX_GRACE_DAYS;
use crate::types::SEC_PER_YEAR;

/// Errors raised while loading or checking configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file could not be read.
    ReadFailed,
    /// The configuration file is not valid.
    Parse(String),
    /// A field is outside its allowed range.
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed => write!(f, "Failed to read HAL configuration"),
            ConfigError::Parse(msg) => write!(f, "Invalid HAL configuration: {}", msg),
            ConfigError::InvalidValue(field) => write!(f, "Configuration value out of range: {}", field),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Main configuration structure for the HAL.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config-json", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-json", serde(default, deny_unknown_fields))]
pub struct HalConfig {
    /// Config-store file holding the encrypted seed.
    /// If None, the seed is kept in memory only.
    pub seed_path: Option<String>,

    /// File mirroring the `rdkbEncryptedClientSeed` object.
    pub mirror_path: Option<String>,

    /// File holding the device secret the storage key is derived from.
    /// Required when `seed_path` is set; otherwise a per-process key is used.
    pub device_key_path: Option<String>,

    /// File whose presence signals that system time is synchronized.
    pub time_sync_marker: Option<String>,

    /// Clock readings before this Unix time are treated as unsynchronized.
    pub min_valid_epoch: u64,

    /// Lifetime of a provisioned seed in seconds.
    pub seed_lifetime_secs: u64,

    /// Previous days whose password yields `Expired` rather than `Invalid`.
    pub grace_days: u32,

    /// Number of characters in the password of the day.
    pub password_len: usize,

    /// Report the first accepted use of a day's password as `Unique`.
    pub report_unique: bool,

    /// Maximum number of seed writes waiting for the persistence worker.
    pub persist_queue_depth: usize,

    /// scrypt cost (`N = 2^kdf_log_n`) for the device key.
    pub kdf_log_n: u8,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            seed_path: None,
            mirror_path: None,
            device_key_path: None,
            time_sync_marker: None,
            min_valid_epoch: DEFAULT_MIN_VALID_EPOCH,
            seed_lifetime_secs: SEC_PER_YEAR,
            grace_days: 1,
            password_len: DEFAULT_PASSWORD_LEN,
            report_unique: false,
            persist_queue_depth: 8,
            kdf_log_n: 14,
        }
    }
}

impl HalConfig {
    /// Checks value ranges and cross-field requirements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&self.password_len) {
            return Err(ConfigError::InvalidValue("password_len"));
        }
        if self.grace_days > MAX_GRACE_DAYS {
            return Err(ConfigError::InvalidValue("grace_days"));
        }
        if self.seed_lifetime_secs == 0 {
            return Err(ConfigError::InvalidValue("seed_lifetime_secs"));
        }
        if self.persist_queue_depth == 0 {
            return Err(ConfigError::InvalidValue("persist_queue_depth"));
        }
        if !(1..=20).contains(&self.kdf_log_n) {
            return Err(ConfigError::InvalidValue("kdf_log_n"));
        }
        if (self.seed_path.is_some() || self.mirror_path.is_some()) && self.device_key_path.is_none() {
            return Err(ConfigError::InvalidValue("device_key_path"));
        }
        Ok(())
    }

    /// Parses a JSON document. Missing fields take their defaults.
    #[cfg(feature = "config-json")]
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: HalConfig = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file.
    #[cfg(feature = "config-json")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::ReadFailed)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        HalConfig::default().validate().unwrap();
    }

    #[test]
    fn test_ranges() {
        let bad = HalConfig {
            password_len: 4,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(ConfigError::InvalidValue("password_len")));

        let bad = HalConfig {
            persist_queue_depth: 0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(ConfigError::InvalidValue("persist_queue_depth")));
    }

    #[test]
    fn test_persistence_requires_device_key() {
        let config = HalConfig {
            seed_path: Some("/nvram/pod_seed.enc".into()),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidValue("device_key_path")));
    }

    #[cfg(feature = "config-json")]
    #[test]
    fn test_json_config() {
        let config = HalConfig::from_json_str(
            r#"{
                "seed_path": "/nvram/pod_seed.enc",
                "device_key_path": "/nvram/device.key",
                "grace_days": 2,
                "report_unique": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.seed_path.as_deref(), Some("/nvram/pod_seed.enc"));
        assert_eq!(config.grace_days, 2);
        assert!(config.report_unique);
        assert_eq!(config.password_len, DEFAULT_PASSWORD_LEN);
    }

    #[cfg(feature = "config-json")]
    #[test]
    fn test_json_rejects_unknown_fields() {
        let err = HalConfig::from_json_str(r#"{ "seed_file": "x" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[cfg(feature = "config-json")]
    #[test]
    fn test_json_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mso_hal.json");
        std::fs::write(&path, r#"{ "password_len": 12 }"#).unwrap();
        assert_eq!(HalConfig::load(&path).unwrap().password_len, 12);
        assert_eq!(HalConfig::load(dir.path().join("missing.json")), Err(ConfigError::ReadFailed));
    }
}
