//! Configuration loading and validation.
//!
//! All values are read from environment variables; consumers embedding this
//! crate in a larger service can also build a [`Config`] directly.

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The environment could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A field failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Validated keyring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Postgres connection URL. **Required.**
    pub database_url: String,

    /// Name of the key-encryption-key in the key-management service.
    #[serde(default = "default_kek_name")]
    pub kek_name: String,

    /// Deadline (seconds) for each key-management service call.
    #[serde(default = "default_kms_timeout")]
    pub kms_timeout_secs: u64,

    /// Deadline (seconds) for the keyring read and the session-variable
    /// batch on each connection acquisition.
    #[serde(default = "default_db_timeout")]
    pub db_timeout_secs: u64,

    /// Maximum size of the injected connection pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Deadline (seconds) for acquiring a connection from the pool.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_kek_name() -> String {
    "colcrypt.kek".into()
}
fn default_kms_timeout() -> u64 {
    5
}
fn default_db_timeout() -> u64 {
    5
}
fn default_max_connections() -> u32 {
    8
}
fn default_acquire_timeout() -> u64 {
    30
}

impl Config {
    /// Load and validate configuration from environment variables
    /// (`DATABASE_URL`, `KEK_NAME`, `KMS_TIMEOUT_SECS`, ...).
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is absent, cannot be parsed,
    /// or fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let c: Config = cfg.try_deserialize()?;
        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_non_empty(&self.database_url, "DATABASE_URL")?;
        ensure_non_empty(&self.kek_name, "KEK_NAME")?;

        if self.kms_timeout_secs == 0 {
            return Err(ConfigError::Invalid("KMS_TIMEOUT_SECS must be > 0".into()));
        }
        if self.db_timeout_secs == 0 {
            return Err(ConfigError::Invalid("DB_TIMEOUT_SECS must be > 0".into()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("MAX_CONNECTIONS must be > 0".into()));
        }
        if self.acquire_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "ACQUIRE_TIMEOUT_SECS must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!(
            "{name} is required and must not be empty"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            database_url: "postgres://localhost/app".into(),
            kek_name: default_kek_name(),
            kms_timeout_secs: default_kms_timeout(),
            db_timeout_secs: default_db_timeout(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_kek_name(), "colcrypt.kek");
        assert_eq!(default_kms_timeout(), 5);
        assert_eq!(default_db_timeout(), 5);
        assert_eq!(default_max_connections(), 8);
        assert_eq!(default_acquire_timeout(), 30);
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_empty_database_url() {
        let mut cfg = valid();
        cfg.database_url = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut cfg = valid();
        cfg.kms_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.db_timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_pool() {
        let mut cfg = valid();
        cfg.max_connections = 0;
        assert!(cfg.validate().is_err());
    }
}
