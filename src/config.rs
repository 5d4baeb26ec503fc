//! Configuration for resilience scopes.
//!
//! Defaults can be loaded from a TOML file with environment overrides:
//!
//! ```toml
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1500
//!
//! [debounce]
//! normal_ms = 150
//!
//! [messages]
//! generic = "Something went wrong"
//!
//! [messages.network]
//! key = "dashboard.errors.network"
//! default = "You appear to be offline."
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use crate::i18n::MessageCatalog;
use crate::retry::{RetryPolicy, DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_RETRIES};
use crate::schedule::PriorityDelays;

/// Prefix of environment overrides, e.g. `RESILIENCE__RETRY__MAX_RETRIES=4`.
pub const ENV_PREFIX: &str = "RESILIENCE";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The configuration file path is invalid.
    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    /// The configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// A value is out of range.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Default retry settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff multiplier.
    pub backoff_factor: f64,
    /// Whether delays are jittered.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: 1000,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter: true,
        }
    }
}

impl RetrySettings {
    /// Converts to a policy.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
            .with_backoff_factor(self.backoff_factor)
            .with_jitter(self.jitter)
    }
}

/// Debounce window per priority tier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DebounceSettings {
    /// Immediate tier, in milliseconds.
    pub immediate_ms: u64,
    /// Normal tier, in milliseconds.
    pub normal_ms: u64,
    /// Low tier, in milliseconds.
    pub low_ms: u64,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            immediate_ms: 0,
            normal_ms: 100,
            low_ms: 300,
        }
    }
}

impl DebounceSettings {
    /// Converts to tier delays.
    pub fn to_delays(&self) -> PriorityDelays {
        PriorityDelays {
            immediate: Duration::from_millis(self.immediate_ms),
            normal: Duration::from_millis(self.normal_ms),
            low: Duration::from_millis(self.low_ms),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResilienceConfig {
    /// Retry defaults.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Debounce tiers.
    #[serde(default)]
    pub debounce: DebounceSettings,
    /// Failure messages.
    #[serde(default)]
    pub messages: MessageCatalog,
}

impl ResilienceConfig {
    /// Loads configuration from a TOML file, applying `RESILIENCE__*`
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be parsed, or
    /// holds out-of-range values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| ConfigError::InvalidPath(format!("{:?}", path)))?;

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path_str.to_string()));
        }

        let config = Config::builder()
            .add_source(File::new(path_str, FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: ResilienceConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parses configuration from a TOML string. No environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        let loaded: ResilienceConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.base_delay_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid {
                field: "retry.backoff_factor",
                reason: format!("must be at least 1.0, got {}", self.retry.backoff_factor),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::i18n::IdentityTranslator;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retry.backoff_factor, 2.0);
        assert!(config.retry.jitter);
        assert_eq!(config.debounce.to_delays(), PriorityDelays::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ResilienceConfig::from_toml_str(
            r#"
            [retry]
            max_retries = 4
            jitter = false

            [debounce]
            low_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert!(!config.retry.jitter);
        assert_eq!(config.debounce.normal_ms, 100);
        assert_eq!(config.debounce.low_ms, 500);

        let policy = config.retry.to_policy();
        assert_eq!(policy.max_retries, 4);
        assert!(!policy.jitter);
    }

    #[test]
    fn test_messages_from_toml() {
        let config = ResilienceConfig::from_toml_str(
            r#"
            [messages]
            generic = "Oops"

            [messages.network]
            key = "dashboard.errors.network"
            default = "You appear to be offline."
            "#,
        )
        .unwrap();

        let catalog = &config.messages;
        assert_eq!(
            catalog.resolve(ErrorKind::Network, &IdentityTranslator),
            "You appear to be offline."
        );
        assert_eq!(catalog.resolve(ErrorKind::Server, &IdentityTranslator), "Oops");
    }

    #[test]
    fn test_rejects_zero_base_delay() {
        let err = ResilienceConfig::from_toml_str("[retry]\nbase_delay_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "retry.base_delay_ms", .. }));
    }

    #[test]
    fn test_rejects_small_backoff_factor() {
        let err = ResilienceConfig::from_toml_str("[retry]\nbackoff_factor = 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "retry.backoff_factor", .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[retry]\nmax_retries = 5\nbase_delay_ms = 1500").unwrap();

        let config = ResilienceConfig::load(file.path()).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1500);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ResilienceConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
