//! Diagnostic logging for hosts embedding the resilience layer.
//!
//! The library itself only emits `tracing` events; this module installs a
//! stderr subscriber for hosts that do not bring their own. `RUST_LOG`
//! overrides the configured level.

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Log level for the subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Every attempt, backoff and debounce event.
    Trace,
    /// Attempts and backoff decisions.
    Debug,
    /// Default.
    #[default]
    Info,
    /// Terminal failures only.
    Warn,
    /// Errors only.
    Error,
    /// Nothing.
    Off,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl From<LogLevel> for Option<Level> {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Some(Level::TRACE),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Off => None,
        }
    }
}

impl From<u8> for LogLevel {
    /// 0 = Info, 1 = Debug, 2+ = Trace
    fn from(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level applied to this crate's events.
    pub level: LogLevel,
    /// Level applied to everything else.
    pub default_level: LogLevel,
    /// Include timestamps.
    pub with_timestamps: bool,
    /// Include the module path.
    pub with_target: bool,
    /// Use ANSI colors.
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            default_level: LogLevel::Warn,
            with_timestamps: true,
            with_target: true,
            with_ansi: false,
        }
    }
}

impl LoggingConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the level for this crate.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the level for other crates.
    pub fn with_default_level(mut self, level: LogLevel) -> Self {
        self.default_level = level;
        self
    }

    /// Enables or disables timestamps.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    /// Enables or disables module paths.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Enables or disables ANSI colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    /// Configuration from a verbosity count.
    pub fn from_verbosity(verbosity: u8) -> Self {
        Self::default().with_level(LogLevel::from(verbosity))
    }

    /// Filter directives, e.g. `warn,resilient_view=debug`.
    pub fn directives(&self) -> String {
        format!(
            "{},{}={}",
            self.default_level.directive(),
            env!("CARGO_CRATE_NAME"),
            self.level.directive()
        )
    }

    fn filter(&self) -> EnvFilter {
        if std::env::var_os("RUST_LOG").is_some() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.directives())
        }
    }
}

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Installs a stderr subscriber, failing if one is already set.
pub fn try_init_logging(config: LoggingConfig) -> Result<(), InitError> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.filter())
        .with_writer(std::io::stderr)
        .with_target(config.with_target)
        .with_ansi(config.with_ansi);

    if config.with_timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    }
}

/// Installs a stderr subscriber. A subscriber that is already installed is
/// left in place.
pub fn init_logging(config: LoggingConfig) {
    if let Err(err) = try_init_logging(config) {
        tracing::debug!("logging already initialized: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_verbosity() {
        assert_eq!(LogLevel::from(0), LogLevel::Info);
        assert_eq!(LogLevel::from(1), LogLevel::Debug);
        assert_eq!(LogLevel::from(2), LogLevel::Trace);
        assert_eq!(LogLevel::from(9), LogLevel::Trace);
    }

    #[test]
    fn test_level_conversion() {
        assert_eq!(Option::<Level>::from(LogLevel::Warn), Some(Level::WARN));
        assert_eq!(Option::<Level>::from(LogLevel::Off), None);
    }

    #[test]
    fn test_directives() {
        let config = LoggingConfig::new()
            .with_level(LogLevel::Debug)
            .with_default_level(LogLevel::Error);
        assert_eq!(config.directives(), "error,resilient_view=debug");
    }

    #[test]
    fn test_builder() {
        let config = LoggingConfig::from_verbosity(2)
            .with_timestamps(false)
            .with_target(false)
            .with_ansi(true);
        assert_eq!(config.level, LogLevel::Trace);
        assert!(!config.with_timestamps);
        assert!(!config.with_target);
        assert!(config.with_ansi);
    }

    #[test]
    fn test_second_init_is_harmless() {
        init_logging(LoggingConfig::new().with_level(LogLevel::Off));
        init_logging(LoggingConfig::new());
        assert!(try_init_logging(LoggingConfig::new()).is_err());
    }
}
