//! Configuration management for docsync
//!
//! Environment-based configuration with defaults, TOML files and validation.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sync provider timers and fan-out
    pub provider: ProviderConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Sync provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Period of the broadcast step-1 resync
    #[serde(with = "humantime_serde")]
    pub resync_interval: Duration,

    /// Delay between the end of one ping sweep and the start of the next
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,

    /// Maximum simultaneous publishes during fan-out
    pub fanout_concurrency: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus exporter
    pub enabled: bool,

    /// Prometheus scrape endpoint
    pub bind_address: SocketAddr,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(30),
            ping_interval: Duration::from_secs(30),
            fanout_concurrency: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
        }
    }
}

/// Parse a humantime duration such as `30s` or `1m 30s`
pub fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| ConfigError::invalid(key, e))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    value.parse().map_err(|e| ConfigError::invalid(key, e))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: DOCSYNC_<SECTION>_<KEY>
    /// Example: DOCSYNC_PROVIDER_PING_INTERVAL=10s
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay DOCSYNC_* variables onto this configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        // Provider config
        if let Some(v) = var("DOCSYNC_PROVIDER_RESYNC_INTERVAL") {
            self.provider.resync_interval = parse_duration("resync interval", &v)?;
        }
        if let Some(v) = var("DOCSYNC_PROVIDER_PING_INTERVAL") {
            self.provider.ping_interval = parse_duration("ping interval", &v)?;
        }
        if let Some(v) = var("DOCSYNC_PROVIDER_FANOUT_CONCURRENCY") {
            self.provider.fanout_concurrency = v
                .parse()
                .map_err(|e| ConfigError::invalid("fan-out concurrency", e))?;
        }

        // Logging config
        if let Some(v) = var("DOCSYNC_LOGGING_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = var("DOCSYNC_LOGGING_JSON_FORMAT") {
            self.logging.json_format = parse_bool("JSON flag", &v)?;
        }

        // Metrics config
        if let Some(v) = var("DOCSYNC_METRICS_ENABLED") {
            self.metrics.enabled = parse_bool("metrics flag", &v)?;
        }
        if let Some(v) = var("DOCSYNC_METRICS_BIND_ADDRESS") {
            self.metrics.bind_address = v
                .parse()
                .map_err(|e| ConfigError::invalid("metrics address", e))?;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.resync_interval.is_zero() {
            return Err(ConfigError::Validation(
                "resync_interval must be greater than 0".to_string(),
            ));
        }

        if self.provider.ping_interval.is_zero() {
            return Err(ConfigError::Validation(
                "ping_interval must be greater than 0".to_string(),
            ));
        }

        if self.provider.fanout_concurrency == 0 {
            return Err(ConfigError::Validation(
                "fanout_concurrency must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;

        let path = path.as_ref();
        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}
