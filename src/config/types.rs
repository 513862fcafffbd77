//! Configuration types

use serde::{Deserialize, Serialize};

use crate::dns::DnsConfig;
use crate::error::ConfigError;

/// Log levels accepted in `log.level`
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// DNS interception settings
    #[serde(default)]
    pub dns: DnsConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if any section is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dns
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        self.log.validate()
    }

    /// Create a default configuration
    #[must_use]
    pub fn default_config() -> Self {
        Self::default()
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Include target (module path)
    #[serde(default = "default_true")]
    pub target: bool,
}

impl LogConfig {
    /// Validate the logging configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for an unknown level or format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}",
                self.level
            )));
        }

        if self.format != "json" && self.format != "text" {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log format: {} (expected json or text)",
                self.format
            )));
        }

        Ok(())
    }

    /// Whether output is JSON
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: true,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DnsMode;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.dns.mode, DnsMode::Virtual);
        assert!(!config.log.is_json());
    }

    #[test]
    fn test_log_config_validation() {
        let mut log = LogConfig::default();
        log.level = "DEBUG".into();
        assert!(log.validate().is_ok());

        log.level = "verbose".into();
        assert!(matches!(log.validate(), Err(ConfigError::ValidationError(_))));

        let log = LogConfig {
            format: "xml".into(),
            ..LogConfig::default()
        };
        assert!(log.validate().is_err());
    }

    #[test]
    fn test_invalid_dns_section() {
        let mut config = Config::default_config();
        config.dns.max_entries = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("max_entries")
        ));
    }

    #[test]
    fn test_empty_sections_use_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default_config());
    }
}
