//! Configuration loading and management
//!
//! This module handles loading configuration from files and environment variables.

use std::path::Path;

use tracing::{debug, info};

use super::types::Config;
use crate::error::ConfigError;

/// Environment variable overriding `dns.listen`
pub const ENV_LISTEN_ADDR: &str = "TUN_DNS_LISTEN_ADDR";
/// Environment variable overriding `log.level`
pub const ENV_LOG_LEVEL: &str = "TUN_DNS_LOG_LEVEL";
/// Environment variable overriding `dns.mode`
pub const ENV_MODE: &str = "TUN_DNS_MODE";
/// Environment variable overriding `dns.upstream`
pub const ENV_UPSTREAM: &str = "TUN_DNS_UPSTREAM";

/// Load configuration from a JSON file
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed or validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| {
        ConfigError::ParseError(format!("Failed to parse JSON: {e} at {path:?}"))
    })?;

    config.validate()?;

    info!(
        mode = %config.dns.mode,
        listen = %config.dns.listen,
        range = %config.dns.virtual_range,
        "Configuration loaded"
    );

    Ok(config)
}

/// Load configuration from a JSON string
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(json: &str) -> Result<Config, ConfigError> {
    let config: Config =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;

    Ok(config)
}

/// Load configuration with environment variable overrides
///
/// Environment variables:
/// - `TUN_DNS_LISTEN_ADDR`: Override DNS listen address
/// - `TUN_DNS_LOG_LEVEL`: Override log level
/// - `TUN_DNS_MODE`: Override DNS mode (`virtual` or `upstream`)
/// - `TUN_DNS_UPSTREAM`: Override upstream resolver
///
/// # Errors
///
/// Returns `ConfigError` if loading, parsing or an override fails.
pub fn load_config_with_env(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

/// Apply overrides looked up through `lookup`, then re-validate
fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = lookup(ENV_LISTEN_ADDR) {
        config.dns.listen = addr;
        config.dns.listen_endpoint().map_err(|e| ConfigError::EnvError {
            name: ENV_LISTEN_ADDR.into(),
            reason: e.to_string(),
        })?;
        debug!("Listen address overridden to {}", config.dns.listen);
    }

    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.log.level = level;
        debug!("Log level overridden to {}", config.log.level);
    }

    if let Some(mode) = lookup(ENV_MODE) {
        config.dns.mode = mode.parse().map_err(|_| ConfigError::EnvError {
            name: ENV_MODE.into(),
            reason: format!("Invalid DNS mode: {mode}"),
        })?;
        debug!("DNS mode overridden to {}", config.dns.mode);
    }

    if let Some(upstream) = lookup(ENV_UPSTREAM) {
        config.dns.upstream = upstream;
        debug!("Upstream overridden to {}", config.dns.upstream);
    }

    // Re-validate after overrides
    config.validate()
}

/// Create a default configuration file at the given path
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be written.
pub fn create_default_config(path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let config = Config::default_config();
    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {e}")))?;

    std::fs::write(path, json)?;
    Ok(())
}
