//! Configuration loading and management
//!
//! This module handles loading configuration from files and environment variables.

use std::path::Path;

use tracing::{debug, info};

use super::types::{Config, OperatingMode};
use crate::error::ConfigError;

/// Load configuration from a JSON file
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed.
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
        "Configuration loaded: mode={}, gate={}s+{}s",
        config.mode, config.gate.budget_secs, config.gate.stall_secs
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
/// - `POLICY_ROUTER_MODE`: Override operating mode
/// - `POLICY_ROUTER_LOG_LEVEL`: Override log level
/// - `POLICY_ROUTER_GATE_BUDGET_SECS`: Override the retry gate polling window
/// - `POLICY_ROUTER_GATE_STALL_SECS`: Override the retry gate stall
///
/// # Errors
///
/// Returns `ConfigError` if loading or parsing fails.
pub fn load_config_with_env(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let config = load_config(path)?;
    apply_env_overrides(config)
}

/// Apply environment overrides to an already loaded configuration
///
/// # Errors
///
/// Returns `ConfigError::EnvError` for unparsable values, or a validation
/// error if the overridden configuration is invalid.
pub fn apply_env_overrides(mut config: Config) -> Result<Config, ConfigError> {
    if let Ok(mode) = std::env::var("POLICY_ROUTER_MODE") {
        config.mode = OperatingMode::parse(&mode).map_err(|_| ConfigError::EnvError {
            name: "POLICY_ROUTER_MODE".into(),
            reason: format!("Invalid mode: {mode}"),
        })?;
        debug!("Mode overridden to {}", config.mode);
    }

    if let Ok(level) = std::env::var("POLICY_ROUTER_LOG_LEVEL") {
        config.log.level = level;
        debug!("Log level overridden to {}", config.log.level);
    }

    if let Ok(secs) = std::env::var("POLICY_ROUTER_GATE_BUDGET_SECS") {
        config.gate.budget_secs = secs.parse().map_err(|_| ConfigError::EnvError {
            name: "POLICY_ROUTER_GATE_BUDGET_SECS".into(),
            reason: format!("Invalid number: {secs}"),
        })?;
        debug!("Gate budget overridden to {}s", config.gate.budget_secs);
    }

    if let Ok(secs) = std::env::var("POLICY_ROUTER_GATE_STALL_SECS") {
        config.gate.stall_secs = secs.parse().map_err(|_| ConfigError::EnvError {
            name: "POLICY_ROUTER_GATE_STALL_SECS".into(),
            reason: format!("Invalid number: {secs}"),
        })?;
        debug!("Gate stall overridden to {}s", config.gate.stall_secs);
    }

    // Re-validate after overrides
    config.validate()?;

    Ok(config)
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
