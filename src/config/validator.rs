//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use crate::config::defaults::LOG_LEVELS;
use crate::config::error::{ConfigError, Result};
use crate::config::types::AppConfig;

/// Validate the configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    validate_general_settings(config)?;
    validate_relay_settings(config)?;
    validate_terminal_settings(config)?;

    Ok(())
}

/// Validate general settings
fn validate_general_settings(config: &AppConfig) -> Result<()> {
    let level = config.log_level();
    if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        return Err(ConfigError::InvalidValue(
            "log_level".to_string(),
            format!("Unknown log level '{}', expected one of {}", level, LOG_LEVELS.join(", ")),
        ));
    }

    if let Some(dir) = config.static_dir() {
        if !dir.is_dir() {
            return Err(ConfigError::InvalidValue(
                "static_dir".to_string(),
                format!("Static directory does not exist or is not a directory: {}", dir.display()),
            ));
        }
    }

    Ok(())
}

/// Validate relay settings
fn validate_relay_settings(config: &AppConfig) -> Result<()> {
    if config.buffer_size() == 0 {
        return Err(ConfigError::InvalidValue(
            "buffer_size".to_string(),
            "Buffer size must be greater than 0".to_string(),
        ));
    }

    if config.connect_timeout().is_zero() {
        return Err(ConfigError::InvalidValue(
            "connect_timeout".to_string(),
            "Connect timeout must be greater than 0".to_string(),
        ));
    }

    if config.udp_idle_timeout().is_zero() {
        return Err(ConfigError::InvalidValue(
            "udp_idle_timeout".to_string(),
            "UDP idle timeout must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate terminal settings
fn validate_terminal_settings(config: &AppConfig) -> Result<()> {
    if config.term_cols() == 0 || config.term_rows() == 0 {
        return Err(ConfigError::InvalidValue(
            "term_cols/term_rows".to_string(),
            "Terminal geometry must be greater than 0".to_string(),
        ));
    }

    if !config.ssh_accept_any_host_key() && config.ssh_host_key_fingerprints().is_empty() {
        return Err(ConfigError::InvalidCombination(
            "ssh_accept_any_host_key is false but no ssh_host_key_fingerprints are configured".to_string(),
        ));
    }

    Ok(())
}
