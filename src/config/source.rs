//! Configuration sources
//!
//! This module defines traits and implementations for loading configuration
//! from different sources.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, warn};

use crate::config::error::{ConfigError, Result};
use crate::config::types::{parse_socket_addr, AppConfig, ConfigValues, ValueSource};

/// Configuration source trait
pub trait ConfigSource {
    /// Load configuration from this source
    fn load(&self) -> Result<AppConfig>;

    /// Get the source type
    fn source_type(&self) -> ValueSource;
}

/// Default configuration source
pub struct DefaultSource;

impl ConfigSource for DefaultSource {
    fn load(&self) -> Result<AppConfig> {
        debug!("Loading default configuration");
        Ok(AppConfig::with_defaults())
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Default
    }
}

/// JSON settings file source
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    /// Create a new file source
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<AppConfig> {
        debug!("Loading configuration from file: {}", self.path.display());

        let contents = fs::read_to_string(&self.path)
            .map_err(|source| ConfigError::SettingsRead {
                path: self.path.clone(),
                source,
            })?;

        let values: ConfigValues = serde_json::from_str(&contents)
            .map_err(|source| ConfigError::SettingsParse {
                path: self.path.clone(),
                source,
            })?;

        Ok(AppConfig {
            values,
            settings_file: Some(self.path.clone()),
            sources: HashMap::new(),
        })
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::File
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Invalid {} in environment: {}", name, value);
            None
        }
    }
}

/// Environment variable configuration source
pub struct EnvSource {
    pub prefix: String,
}

impl EnvSource {
    /// Create a new environment source
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        env::var(format!("{}{}", self.prefix, name.to_uppercase())).ok()
    }
}

impl ConfigSource for EnvSource {
    fn load(&self) -> Result<AppConfig> {
        debug!("Loading configuration from environment variables with prefix: {}", self.prefix);

        let mut values = ConfigValues::default();

        if let Some(value) = self.var("listen") {
            match parse_socket_addr(&value) {
                Ok(addr) => values.listen = Some(addr),
                Err(_) => warn!("Invalid listen in environment: {}", value),
            }
        }
        if let Some(value) = self.var("config_file") {
            values.config_file = Some(PathBuf::from(value));
        }
        if let Some(value) = self.var("auto_start") {
            values.auto_start = parse_env("auto_start", &value);
        }
        if let Some(value) = self.var("log_level") {
            values.log_level = Some(value);
        }
        if let Some(value) = self.var("debug") {
            values.debug = parse_env("debug", &value);
        }
        if let Some(value) = self.var("static_dir") {
            values.static_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = self.var("buffer_size") {
            values.buffer_size = parse_env("buffer_size", &value);
        }
        if let Some(value) = self.var("connect_timeout") {
            values.connect_timeout = parse_env("connect_timeout", &value);
        }
        if let Some(value) = self.var("udp_idle_timeout") {
            values.udp_idle_timeout = parse_env("udp_idle_timeout", &value);
        }
        if let Some(value) = self.var("term_cols") {
            values.term_cols = parse_env("term_cols", &value);
        }
        if let Some(value) = self.var("term_rows") {
            values.term_rows = parse_env("term_rows", &value);
        }
        if let Some(value) = self.var("ssh_accept_any_host_key") {
            values.ssh_accept_any_host_key = parse_env("ssh_accept_any_host_key", &value);
        }
        if let Some(value) = self.var("ssh_host_key_fingerprints") {
            values.ssh_host_key_fingerprints = Some(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }

        Ok(AppConfig {
            values,
            settings_file: None,
            sources: HashMap::new(),
        })
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Environment
    }
}

/// Command line configuration source
///
/// Carries the values already parsed from the command line.
pub struct CliSource {
    pub values: ConfigValues,
}

impl CliSource {
    /// Create a new command line source
    pub fn new(values: ConfigValues) -> Self {
        Self { values }
    }
}

impl ConfigSource for CliSource {
    fn load(&self) -> Result<AppConfig> {
        debug!("Loading configuration from command line arguments");
        Ok(AppConfig {
            values: self.values.clone(),
            settings_file: None,
            sources: HashMap::new(),
        })
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::CommandLine
    }
}
