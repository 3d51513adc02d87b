//! Configuration types
//!
//! This module contains the main configuration types used throughout the application.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};

use crate::common::log::effective_level;
use crate::config::defaults;
use crate::config::error::{ConfigError, Result};
use crate::proxy::RelaySettings;
use crate::terminal::{HostKeyPolicy, TerminalSettings};

/// Source of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSource {
    /// Default value
    Default,
    /// From the settings file
    File,
    /// From environment variable
    Environment,
    /// From command line argument
    CommandLine,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Default => write!(f, "default"),
            ValueSource::File => write!(f, "file"),
            ValueSource::Environment => write!(f, "environment"),
            ValueSource::CommandLine => write!(f, "command line"),
        }
    }
}

/// Custom deserializer for socket addresses
fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<Option<SocketAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
        Some(addr_str) => parse_socket_addr(&addr_str)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Parse a socket address string
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    // First try to parse as a socket address
    if let Ok(addr) = addr.parse::<SocketAddr>() {
        return Ok(addr);
    }

    // If that fails, try to resolve using ToSocketAddrs
    match addr.to_socket_addrs() {
        Ok(mut addrs) => addrs.next().ok_or_else(|| {
            ConfigError::InvalidValue("listen".to_string(), format!("Could not resolve address: {}", addr))
        }),
        Err(e) => Err(ConfigError::InvalidValue(
            "listen".to_string(),
            format!("Invalid socket address '{}': {}", addr, e),
        )),
    }
}

/// Configuration values
///
/// Every field is optional so that each source only carries what it sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigValues {
    /// Control-plane listen address (host:port)
    #[serde(default, deserialize_with = "deserialize_socket_addr")]
    pub listen: Option<SocketAddr>,

    /// Rule file
    #[serde(default)]
    pub config_file: Option<PathBuf>,

    /// Start loaded rules at startup
    #[serde(default)]
    pub auto_start: Option<bool>,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default)]
    pub log_level: Option<String>,

    /// Verbose logging
    #[serde(default)]
    pub debug: Option<bool>,

    /// Directory served at `/`
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    /// Relay chunk size in bytes
    #[serde(default)]
    pub buffer_size: Option<usize>,

    /// Remote dial timeout in seconds
    #[serde(default)]
    pub connect_timeout: Option<u64>,

    /// UDP session idle timeout in seconds
    #[serde(default)]
    pub udp_idle_timeout: Option<u64>,

    /// PTY width
    #[serde(default)]
    pub term_cols: Option<u32>,

    /// PTY height
    #[serde(default)]
    pub term_rows: Option<u32>,

    /// Accept any SSH host key
    #[serde(default)]
    pub ssh_accept_any_host_key: Option<bool>,

    /// SHA-256 host key fingerprints accepted when not permissive
    #[serde(default)]
    pub ssh_host_key_fingerprints: Option<Vec<String>>,
}

/// Application configuration
///
/// Values plus the source each one came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Configuration values
    pub values: ConfigValues,

    /// Settings file the values were read from
    pub settings_file: Option<PathBuf>,

    /// Source tracking for configuration values
    pub sources: HashMap<String, ValueSource>,
}

impl AppConfig {
    /// Configuration holding every default value
    pub fn with_defaults() -> Self {
        let mut config = Self::default();
        config.set_default_values();
        config
    }

    /// Set default values for all configuration options that are still unset
    pub fn set_default_values(&mut self) {
        macro_rules! default_field {
            ($name:ident, $value:expr) => {
                if self.values.$name.is_none() {
                    self.values.$name = Some($value);
                    self.sources.insert(stringify!($name).to_string(), ValueSource::Default);
                }
            };
        }

        default_field!(listen, defaults::listen());
        default_field!(config_file, defaults::config_file());
        default_field!(auto_start, defaults::auto_start());
        default_field!(log_level, defaults::log_level());
        default_field!(debug, false);
        default_field!(buffer_size, defaults::buffer_size());
        default_field!(connect_timeout, defaults::connect_timeout());
        default_field!(udp_idle_timeout, defaults::udp_idle_timeout());
        default_field!(term_cols, defaults::term_cols());
        default_field!(term_rows, defaults::term_rows());
        default_field!(ssh_accept_any_host_key, defaults::ssh_accept_any_host_key());
        default_field!(ssh_host_key_fingerprints, Vec::new());
    }

    /// Merge `other` over `self`, recording `source` for every value it sets
    pub fn merge(&self, other: &AppConfig, source: ValueSource) -> Self {
        let mut result = self.clone();

        macro_rules! merge_field {
            ($name:ident) => {
                if other.values.$name.is_some() {
                    result.values.$name = other.values.$name.clone();
                    result.sources.insert(stringify!($name).to_string(), source);
                }
            };
        }

        merge_field!(listen);
        merge_field!(config_file);
        merge_field!(auto_start);
        merge_field!(log_level);
        merge_field!(debug);
        merge_field!(static_dir);
        merge_field!(buffer_size);
        merge_field!(connect_timeout);
        merge_field!(udp_idle_timeout);
        merge_field!(term_cols);
        merge_field!(term_rows);
        merge_field!(ssh_accept_any_host_key);
        merge_field!(ssh_host_key_fingerprints);

        if let Some(path) = &other.settings_file {
            result.settings_file = Some(path.clone());
        }

        result
    }

    /// Get the source of a configuration value
    pub fn source(&self, name: &str) -> String {
        self.sources
            .get(name)
            .map(|source| source.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Get the control-plane listen address
    pub fn listen(&self) -> SocketAddr {
        self.values.listen.unwrap_or_else(defaults::listen)
    }

    /// Get the rule file as configured
    pub fn config_file(&self) -> &Path {
        self.values
            .config_file
            .as_deref()
            .unwrap_or_else(|| Path::new(defaults::DEFAULT_CONFIG_FILE))
    }

    /// Rule file with relative paths resolved against `base_dir`
    pub fn resolve_config_file(&self, base_dir: &Path) -> PathBuf {
        let path = self.config_file();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Whether loaded rules are started
    pub fn auto_start(&self) -> bool {
        self.values.auto_start.unwrap_or_else(defaults::auto_start)
    }

    /// Get the configured log level
    pub fn log_level(&self) -> &str {
        self.values.log_level.as_deref().unwrap_or(defaults::LOG_LEVEL_STR)
    }

    /// Whether verbose logging is on
    pub fn debug(&self) -> bool {
        self.values.debug.unwrap_or(false)
    }

    /// Log level after applying the debug flag
    pub fn effective_log_level(&self) -> &str {
        effective_level(self.log_level(), self.debug())
    }

    /// Get the static file directory
    pub fn static_dir(&self) -> Option<&Path> {
        self.values.static_dir.as_deref()
    }

    /// Get the relay chunk size
    pub fn buffer_size(&self) -> usize {
        self.values.buffer_size.unwrap_or_else(defaults::buffer_size)
    }

    /// Get the remote dial timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.values.connect_timeout.unwrap_or_else(defaults::connect_timeout))
    }

    /// Get the UDP session idle timeout
    pub fn udp_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.values.udp_idle_timeout.unwrap_or_else(defaults::udp_idle_timeout))
    }

    /// Get the PTY width
    pub fn term_cols(&self) -> u32 {
        self.values.term_cols.unwrap_or_else(defaults::term_cols)
    }

    /// Get the PTY height
    pub fn term_rows(&self) -> u32 {
        self.values.term_rows.unwrap_or_else(defaults::term_rows)
    }

    /// Whether any SSH host key is accepted
    pub fn ssh_accept_any_host_key(&self) -> bool {
        self.values
            .ssh_accept_any_host_key
            .unwrap_or_else(defaults::ssh_accept_any_host_key)
    }

    /// Get the SSH host key allow-list
    pub fn ssh_host_key_fingerprints(&self) -> &[String] {
        self.values.ssh_host_key_fingerprints.as_deref().unwrap_or(&[])
    }

    /// Relay tuning for the registry
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            buffer_size: self.buffer_size(),
            connect_timeout: self.connect_timeout(),
            udp_idle_timeout: self.udp_idle_timeout(),
        }
    }

    /// Settings for terminal bridge sessions
    pub fn terminal_settings(&self) -> TerminalSettings {
        let host_key_policy = if self.ssh_accept_any_host_key() {
            HostKeyPolicy::AcceptAny
        } else {
            HostKeyPolicy::AllowList(self.ssh_host_key_fingerprints().to_vec())
        };

        TerminalSettings {
            connect_timeout: self.connect_timeout(),
            cols: self.term_cols(),
            rows: self.term_rows(),
            host_key_policy,
        }
    }

    /// Log the configuration
    pub fn log(&self) {
        debug!("=== Configuration ===");
        debug!("  Listen address: {} (from {})", self.listen(), self.source("listen"));
        debug!("  Rule file: {} (from {})", self.config_file().display(), self.source("config_file"));
        debug!("  Auto start: {} (from {})", self.auto_start(), self.source("auto_start"));
        debug!("  Log level: {} (from {})", self.log_level(), self.source("log_level"));
        debug!("  Debug: {} (from {})", self.debug(), self.source("debug"));

        if let Some(dir) = self.static_dir() {
            debug!("  Static directory: {} (from {})", dir.display(), self.source("static_dir"));
        }

        debug!("  Buffer size: {} bytes (from {})", self.buffer_size(), self.source("buffer_size"));
        debug!("  Connect timeout: {:?} (from {})", self.connect_timeout(), self.source("connect_timeout"));
        debug!("  UDP idle timeout: {:?} (from {})", self.udp_idle_timeout(), self.source("udp_idle_timeout"));
        debug!("  Terminal: {}x{}", self.term_cols(), self.term_rows());
        debug!(
            "  Accept any SSH host key: {} (from {})",
            self.ssh_accept_any_host_key(),
            self.source("ssh_accept_any_host_key")
        );
        debug!("  SSH host key fingerprints: {}", self.ssh_host_key_fingerprints().len());

        if let Some(file) = &self.settings_file {
            debug!("  Settings file: {}", file.display());
        }

        debug!("=====================");
    }
}
