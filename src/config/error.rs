//! Configuration errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while layering or validating settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read
    #[error("Cannot read settings file {}: {source}", .path.display())]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The settings file is not a valid settings object
    #[error("Malformed settings file {}: {source}", .path.display())]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A single setting is out of range or unparsable
    #[error("Invalid value for '{0}': {1}")]
    InvalidValue(String, String),

    /// Two settings contradict each other
    #[error("Conflicting settings: {0}")]
    InvalidCombination(String),
}

impl ConfigError {
    /// Name of the offending setting, if the error concerns one
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidValue(name, _) => Some(name),
            _ => None,
        }
    }
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for crate::common::ProxyError {
    fn from(err: ConfigError) -> Self {
        crate::common::ProxyError::Config(err.to_string())
    }
}
