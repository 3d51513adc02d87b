//! Configuration builder
//!
//! This module provides a builder pattern for constructing configuration.

use std::path::Path;

use log::debug;

use crate::config::error::Result;
use crate::config::source::{CliSource, ConfigSource, DefaultSource, EnvSource, FileSource};
use crate::config::types::{AppConfig, ConfigValues};
use crate::config::validator::validate_config;

/// Configuration builder
///
/// Provides a fluent API for building configuration from multiple sources.
/// Sources are applied in the order they are added, later ones winning.
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    validate: bool,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            validate: true,
        }
    }

    /// Add default source
    pub fn with_defaults(mut self) -> Self {
        debug!("Adding default configuration source");
        self.sources.push(Box::new(DefaultSource));
        self
    }

    /// Add settings file source
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        debug!("Adding file configuration source: {}", path.display());
        self.sources.push(Box::new(FileSource::new(path)));
        self
    }

    /// Add environment source
    pub fn with_env(mut self, prefix: &str) -> Self {
        debug!("Adding environment configuration source with prefix: {}", prefix);
        self.sources.push(Box::new(EnvSource::new(prefix)));
        self
    }

    /// Add command line source
    pub fn with_cli(mut self, values: ConfigValues) -> Self {
        debug!("Adding command line configuration source");
        self.sources.push(Box::new(CliSource::new(values)));
        self
    }

    /// Disable validation
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a source fails to load or validation fails
    pub fn build(self) -> Result<AppConfig> {
        let mut config = AppConfig::default();

        debug!("Building configuration from {} sources", self.sources.len());

        for source in self.sources {
            let source_type = source.source_type();
            debug!("Loading configuration from source: {:?}", source_type);

            let source_config = source.load()?;
            config = config.merge(&source_config, source_type);
        }

        config.set_default_values();

        if self.validate {
            debug!("Validating configuration");
            validate_config(&config)?;
        }

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ValueSource;
    use std::fs;

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"buffer_size": 8192, "term_cols": 100}"#).unwrap();

        let cli = ConfigValues {
            buffer_size: Some(1024),
            ..Default::default()
        };

        let config = ConfigBuilder::new()
            .with_defaults()
            .with_file(&path)
            .with_cli(cli)
            .build()
            .unwrap();

        assert_eq!(config.buffer_size(), 1024);
        assert_eq!(config.sources.get("buffer_size"), Some(&ValueSource::CommandLine));
        assert_eq!(config.term_cols(), 100);
        assert_eq!(config.sources.get("term_cols"), Some(&ValueSource::File));
        assert_eq!(config.term_rows(), 40);
        assert_eq!(config.settings_file.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_validation_can_be_skipped() {
        let cli = ConfigValues {
            buffer_size: Some(0),
            ..Default::default()
        };

        assert!(ConfigBuilder::new().with_cli(cli.clone()).build().is_err());
        let config = ConfigBuilder::new().with_cli(cli).without_validation().build().unwrap();
        assert_eq!(config.buffer_size(), 0);
    }
}
