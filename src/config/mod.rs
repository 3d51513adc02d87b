//! Configuration module
//!
//! This module handles application configuration, including loading from
//! different sources (defaults, a JSON settings file, environment variables,
//! command line arguments) and validating the result.

mod builder;
pub mod defaults;
mod error;
mod source;
mod types;
mod validator;

pub use builder::ConfigBuilder;
pub use defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use error::{ConfigError, Result};
pub use source::{CliSource, ConfigSource, DefaultSource, EnvSource, FileSource};
pub use types::{parse_socket_addr, AppConfig, ConfigValues, ValueSource};
pub use validator::validate_config;
