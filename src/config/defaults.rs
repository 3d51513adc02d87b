//! Default configuration values
//!
//! This module provides default values for configuration options.
//! It is designed to be a single source of truth for defaults,
//! making it easier to maintain consistent defaults across the application.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::proxy::{DEFAULT_BUFFER_SIZE, DEFAULT_CONNECT_TIMEOUT, DEFAULT_UDP_IDLE_TIMEOUT};
use crate::terminal::{DEFAULT_TERM_COLS, DEFAULT_TERM_ROWS};

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "LCX_";

/// Default rule file name
pub const DEFAULT_CONFIG_FILE: &str = "proxy_config.json";

/// Default control-plane listen address as string
pub const LISTEN_STR: &str = "0.0.0.0:8210";

/// Default control-plane port
pub const LISTEN_PORT: u16 = 8210;

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Log levels accepted by the logger
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Default control-plane listen address
pub fn listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), LISTEN_PORT)
}

/// Default rule file
pub fn config_file() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Start loaded rules by default
pub fn auto_start() -> bool {
    true
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default relay chunk size (4KB)
pub fn buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

/// Default remote dial timeout in seconds
pub fn connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

/// Default UDP session idle timeout in seconds
pub fn udp_idle_timeout() -> u64 {
    DEFAULT_UDP_IDLE_TIMEOUT.as_secs()
}

/// Default PTY width
pub fn term_cols() -> u32 {
    DEFAULT_TERM_COLS
}

/// Default PTY height
pub fn term_rows() -> u32 {
    DEFAULT_TERM_ROWS
}

/// Accept any SSH host key by default
pub fn ssh_accept_any_host_key() -> bool {
    true
}
