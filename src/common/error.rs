//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use thiserror::Error;
use std::io;

use super::types::ProxyId;

/// lcx-proxy error type
///
/// Every variant is scoped to the operation or session that produced it;
/// none of them is fatal to the process.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Listener creation failed while starting a rule
    #[error("Failed to listen on {protocol} {addr}: {source}")]
    Bind {
        /// Protocol of the rule
        protocol: String,
        /// Local address that could not be bound
        addr: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Remote endpoint unreachable
    #[error("Failed to dial {protocol} {addr}: {source}")]
    Dial {
        /// Protocol of the rule
        protocol: String,
        /// Remote address
        addr: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Read or write failure in the middle of a relay session
    #[error("Relay error: {0}")]
    Relay(#[source] io::Error),

    /// Malformed rule definition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown rule id
    #[error("Proxy {0} not exist")]
    NotFound(ProxyId),

    /// SSH/Telnet dial, authentication or session failure
    #[error("Terminal bridge error: {0}")]
    Bridge(String),

    /// Saving or loading the rule file failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl From<russh::Error> for ProxyError {
    fn from(err: russh::Error) -> Self {
        ProxyError::Bridge(err.to_string())
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let proxy_err: ProxyError = io_err.into();

        match proxy_err {
            ProxyError::Io(_) => {}
            _ => panic!("Should convert to IO error"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = ProxyError::NotFound(99);
        assert_eq!(err.to_string(), "Proxy 99 not exist");

        let err = ProxyError::Bind {
            protocol: "tcp".to_string(),
            addr: "127.0.0.1:9000".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };
        let err_str = err.to_string();
        assert!(err_str.contains("tcp"));
        assert!(err_str.contains("127.0.0.1:9000"));
        assert!(err_str.contains("address in use"));
    }
}
