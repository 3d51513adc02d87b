//! Common module
//!
//! This module contains shared types, errors, and utility functions used throughout the application.

pub mod error;
pub mod join;
pub mod log;
pub mod net;
pub mod types;

// Re-export commonly used types and functions
pub use error::{ProxyError, Result};
pub use join::{first_completion, Finished};
pub use log::init_logger;
pub use net::{Connection, Protocol};
pub use types::{ProxyId, ProxyStatus};
