//! Shared types module
//!
//! This module contains shared data types and structures used throughout the application.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a forwarding rule
pub type ProxyId = u64;

/// Runtime status of a forwarding rule
///
/// Serialized as `0` (stopped) and `1` (started) to stay compatible with
/// existing rule files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum ProxyStatus {
    /// No listener bound
    #[default]
    Stopped,
    /// Listener bound and acceptor running
    Started,
}

impl From<ProxyStatus> for u8 {
    fn from(status: ProxyStatus) -> Self {
        match status {
            ProxyStatus::Stopped => 0,
            ProxyStatus::Started => 1,
        }
    }
}

impl From<u8> for ProxyStatus {
    fn from(value: u8) -> Self {
        if value == 0 {
            ProxyStatus::Stopped
        } else {
            ProxyStatus::Started
        }
    }
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyStatus::Stopped => write!(f, "stopped"),
            ProxyStatus::Started => write!(f, "started"),
        }
    }
}
