//! Terminal backends
//!
//! A backend turns a control channel into an interactive session on a
//! rule's remote endpoint.

use std::time::Duration;

use async_trait::async_trait;

use crate::common::{Protocol, ProxyId, Result};
use crate::proxy::{ProxyDefinition, TermType};
use super::channel::{ControlReader, ControlWriter};
use super::ssh::{HostKeyPolicy, SshBackend};
use super::telnet::TelnetBackend;

/// Default PTY width
pub const DEFAULT_TERM_COLS: u32 = 120;

/// Default PTY height
pub const DEFAULT_TERM_ROWS: u32 = 40;

/// Settings shared by all bridge sessions
#[derive(Debug, Clone)]
pub struct TerminalSettings {
    /// Timeout for dialing the remote endpoint
    pub connect_timeout: Duration,
    /// PTY width in columns
    pub cols: u32,
    /// PTY height in rows
    pub rows: u32,
    /// How SSH server keys are checked
    pub host_key_policy: HostKeyPolicy,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            cols: DEFAULT_TERM_COLS,
            rows: DEFAULT_TERM_ROWS,
            host_key_policy: HostKeyPolicy::AcceptAny,
        }
    }
}

/// Endpoint a bridge session connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalTarget {
    /// Rule the session belongs to
    pub id: ProxyId,
    /// Stream protocol used for the dial
    pub protocol: Protocol,
    /// Remote address of the rule
    pub addr: String,
}

impl From<&ProxyDefinition> for TerminalTarget {
    fn from(definition: &ProxyDefinition) -> Self {
        Self {
            id: definition.id,
            protocol: definition.protocol,
            addr: definition.remote_addr(),
        }
    }
}

/// An interactive session protocol
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// Protocol name for logs
    fn name(&self) -> &'static str;

    /// Run a session until it ends
    ///
    /// The caller reports errors on the channel and closes it afterwards.
    async fn run(&self, target: &TerminalTarget, reader: ControlReader, writer: ControlWriter) -> Result<()>;
}

/// Backend for a rule's terminal type, `None` for [`TermType::None`]
pub fn backend_for(term_type: TermType, settings: &TerminalSettings) -> Option<Box<dyn TerminalBackend>> {
    match term_type {
        TermType::Ssh => Some(Box::new(SshBackend::new(settings.clone()))),
        TermType::Telnet => Some(Box::new(TelnetBackend::new(settings.connect_timeout))),
        TermType::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_dispatch() {
        let settings = TerminalSettings::default();
        assert_eq!(backend_for(TermType::Ssh, &settings).unwrap().name(), "ssh");
        assert_eq!(backend_for(TermType::Telnet, &settings).unwrap().name(), "telnet");
        assert!(backend_for(TermType::None, &settings).is_none());
    }

    #[test]
    fn test_target_uses_remote_endpoint() {
        let definition = ProxyDefinition {
            id: 4,
            ..ProxyDefinition::new("0.0.0.0", 2222, "10.1.1.1", 22)
        };
        let target = TerminalTarget::from(&definition);
        assert_eq!(target.addr, "10.1.1.1:22");
        assert_eq!(target.protocol, Protocol::Tcp);
    }
}
