//! Terminal bridge module
//!
//! This module bridges a duplex control channel, usually a websocket from
//! the browser, to an SSH or telnet session on a rule's remote endpoint.

mod backend;
mod bridge;
mod channel;
mod credentials;
mod ssh;
mod telnet;

pub use backend::{backend_for, TerminalBackend, TerminalSettings, TerminalTarget, DEFAULT_TERM_COLS, DEFAULT_TERM_ROWS};
pub use bridge::TerminalBridge;
pub use channel::{ControlChannel, ControlPeer, ControlReader, ControlWriter, Outbound, OutputKind};
pub use credentials::{collect_credentials, prompt_field, Credentials, PROMPT_PASSWORD, PROMPT_USER};
pub use ssh::{fingerprint, HostKeyPolicy, SshBackend};
pub use telnet::{escape_iac, TelnetBackend, TelnetFilter};
