//! Proxy service module
//!
//! This module implements the forwarding engine: rule definitions, the
//! per-rule state machine, the accept loops for tcp, udp and unix rules,
//! relay sessions and the registry that owns them all.

mod acceptor;
mod forwarder;
mod instance;
mod listener;
mod registry;
mod rule;
mod session;
mod store;
mod udp;

pub use acceptor::{
    AcceptorHandle, RelaySettings, DEFAULT_BUFFER_SIZE, DEFAULT_CONNECT_TIMEOUT, DEFAULT_UDP_IDLE_TIMEOUT,
};
pub use forwarder::relay_session;
pub use instance::ProxyInstance;
pub use listener::Listener;
pub use registry::{Action, ModifyOutcome, ProxyRegistry};
pub use rule::{ProxyDefinition, ProxyRecord, TermType};
pub use session::{SessionCounter, SessionGuard};
