//! lcx-proxy: port-forwarding manager with a terminal bridge
//!
//! This library manages a set of forwarding rules. Each rule binds a local
//! tcp, udp or unix-domain endpoint and relays every accepted connection to
//! a remote endpoint. Rules are added, modified, started, stopped and
//! deleted at runtime through [`ProxyRegistry`] and persisted to a JSON file.
//!
//! # Main Features
//!
//! - Runtime-managed tcp, udp and unix-domain forwarding rules
//! - Per-rule session counting
//! - SSH and telnet terminal bridge over a duplex control channel
//! - HTTP and websocket control plane
//!
//! # Example
//!
//! ```no_run
//! use lcx_proxy::{ProxyDefinition, ProxyRegistry, RelaySettings, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let registry = ProxyRegistry::new(RelaySettings::default());
//!
//!     // Forward local port 2222 to an SSH server
//!     let id = registry
//!         .add(ProxyDefinition::new("0.0.0.0", 2222, "10.0.0.5", 22))
//!         .await?;
//!     registry.start(id).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod control;
pub mod proxy;
pub mod terminal;

// Re-export commonly used structures and functions for convenience
pub use common::{Protocol, ProxyError, ProxyId, ProxyStatus, Result};
pub use config::{AppConfig, ConfigBuilder};
pub use proxy::{Action, ProxyDefinition, ProxyRecord, ProxyRegistry, RelaySettings, TermType};
pub use terminal::TerminalBridge;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
