//! Control plane
//!
//! HTTP API for managing forwarding rules, the websocket endpoint for the
//! terminal bridge and optional static files for the web UI.
//!
//! # Architecture
//!
//! The control server runs in the main process on top of axum. Handlers
//! share one [`AppState`] holding the registry and the terminal bridge.

pub mod error;
pub mod handlers;
pub mod server;
pub mod types;
pub mod ws;

pub use error::{ControlError, ControlResult, ErrorResponse};
pub use server::{build_router, start_control_server, AppState, ControlServerConfig};
pub use types::{HealthResponse, OpResult, ProxyForm};
