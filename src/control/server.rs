//! Control-plane HTTP server
//!
//! Sets up the axum router for the rule API, the websocket endpoint and
//! optional static files.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use http::Method;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::common::{ProxyError, Result};
use crate::control::{handlers, ws};
use crate::proxy::ProxyRegistry;
use crate::terminal::TerminalBridge;

/// State shared by every handler
#[derive(Debug, Clone)]
pub struct AppState {
    /// Rule registry
    pub registry: Arc<ProxyRegistry>,
    /// Terminal bridge over the same registry
    pub bridge: TerminalBridge,
    /// Rule file written by `op=save`
    pub config_file: PathBuf,
}

impl AppState {
    /// Create handler state
    pub fn new(registry: Arc<ProxyRegistry>, bridge: TerminalBridge, config_file: PathBuf) -> Self {
        Self {
            registry,
            bridge,
            config_file,
        }
    }
}

/// Control server configuration
#[derive(Debug, Clone)]
pub struct ControlServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,
    /// Directory served at `/`
    pub static_dir: Option<PathBuf>,
}

/// Build the application router with all routes
pub fn build_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let lcx = Router::new()
        .route("/", get(handlers::list_proxies))
        .route("/proxylist", get(handlers::list_proxies))
        .route("/defaultip", get(handlers::default_ip))
        .route("/proxy", get(handlers::get_proxy).delete(handlers::delete_proxy))
        .route("/proxy/add", get(handlers::add_proxy_form).post(handlers::add_proxy))
        .route("/proxy/modify", get(handlers::modify_proxy_form).post(handlers::modify_proxy))
        .route("/proxy/op", get(handlers::proxy_op));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(Any);

    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/lcx", lcx)
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}

/// Start the control HTTP server
///
/// Serves until the returned future is dropped or the listener fails.
///
/// # Errors
///
/// Returns `ProxyError::Bind` when the listen address cannot be bound.
pub async fn start_control_server(config: ControlServerConfig, state: AppState) -> Result<()> {
    let app = build_router(state, config.static_dir);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .map_err(|source| ProxyError::Bind {
            protocol: "tcp".to_string(),
            addr: config.listen_addr.to_string(),
            source,
        })?;
    log::info!("Control server listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| ProxyError::Other(format!("Control server failed: {}", e)))?;

    Ok(())
}
