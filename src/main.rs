//! lcx-proxy command line tool
//!
//! Loads the configuration and the persisted rules, then serves the control
//! plane until SIGINT or SIGTERM.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use lcx_proxy::common::{init_logger, Result};
use lcx_proxy::config::{parse_socket_addr, ConfigBuilder, ConfigValues, ENV_PREFIX};
use lcx_proxy::control::{start_control_server, AppState, ControlServerConfig};
use lcx_proxy::{ProxyRegistry, TerminalBridge, APP_NAME, VERSION};

/// Port-forwarding manager with a browser-reachable SSH/Telnet terminal bridge
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Control-plane listen address (host:port)
    #[clap(short, long)]
    listen: Option<String>,

    /// Rule file; relative paths resolve against the executable's directory
    #[clap(short, long)]
    config_file: Option<PathBuf>,

    /// JSON settings file
    #[clap(long)]
    settings: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[clap(long)]
    log_level: Option<String>,

    /// Verbose logging
    #[clap(short, long)]
    debug: bool,

    /// Load rules without starting them
    #[clap(long)]
    no_auto_start: bool,

    /// Directory served at `/`
    #[clap(long)]
    static_dir: Option<PathBuf>,

    /// Relay chunk size in bytes
    #[clap(long)]
    buffer_size: Option<usize>,

    /// Remote dial timeout in seconds
    #[clap(long)]
    connect_timeout: Option<u64>,

    /// UDP session idle timeout in seconds
    #[clap(long)]
    udp_idle_timeout: Option<u64>,

    /// Terminal width
    #[clap(long)]
    term_cols: Option<u32>,

    /// Terminal height
    #[clap(long)]
    term_rows: Option<u32>,

    /// Only accept SSH host keys listed with --ssh-host-key
    #[clap(long)]
    ssh_strict_host_key: bool,

    /// Accepted SSH host key fingerprint (SHA256:...); may be repeated
    #[clap(long = "ssh-host-key")]
    ssh_host_keys: Vec<String>,
}

impl Args {
    /// Values set on the command line; flags left out stay unset
    fn to_values(&self) -> Result<ConfigValues> {
        let listen = match &self.listen {
            Some(addr) => Some(parse_socket_addr(addr)?),
            None => None,
        };

        Ok(ConfigValues {
            listen,
            config_file: self.config_file.clone(),
            auto_start: self.no_auto_start.then_some(false),
            log_level: self.log_level.clone(),
            debug: self.debug.then_some(true),
            static_dir: self.static_dir.clone(),
            buffer_size: self.buffer_size,
            connect_timeout: self.connect_timeout,
            udp_idle_timeout: self.udp_idle_timeout,
            term_cols: self.term_cols,
            term_rows: self.term_rows,
            ssh_accept_any_host_key: self.ssh_strict_host_key.then_some(false),
            ssh_host_key_fingerprints: (!self.ssh_host_keys.is_empty()).then(|| self.ssh_host_keys.clone()),
        })
    }
}

/// Directory holding the executable, falling back to the working directory
fn exe_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = ConfigBuilder::new().with_defaults();
    if let Some(settings) = &args.settings {
        builder = builder.with_file(settings);
    }
    let config = builder.with_env(ENV_PREFIX).with_cli(args.to_values()?).build()?;

    init_logger(config.effective_log_level());
    info!("Starting {} v{}", APP_NAME, VERSION);
    config.log();

    if config.ssh_accept_any_host_key() {
        warn!("SSH host keys are accepted without verification");
    }

    let config_file = config.resolve_config_file(&exe_dir());
    info!("Rule file: {}", config_file.display());

    let registry = Arc::new(ProxyRegistry::new(config.relay_settings()));
    if let Err(e) = registry.load(&config_file, config.auto_start()).await {
        error!("Failed to load rules from {}: {}", config_file.display(), e);
    }

    let bridge = TerminalBridge::new(registry.clone(), config.terminal_settings());
    let state = AppState::new(registry.clone(), bridge, config_file.clone());
    let server_config = ControlServerConfig {
        listen_addr: config.listen(),
        static_dir: config.static_dir().map(Path::to_path_buf),
    };

    tokio::select! {
        result = start_control_server(server_config, state) => result?,
        _ = shutdown_signal() => info!("Shutdown signal received"),
    }

    if let Err(e) = registry.persist(&config_file).await {
        error!("Failed to save rules to {}: {}", config_file.display(), e);
    }
    registry.shutdown().await;

    info!("Exiting");
    Ok(())
}
