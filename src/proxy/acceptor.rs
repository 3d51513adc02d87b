//! Accept loop for one started rule
//!
//! The acceptor owns the rule's listener. It accepts connections, dials the
//! remote endpoint for each one and hands the pair to a detached relay
//! session. Stopping drops the listener; relay sessions already running are
//! left alone.

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::common::net::dial;
use crate::common::{Connection, Protocol, ProxyId};
use super::forwarder::relay_session;
use super::listener::Listener;
use super::rule::ProxyDefinition;
use super::session::SessionCounter;
use super::udp::run_udp_acceptor;

/// Default relay chunk size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default timeout for remote dials
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default idle timeout for UDP sessions
pub const DEFAULT_UDP_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Tuning shared by every rule's relay sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    /// Chunk size for stream copies
    pub buffer_size: usize,
    /// Timeout for dialing the remote endpoint
    pub connect_timeout: Duration,
    /// Idle time after which a UDP session ends
    pub udp_idle_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            udp_idle_timeout: DEFAULT_UDP_IDLE_TIMEOUT,
        }
    }
}

/// Where accepted connections are forwarded to
#[derive(Debug, Clone)]
pub(crate) struct RelayTarget {
    pub id: ProxyId,
    pub protocol: Protocol,
    pub remote_addr: String,
    pub settings: RelaySettings,
}

impl RelayTarget {
    pub fn new(definition: &ProxyDefinition, settings: RelaySettings) -> Self {
        Self {
            id: definition.id,
            protocol: definition.protocol,
            remote_addr: definition.remote_addr(),
            settings,
        }
    }
}

/// Handle to a running acceptor task
#[derive(Debug)]
pub struct AcceptorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AcceptorHandle {
    /// Whether the acceptor task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the acceptor and wait for its exit
    ///
    /// The listener has been closed when this returns.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The acceptor may already be gone
            let _ = shutdown.send(());
        }

        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                error!("Acceptor task ended abnormally: {}", e);
            }
        }
    }
}

/// Spawn the acceptor for a bound listener
pub(crate) fn spawn_acceptor(
    listener: Listener,
    target: RelayTarget,
    sessions: SessionCounter,
) -> AcceptorHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let task = match listener {
        Listener::Udp(socket) => tokio::spawn(run_udp_acceptor(socket, target, sessions, shutdown_rx)),
        listener => tokio::spawn(run_stream_acceptor(listener, target, sessions, shutdown_rx)),
    };

    AcceptorHandle {
        shutdown: Some(shutdown_tx),
        task,
    }
}

async fn run_stream_acceptor(
    listener: Listener,
    target: RelayTarget,
    sessions: SessionCounter,
    mut shutdown: oneshot::Receiver<()>,
) {
    let local_addr = listener.local_addr();
    debug!("Proxy {} accepting on {}", target.id, local_addr);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Proxy {} acceptor received stop signal", target.id);
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    debug!("Proxy {} accepted connection from {}", target.id, peer);
                    tokio::spawn(handle_connection(conn, peer, target.clone(), sessions.clone()));
                }
                Err(e) => {
                    error!("Proxy {} failed to accept on {}: {}", target.id, local_addr, e);
                    break;
                }
            }
        }
    }

    // Closes the listener and, for unix rules, removes the socket path
    drop(listener);
    info!("Proxy {} listener on {} closed", target.id, local_addr);
}

async fn handle_connection(conn: Connection, peer: String, target: RelayTarget, sessions: SessionCounter) {
    let remote = match dial(target.protocol, &target.remote_addr, target.settings.connect_timeout).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!("Proxy {} dropping connection from {}: {}", target.id, peer, e);
            return;
        }
    };

    let guard = sessions.enter();
    debug!(
        "Proxy {} relaying {} <-> {} ({} active)",
        target.id,
        peer,
        target.remote_addr,
        sessions.get()
    );

    match relay_session(conn, remote, target.settings.buffer_size, guard).await {
        Ok(()) => debug!("Proxy {} session from {} closed", target.id, peer),
        Err(e) => debug!("Proxy {} session from {} ended: {}", target.id, peer, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn test_stop_waits_for_listener_close() {
        let listener = Listener::bind(Protocol::Tcp, "127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        let target = RelayTarget {
            id: 1,
            protocol: Protocol::Tcp,
            remote_addr: "127.0.0.1:9".to_string(),
            settings: RelaySettings::default(),
        };

        let handle = spawn_acceptor(listener, target, SessionCounter::new());
        assert!(!handle.is_finished());
        handle.stop().await;

        assert!(TcpStream::connect(&addr).await.is_err());
    }

    #[tokio::test]
    async fn test_relays_to_remote() {
        let echo = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let remote_addr = echo.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = echo.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let listener = Listener::bind(Protocol::Tcp, "127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        let target = RelayTarget {
            id: 2,
            protocol: Protocol::Tcp,
            remote_addr,
            settings: RelaySettings::default(),
        };
        let handle = spawn_acceptor(listener, target, SessionCounter::new());

        let mut client = TcpStream::connect(&addr).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        handle.stop().await;
    }
}
