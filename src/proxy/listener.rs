//! Listening sockets for forwarding rules

use std::io;
#[cfg(unix)]
use std::path::PathBuf;

use log::{debug, warn};
use tokio::net::{TcpListener, UdpSocket};
#[cfg(unix)]
use tokio::net::UnixListener;

use crate::common::net::{bind_tcp_listener, resolve_addr};
use crate::common::{Connection, Protocol, ProxyError, Result};

/// Owns the filesystem entry of a bound unix socket and removes it on drop
#[cfg(unix)]
#[derive(Debug)]
pub struct SocketPath(PathBuf);

#[cfg(unix)]
impl Drop for SocketPath {
    fn drop(&mut self) {
        debug!("Removing unix socket {}", self.0.display());
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove unix socket {}: {}", self.0.display(), e);
            }
        }
    }
}

/// A bound listener, one per started rule
#[derive(Debug)]
pub enum Listener {
    /// TCP listener
    Tcp(TcpListener),
    /// Unix-domain listener and the path it owns
    #[cfg(unix)]
    Unix(UnixListener, SocketPath),
    /// UDP socket; peers are tracked by address
    Udp(UdpSocket),
}

impl Listener {
    /// Bind a listener for `protocol` on `addr`
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Bind` when the address cannot be bound.
    pub async fn bind(protocol: Protocol, addr: &str) -> Result<Self> {
        let result = match protocol {
            Protocol::Tcp => bind_tcp_listener(addr).await.map(Listener::Tcp),
            Protocol::Udp => match resolve_addr(addr).await {
                Ok(sock_addr) => UdpSocket::bind(sock_addr).await.map(Listener::Udp),
                Err(e) => Err(e),
            },
            #[cfg(unix)]
            Protocol::Unix => UnixListener::bind(addr)
                .map(|listener| Listener::Unix(listener, SocketPath(PathBuf::from(addr)))),
            #[cfg(not(unix))]
            Protocol::Unix => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            )),
        };

        result.map_err(|source| ProxyError::Bind {
            protocol: protocol.to_string(),
            addr: addr.to_string(),
            source,
        })
    }

    /// Local address description for logs
    pub fn local_addr(&self) -> String {
        match self {
            Listener::Tcp(listener) => listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            #[cfg(unix)]
            Listener::Unix(_, path) => path.0.display().to_string(),
            Listener::Udp(socket) => socket
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default(),
        }
    }

    /// Accept the next stream connection
    ///
    /// UDP has no accept; UDP listeners are driven by the datagram loop.
    pub async fn accept(&self) -> io::Result<(Connection, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                let _ = stream.set_nodelay(true);
                Ok((Connection::Tcp(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix(listener, path) => {
                let (stream, _) = listener.accept().await?;
                Ok((Connection::Unix(stream), path.0.display().to_string()))
            }
            Listener::Udp(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "udp listeners do not accept connections",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_conflict_reports_bind_error() {
        let first = Listener::bind(Protocol::Tcp, "127.0.0.1:0").await.unwrap();
        let addr = first.local_addr();

        let second = Listener::bind(Protocol::Tcp, &addr).await;
        assert!(matches!(second, Err(ProxyError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_udp_accept_is_rejected() {
        let listener = Listener::bind(Protocol::Udp, "127.0.0.1:0").await.unwrap();
        assert!(listener.accept().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_listener_removes_socket_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rule.sock");
        let addr = path.to_str().unwrap().to_string();

        let listener = Listener::bind(Protocol::Unix, &addr).await.unwrap();
        assert!(path.exists());
        drop(listener);
        assert!(!path.exists());
    }
}
