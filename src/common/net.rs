//! Network utility functions
//!
//! This module provides the socket-level building blocks shared by the relay
//! engine and the terminal bridge: protocol parsing, address formatting,
//! listener creation and outbound dials.

use std::fmt;
use std::io;
use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::time::timeout;

use super::error::{ProxyError, Result};

/// Listen backlog for TCP rules
const LISTEN_BACKLOG: i32 = 1024;

/// Transport protocol of a forwarding rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP stream
    #[default]
    Tcp,
    /// UDP datagrams
    Udp,
    /// Unix-domain stream socket
    Unix,
}

impl Protocol {
    /// Protocol name as used in rule files and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Unix => "unix",
        }
    }

    /// Whether endpoints of this protocol carry a port
    pub fn uses_port(&self) -> bool {
        !matches!(self, Protocol::Unix)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "unix" => Ok(Self::Unix),
            _ => Err(ProxyError::Validation(format!(
                "Invalid protocol: {}. Valid values are: tcp, udp, unix",
                s
            ))),
        }
    }
}

/// Format an endpoint as a dialable address
///
/// Unix endpoints are plain socket paths; IPv6 literals are bracketed.
pub fn endpoint_addr(protocol: Protocol, host: &str, port: u16) -> String {
    if !protocol.uses_port() {
        return host.to_string();
    }

    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Resolve a `host:port` string to the first socket address
pub async fn resolve_addr(addr: &str) -> io::Result<SocketAddr> {
    lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("Could not resolve address: {}", addr)))
}

/// Bind a TCP listener with `SO_REUSEADDR`
///
/// Rules are restarted often; without address reuse a restart right after a
/// stop fails while old connections linger in `TIME_WAIT`.
pub async fn bind_tcp_listener(addr: &str) -> io::Result<TcpListener> {
    let addr = resolve_addr(addr).await?;
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(SockProtocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    TcpListener::from_std(socket.into())
}

/// A connected byte stream (TCP or Unix-domain)
#[derive(Debug)]
pub enum Connection {
    /// TCP stream
    Tcp(TcpStream),
    /// Unix-domain stream
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for Connection {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Dial a stream connection to `addr`
///
/// # Errors
///
/// Returns `ProxyError::Dial` when the remote is unreachable, the dial times
/// out, or the protocol is not stream-oriented.
pub async fn dial(protocol: Protocol, addr: &str, connect_timeout: Duration) -> Result<Connection> {
    let dial_error = |source: io::Error| ProxyError::Dial {
        protocol: protocol.to_string(),
        addr: addr.to_string(),
        source,
    };

    let connect = async {
        match protocol {
            Protocol::Tcp => TcpStream::connect(addr).await.map(Connection::Tcp),
            #[cfg(unix)]
            Protocol::Unix => UnixStream::connect(addr).await.map(Connection::Unix),
            #[cfg(not(unix))]
            Protocol::Unix => Err(io::Error::new(io::ErrorKind::Unsupported, "unix sockets are not supported on this platform")),
            Protocol::Udp => Err(io::Error::new(io::ErrorKind::InvalidInput, "udp is not a stream protocol")),
        }
    };

    let conn = timeout(connect_timeout, connect)
        .await
        .map_err(|_| dial_error(io::Error::new(io::ErrorKind::TimedOut, "Connection timed out")))?
        .map_err(dial_error)?;

    if let Connection::Tcp(stream) = &conn {
        let _ = stream.set_nodelay(true);
    }

    Ok(conn)
}

/// Primary outbound IP address of this host
///
/// Connecting a UDP socket sends no packets; it only asks the OS which local
/// address would be used to reach a public destination.
pub fn default_outbound_ip() -> io::Result<String> {
    let socket = StdUdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:53")?;
    Ok(socket.local_addr()?.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parsing() {
        assert_eq!(Protocol::from_str("TCP").unwrap(), Protocol::Tcp);
        assert_eq!(Protocol::from_str("").unwrap(), Protocol::Tcp);
        assert_eq!(Protocol::from_str("udp").unwrap(), Protocol::Udp);
        assert_eq!(Protocol::from_str("unix").unwrap(), Protocol::Unix);
        assert!(Protocol::from_str("sctp").is_err());
    }

    #[test]
    fn test_endpoint_addr() {
        assert_eq!(endpoint_addr(Protocol::Tcp, "127.0.0.1", 9000), "127.0.0.1:9000");
        assert_eq!(endpoint_addr(Protocol::Udp, "::1", 53), "[::1]:53");
        assert_eq!(endpoint_addr(Protocol::Unix, "/tmp/lcx.sock", 0), "/tmp/lcx.sock");
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = bind_tcp_listener("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = dial(Protocol::Tcp, &addr, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(ProxyError::Dial { .. })));
    }

    #[tokio::test]
    async fn test_resolve_addr() {
        let addr = resolve_addr("127.0.0.1:9000").await.unwrap();
        assert_eq!(addr.port(), 9000);
        assert!(addr.ip().is_loopback());

        let addr = resolve_addr("[::1]:22").await.unwrap();
        assert!(addr.is_ipv6());

        assert!(resolve_addr("missing-port").await.is_err());
    }

    #[tokio::test]
    async fn test_dial_udp_rejected() {
        let result = dial(Protocol::Udp, "127.0.0.1:53", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProxyError::Dial { .. })));
    }
}
