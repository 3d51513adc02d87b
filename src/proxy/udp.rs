//! UDP forwarding
//!
//! UDP has no accept, so every distinct client address is treated as a
//! connection. The first datagram from a new peer dials a connected socket
//! to the remote endpoint and starts a session; replies travel back to the
//! peer through the shared listener socket.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout, Instant};

use crate::common::net::resolve_addr;
use crate::common::{ProxyError, ProxyId, Result};
use super::acceptor::RelayTarget;
use super::session::{SessionCounter, SessionGuard};

/// Largest UDP payload
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Datagrams queued per peer before new ones are dropped
const PEER_QUEUE_DEPTH: usize = 256;

/// Dial a connected UDP socket to `addr`
async fn dial_udp(addr: &str, connect_timeout: Duration) -> Result<UdpSocket> {
    let dial_error = |source: io::Error| ProxyError::Dial {
        protocol: "udp".to_string(),
        addr: addr.to_string(),
        source,
    };

    let connect = async {
        let remote = resolve_addr(addr).await?;
        let bind_addr = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(remote).await?;
        Ok::<_, io::Error>(socket)
    };

    timeout(connect_timeout, connect)
        .await
        .map_err(|_| dial_error(io::Error::new(io::ErrorKind::TimedOut, "Connection timed out")))?
        .map_err(dial_error)
}

/// Datagram loop of a started UDP rule
pub(crate) async fn run_udp_acceptor(
    socket: UdpSocket,
    target: RelayTarget,
    sessions: SessionCounter,
    mut shutdown: oneshot::Receiver<()>,
) {
    let local_addr = socket
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    let listener = Arc::new(socket);
    let mut peers: HashMap<SocketAddr, mpsc::Sender<Bytes>> = HashMap::new();
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<SocketAddr>();
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

    debug!("Proxy {} receiving datagrams on {}", target.id, local_addr);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Proxy {} acceptor received stop signal", target.id);
                break;
            }
            Some(peer) = closed_rx.recv() => {
                // The peer may have started a new session in the meantime
                if peers.get(&peer).is_some_and(|tx| tx.is_closed()) {
                    peers.remove(&peer);
                }
            }
            received = listener.recv_from(&mut buffer) => match received {
                Ok((n, peer)) => {
                    let datagram = Bytes::copy_from_slice(&buffer[..n]);
                    forward_datagram(&listener, &mut peers, &closed_tx, &target, &sessions, peer, datagram).await;
                }
                // ICMP port-unreachable from an earlier reply surfaces here
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    debug!("Proxy {} ignoring reset on {}: {}", target.id, local_addr, e);
                }
                Err(e) => {
                    error!("Proxy {} failed to receive on {}: {}", target.id, local_addr, e);
                    break;
                }
            }
        }
    }

    // Dropping the senders ends every session of this listener
    peers.clear();
    drop(listener);
    info!("Proxy {} listener on {} closed", target.id, local_addr);
}

async fn forward_datagram(
    listener: &Arc<UdpSocket>,
    peers: &mut HashMap<SocketAddr, mpsc::Sender<Bytes>>,
    closed_tx: &mpsc::UnboundedSender<SocketAddr>,
    target: &RelayTarget,
    sessions: &SessionCounter,
    peer: SocketAddr,
    datagram: Bytes,
) {
    let datagram = match peers.get(&peer) {
        Some(tx) => match tx.try_send(datagram) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Proxy {} dropping datagram from {}: queue full", target.id, peer);
                return;
            }
            // Session ended before the close notice was processed
            Err(mpsc::error::TrySendError::Closed(datagram)) => {
                peers.remove(&peer);
                datagram
            }
        },
        None => datagram,
    };

    let upstream = match dial_udp(&target.remote_addr, target.settings.connect_timeout).await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!("Proxy {} dropping datagram from {}: {}", target.id, peer, e);
            return;
        }
    };

    let (tx, rx) = mpsc::channel(PEER_QUEUE_DEPTH);
    // Freshly created with room to spare
    let _ = tx.try_send(datagram);
    peers.insert(peer, tx);

    let guard = sessions.enter();
    debug!(
        "Proxy {} new udp session {} <-> {} ({} active)",
        target.id,
        peer,
        target.remote_addr,
        sessions.get()
    );

    tokio::spawn(run_udp_session(UdpSession {
        id: target.id,
        peer,
        upstream,
        listener: Arc::downgrade(listener),
        inbound: rx,
        idle_timeout: target.settings.udp_idle_timeout,
        closed: closed_tx.clone(),
        guard,
    }));
}

struct UdpSession {
    id: ProxyId,
    peer: SocketAddr,
    upstream: UdpSocket,
    listener: Weak<UdpSocket>,
    inbound: mpsc::Receiver<Bytes>,
    idle_timeout: Duration,
    closed: mpsc::UnboundedSender<SocketAddr>,
    guard: SessionGuard,
}

async fn run_udp_session(mut session: UdpSession) {
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut deadline = Instant::now() + session.idle_timeout;

    let reason = loop {
        tokio::select! {
            _ = sleep_until(deadline) => break "idle timeout".to_string(),
            inbound = session.inbound.recv() => match inbound {
                Some(datagram) => {
                    if let Err(e) = session.upstream.send(&datagram).await {
                        break format!("send to remote failed: {}", e);
                    }
                    deadline = Instant::now() + session.idle_timeout;
                }
                None => break "listener closed".to_string(),
            },
            received = session.upstream.recv(&mut buffer) => match received {
                Ok(n) => {
                    let Some(listener) = session.listener.upgrade() else {
                        break "listener closed".to_string();
                    };
                    if let Err(e) = listener.send_to(&buffer[..n], session.peer).await {
                        break format!("send to peer failed: {}", e);
                    }
                    deadline = Instant::now() + session.idle_timeout;
                }
                Err(e) => break format!("receive from remote failed: {}", e),
            },
        }
    };

    debug!("Proxy {} udp session {} ended: {}", session.id, session.peer, reason);
    let _ = session.closed.send(session.peer);
    drop(session.guard);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Protocol;
    use crate::proxy::acceptor::{spawn_acceptor, RelaySettings};
    use crate::proxy::listener::Listener;

    async fn udp_echo() -> String {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(&buf[..n], peer).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_udp_session_lifecycle() {
        let remote_addr = udp_echo().await;
        let listener = Listener::bind(Protocol::Udp, "127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        let sessions = SessionCounter::new();
        let target = RelayTarget {
            id: 5,
            protocol: Protocol::Udp,
            remote_addr,
            settings: RelaySettings {
                udp_idle_timeout: Duration::from_millis(300),
                ..RelaySettings::default()
            },
        };
        let handle = spawn_acceptor(listener, target, sessions.clone());

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(&addr).await.unwrap();
        client.send(b"datagram").await.unwrap();

        let mut buf = [0u8; 64];
        let n = timeout(Duration::from_secs(2), client.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"datagram");
        assert_eq!(sessions.get(), 1);

        // Idle sessions end on their own
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(sessions.get(), 0);

        handle.stop().await;
    }
}
