//! Duplex control channel
//!
//! A control channel carries whole messages in both directions. Inbound
//! messages are raw bytes typed by the user; outbound messages are tagged
//! with the output stream they came from. The websocket adapter in the
//! control plane and the in-memory [`ControlPeer`] used by tests both sit
//! on the far end of the same pair of queues.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::common::{ProxyError, Result};

/// Messages buffered per direction
const CHANNEL_DEPTH: usize = 64;

/// Output stream an outbound message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Primary output
    Stdout,
    /// Diagnostic output
    Stderr,
}

/// Message travelling from the bridge to the far end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Output bytes
    Data(OutputKind, Bytes),
    /// The bridge is done; the far end should close
    Close,
}

/// Receiving half of a control channel
#[derive(Debug)]
pub struct ControlReader {
    rx: mpsc::Receiver<Bytes>,
}

impl ControlReader {
    /// Next inbound message, `None` once the far end has gone away
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Sending half of a control channel
///
/// Clones share the same outbound queue, so output copy tasks can write
/// concurrently.
#[derive(Debug, Clone)]
pub struct ControlWriter {
    tx: mpsc::Sender<Outbound>,
}

impl ControlWriter {
    /// Send `data` tagged with `kind`
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Bridge` when the far end has gone away.
    pub async fn send(&self, kind: OutputKind, data: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(Outbound::Data(kind, data.into()))
            .await
            .map_err(|_| ProxyError::Bridge("control channel closed".to_string()))
    }

    /// Send a text message on the primary stream
    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.send(OutputKind::Stdout, Bytes::copy_from_slice(text.as_bytes()))
            .await
    }

    /// Ask the far end to close; further sends are discarded by it
    pub async fn close(&self) {
        let _ = self.tx.send(Outbound::Close).await;
    }

    /// Whether the far end has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A control channel as seen by a bridge
#[derive(Debug)]
pub struct ControlChannel {
    /// Inbound messages
    pub reader: ControlReader,
    /// Outbound messages
    pub writer: ControlWriter,
}

impl ControlChannel {
    /// Create a channel together with the far end that drives it
    pub fn pair() -> (ControlChannel, ControlPeer) {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_DEPTH);

        let channel = ControlChannel {
            reader: ControlReader { rx: inbound_rx },
            writer: ControlWriter { tx: outbound_tx },
        };
        let peer = ControlPeer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        (channel, peer)
    }

    /// Split into reader and writer
    pub fn split(self) -> (ControlReader, ControlWriter) {
        (self.reader, self.writer)
    }
}

/// Far end of a [`ControlChannel`]
#[derive(Debug)]
pub struct ControlPeer {
    /// Messages delivered to the bridge
    pub inbound: mpsc::Sender<Bytes>,
    /// Messages produced by the bridge
    pub outbound: mpsc::Receiver<Outbound>,
}

impl ControlPeer {
    /// Deliver a message to the bridge
    ///
    /// Returns `false` when the bridge has stopped reading.
    pub async fn send(&self, data: impl Into<Bytes>) -> bool {
        self.inbound.send(data.into()).await.is_ok()
    }

    /// Next message from the bridge
    ///
    /// `None` means the bridge closed the channel or went away.
    pub async fn recv(&mut self) -> Option<(OutputKind, Bytes)> {
        match self.outbound.recv().await? {
            Outbound::Data(kind, data) => Some((kind, data)),
            Outbound::Close => None,
        }
    }

    /// Split into the inbound sender and the outbound receiver
    pub fn split(self) -> (mpsc::Sender<Bytes>, mpsc::Receiver<Outbound>) {
        (self.inbound, self.outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_carries_messages_both_ways() {
        let (channel, mut peer) = ControlChannel::pair();
        let (mut reader, writer) = channel.split();

        assert!(peer.send("ls\r").await);
        assert_eq!(reader.recv().await.unwrap(), Bytes::from_static(b"ls\r"));

        writer.send(OutputKind::Stderr, "oops").await.unwrap();
        writer.send_text("ok").await.unwrap();
        assert_eq!(peer.recv().await, Some((OutputKind::Stderr, Bytes::from_static(b"oops"))));
        assert_eq!(peer.recv().await, Some((OutputKind::Stdout, Bytes::from_static(b"ok"))));

        writer.close().await;
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_writer_fails_after_peer_drop() {
        let (channel, peer) = ControlChannel::pair();
        drop(peer);

        let (mut reader, writer) = channel.split();
        assert!(reader.recv().await.is_none());
        assert!(writer.is_closed());
        assert!(matches!(writer.send_text("late").await, Err(ProxyError::Bridge(_))));
    }
}
