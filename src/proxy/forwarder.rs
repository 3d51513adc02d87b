//! Data forwarding module
//!
//! This module handles data forwarding between two streams.

use std::io;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::common::{first_completion, Finished, ProxyError, Result};
use super::session::SessionGuard;

/// Copy one direction until the first read error, write error or end of stream
///
/// Returns the number of bytes moved and the error that ended the copy, if
/// any. End of stream is a normal end.
async fn copy_half<R, W>(
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    buffer_size: usize,
    direction: &'static str,
) -> (u64, Option<io::Error>)
where
    R: AsyncRead,
    W: AsyncWrite,
{
    let mut buffer = vec![0u8; buffer_size];
    let mut total_bytes = 0u64;

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => {
                debug!("{} reached end of stream", direction);
                return (total_bytes, None);
            }
            Ok(n) => {
                if let Err(e) = writer.write_all(&buffer[..n]).await {
                    debug!("{} write error: {}", direction, e);
                    return (total_bytes, Some(e));
                }
                total_bytes += n as u64;
            }
            Err(e) => {
                debug!("{} read error: {}", direction, e);
                return (total_bytes, Some(e));
            }
        }
    }
}

/// Relay bytes between an accepted connection and its dialed remote peer
///
/// Both directions run concurrently. The session ends as soon as either
/// direction stops; the other direction is cancelled, both connections are
/// closed, and `guard` releases the session count.
///
/// # Returns
///
/// `Err(ProxyError::Relay)` when the session was ended by an I/O error,
/// `Ok(())` when it ended by a clean close.
pub async fn relay_session<L, R>(
    local: L,
    remote: R,
    buffer_size: usize,
    guard: SessionGuard,
) -> Result<()>
where
    L: AsyncRead + AsyncWrite + Send + 'static,
    R: AsyncRead + AsyncWrite + Send + 'static,
{
    let (local_reader, local_writer) = tokio::io::split(local);
    let (remote_reader, remote_writer) = tokio::io::split(remote);

    let (finished, outcome) = first_completion(
        copy_half(local_reader, remote_writer, buffer_size, "local2remote"),
        copy_half(remote_reader, local_writer, buffer_size, "remote2local"),
    )
    .await;

    // Both connections are closed once the copy halves are gone
    drop(guard);

    let direction = match finished {
        Finished::First => "local2remote",
        Finished::Second => "remote2local",
    };

    match outcome {
        Some((bytes, None)) => {
            debug!("{} finished after {} bytes, session closed", direction, bytes);
            Ok(())
        }
        Some((bytes, Some(e))) => {
            debug!("{} failed after {} bytes: {}", direction, bytes, e);
            Err(ProxyError::Relay(e))
        }
        None => Err(ProxyError::Other(format!("{} copy task panicked", direction))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::session::SessionCounter;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_relay_moves_bytes_both_ways() {
        let counter = SessionCounter::new();
        let (mut client, local) = duplex(64);
        let (remote, mut server) = duplex(64);

        let relay = tokio::spawn(relay_session(local, remote, 16, counter.enter()));
        assert_eq!(counter.get(), 1);

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        // Closing one side tears the whole session down
        drop(server);
        relay.await.unwrap().unwrap();
        assert_eq!(counter.get(), 0);

        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "client side must observe the close");
    }
}
