//! Inline credential prompts
//!
//! Each field is collected message by message. A message made only of CR
//! and LF bytes ends the field; every other message is appended to it.

use std::fmt;

use bytes::BytesMut;
use log::debug;

use crate::common::{ProxyError, Result};
use super::channel::{ControlReader, ControlWriter, OutputKind};

/// Prompt sent before the username
pub const PROMPT_USER: &str = "User: ";

/// Prompt sent before the password
pub const PROMPT_PASSWORD: &str = "Password: ";

/// Username and password for an SSH login
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Password
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn is_terminator(message: &[u8]) -> bool {
    !message.is_empty() && message.iter().all(|b| *b == b'\r' || *b == b'\n')
}

/// Send `prompt` and read one field
///
/// When `echo` is set every message, the terminator included, is sent back
/// verbatim.
///
/// # Errors
///
/// Returns `ProxyError::Bridge` if the channel closes before the field is
/// terminated.
pub async fn prompt_field(
    reader: &mut ControlReader,
    writer: &ControlWriter,
    prompt: &str,
    echo: bool,
) -> Result<String> {
    writer.send_text(prompt).await?;

    let mut field = BytesMut::new();
    loop {
        let message = reader
            .recv()
            .await
            .ok_or_else(|| ProxyError::Bridge("control channel closed during login".to_string()))?;

        if message.is_empty() {
            continue;
        }

        if echo {
            writer.send(OutputKind::Stdout, message.clone()).await?;
        }

        if is_terminator(&message) {
            break;
        }
        field.extend_from_slice(&message);
    }

    Ok(String::from_utf8_lossy(&field).into_owned())
}

/// Prompt for username (echoed) and password (not echoed)
pub async fn collect_credentials(reader: &mut ControlReader, writer: &ControlWriter) -> Result<Credentials> {
    let username = prompt_field(reader, writer, PROMPT_USER, true).await?;
    let password = prompt_field(reader, writer, PROMPT_PASSWORD, false).await?;
    debug!("Collected credentials for user {}", username);

    Ok(Credentials { username, password })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::channel::ControlChannel;
    use bytes::Bytes;

    #[test]
    fn test_terminator_detection() {
        assert!(is_terminator(b"\r"));
        assert!(is_terminator(b"\r\n"));
        assert!(is_terminator(b"\n\n"));
        assert!(!is_terminator(b""));
        assert!(!is_terminator(b"a\r"));
    }

    #[tokio::test]
    async fn test_username_is_echoed_password_is_not() {
        let (channel, mut peer) = ControlChannel::pair();
        let (mut reader, writer) = channel.split();

        let login = tokio::spawn(async move { collect_credentials(&mut reader, &writer).await });

        assert_eq!(peer.recv().await.unwrap().1, Bytes::from_static(PROMPT_USER.as_bytes()));
        for part in ["ro", "ot", "\r"] {
            peer.send(part).await;
            assert_eq!(peer.recv().await.unwrap().1, Bytes::from(part));
        }

        assert_eq!(peer.recv().await.unwrap().1, Bytes::from_static(PROMPT_PASSWORD.as_bytes()));
        peer.send("s3cr").await;
        peer.send("et").await;
        peer.send("\r\n").await;

        let credentials = login.await.unwrap().unwrap();
        assert_eq!(credentials.username, "root");
        assert_eq!(credentials.password, "s3cret");
        assert!(!format!("{:?}", credentials).contains("s3cret"));

        // Nothing was echoed during the password phase
        assert!(peer.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_close_aborts_login() {
        let (channel, peer) = ControlChannel::pair();
        let (mut reader, writer) = channel.split();
        drop(peer.inbound);

        let result = prompt_field(&mut reader, &writer, PROMPT_USER, true).await;
        assert!(matches!(result, Err(ProxyError::Bridge(_))));
    }
}
