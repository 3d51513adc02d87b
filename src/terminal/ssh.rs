//! SSH terminal backend
//!
//! Credentials are collected inline on the control channel, then a password
//! login is made over a stream dialed to the rule's remote endpoint. One
//! task owns the SSH channel and demultiplexes its messages into primary and
//! diagnostic output queues.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use log::{debug, error, info, warn};
use russh::client;
use russh::keys::{PublicKey, PublicKeyBase64};
use russh::{Channel, ChannelMsg, Disconnect, Pty};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use crate::common::net::dial;
use crate::common::{ProxyError, Result};
use super::backend::{TerminalBackend, TerminalSettings, TerminalTarget};
use super::channel::{ControlReader, ControlWriter, OutputKind};
use super::credentials::collect_credentials;

/// Terminal type requested for the PTY
const PTY_TERM: &str = "xterm";

/// Output chunks buffered between the SSH channel and the control channel
const OUTPUT_QUEUE_DEPTH: usize = 256;

/// How server host keys are checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept every key; each accepted key is logged as a warning
    AcceptAny,
    /// Accept only keys whose SHA-256 fingerprint is listed
    AllowList(Vec<String>),
}

impl HostKeyPolicy {
    fn allows(&self, fingerprint: &str) -> bool {
        match self {
            HostKeyPolicy::AcceptAny => true,
            HostKeyPolicy::AllowList(allowed) => {
                let wanted = fingerprint.trim_start_matches("SHA256:");
                allowed
                    .iter()
                    .any(|entry| entry.trim().trim_start_matches("SHA256:") == wanted)
            }
        }
    }
}

/// SHA-256 fingerprint of a public key in OpenSSH notation
pub fn fingerprint(key: &PublicKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.public_key_bytes());
    format!("SHA256:{}", BASE64.encode(hasher.finalize()).trim_end_matches('='))
}

struct HostKeyCheck {
    addr: String,
    policy: HostKeyPolicy,
}

impl client::Handler for HostKeyCheck {
    type Error = ProxyError;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> std::result::Result<bool, Self::Error> {
        let fingerprint = fingerprint(server_public_key);

        match &self.policy {
            HostKeyPolicy::AcceptAny => {
                warn!("Accepting unverified host key {} from {}", fingerprint, self.addr);
                Ok(true)
            }
            policy if policy.allows(&fingerprint) => {
                debug!("Host key {} from {} is allowed", fingerprint, self.addr);
                Ok(true)
            }
            _ => {
                error!("Rejecting host key {} from {}: not in the allow-list", fingerprint, self.addr);
                Ok(false)
            }
        }
    }
}

/// SSH with inline password authentication
#[derive(Debug, Clone)]
pub struct SshBackend {
    settings: TerminalSettings,
}

impl SshBackend {
    /// Create a backend
    pub fn new(settings: TerminalSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl TerminalBackend for SshBackend {
    fn name(&self) -> &'static str {
        "ssh"
    }

    async fn run(&self, target: &TerminalTarget, mut reader: ControlReader, writer: ControlWriter) -> Result<()> {
        let credentials = collect_credentials(&mut reader, &writer).await?;

        let stream = dial(target.protocol, &target.addr, self.settings.connect_timeout).await?;
        let config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });
        let handler = HostKeyCheck {
            addr: target.addr.clone(),
            policy: self.settings.host_key_policy.clone(),
        };

        let mut handle = client::connect_stream(config, stream, handler).await?;
        debug!("SSH handshake with {} completed", target.addr);

        let auth = handle
            .authenticate_password(credentials.username.as_str(), credentials.password.as_str())
            .await?;
        if !auth.success() {
            return Err(ProxyError::Bridge(format!(
                "Authentication failed for {}@{}",
                credentials.username, target.addr
            )));
        }
        info!("SSH login {}@{} for proxy {}", credentials.username, target.addr, target.id);

        let channel = handle.channel_open_session().await?;
        channel
            .request_pty(
                false,
                PTY_TERM,
                self.settings.cols,
                self.settings.rows,
                0,
                0,
                &[(Pty::ECHO, 1), (Pty::TTY_OP_ISPEED, 14400), (Pty::TTY_OP_OSPEED, 14400)],
            )
            .await?;

        let (input_tx, input_rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
        let (stdout_tx, stdout_rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
        let (stderr_tx, stderr_rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);

        let input_task = tokio::spawn(forward_input(reader, input_tx));
        let stdout_task = tokio::spawn(forward_output(stdout_rx, writer.clone(), OutputKind::Stdout));
        let stderr_task = tokio::spawn(forward_output(stderr_rx, writer, OutputKind::Stderr));

        channel.request_shell(false).await?;
        let exit_status = pump_channel(channel, input_rx, stdout_tx, stderr_tx).await;
        match exit_status {
            Some(status) => info!("Shell on {} exited with status {}", target.addr, status),
            None => info!("Shell session on {} ended", target.addr),
        }

        // Output queues are closed once the pump returns; let them drain
        let _ = stdout_task.await;
        let _ = stderr_task.await;
        input_task.abort();

        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "Session closed", "en")
            .await
        {
            debug!("SSH disconnect from {} failed: {}", target.addr, e);
        }
        Ok(())
    }
}

/// Control channel to shell input
async fn forward_input(mut reader: ControlReader, input: mpsc::Sender<Bytes>) {
    while let Some(message) = reader.recv().await {
        if input.send(message).await.is_err() {
            break;
        }
    }
    debug!("Control input closed");
}

/// Shell output queue to control channel
async fn forward_output(mut output: mpsc::Receiver<Bytes>, writer: ControlWriter, kind: OutputKind) {
    while let Some(data) = output.recv().await {
        if let Err(e) = writer.send(kind, data).await {
            debug!("Dropping {:?} output: {}", kind, e);
            break;
        }
    }
}

/// Drive the SSH channel until the shell ends or the control side goes away
///
/// Returns the exit status reported by the server, if any.
async fn pump_channel(
    mut channel: Channel<client::Msg>,
    mut input: mpsc::Receiver<Bytes>,
    stdout: mpsc::Sender<Bytes>,
    stderr: mpsc::Sender<Bytes>,
) -> Option<u32> {
    let mut exit_status = None;

    loop {
        tokio::select! {
            message = input.recv() => match message {
                Some(data) => {
                    if let Err(e) = channel.data(&data[..]).await {
                        warn!("Failed to write to shell: {}", e);
                        break;
                    }
                }
                None => {
                    debug!("Control channel gone, ending shell");
                    let _ = channel.eof().await;
                    break;
                }
            },
            message = channel.wait() => match message {
                Some(ChannelMsg::Data { data }) => {
                    let _ = stdout.send(Bytes::copy_from_slice(&data)).await;
                }
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                    let _ = stderr.send(Bytes::copy_from_slice(&data)).await;
                }
                Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                    exit_status = Some(status);
                }
                // Exit status usually follows EOF
                Some(ChannelMsg::Eof) => debug!("Shell closed its output"),
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            },
        }
    }

    let _ = channel.close().await;
    exit_status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_matching() {
        let policy = HostKeyPolicy::AllowList(vec![
            "SHA256:abcDEF123".to_string(),
            " xyz987 ".to_string(),
        ]);
        assert!(policy.allows("SHA256:abcDEF123"));
        assert!(policy.allows("SHA256:xyz987"));
        assert!(!policy.allows("SHA256:abcdef123"));
        assert!(HostKeyPolicy::AcceptAny.allows("SHA256:anything"));
    }
}
