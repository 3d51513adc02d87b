//! Telnet terminal backend
//!
//! No login dialog is run; the remote side prompts on its own. Option
//! negotiation is handled here so the browser only sees terminal data.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

use crate::common::net::dial;
use crate::common::{first_completion, Finished, ProxyError, Result};
use super::backend::{TerminalBackend, TerminalTarget};
use super::channel::{ControlReader, ControlWriter, OutputKind};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SUPPRESS_GO_AHEAD: u8 = 3;

const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    Data,
    Iac,
    Option(u8),
    Sub,
    SubIac,
}

/// Strips telnet commands from a server stream and answers negotiation
#[derive(Debug)]
pub struct TelnetFilter {
    state: FilterState,
}

impl Default for TelnetFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetFilter {
    /// Create a filter in data state
    pub fn new() -> Self {
        Self { state: FilterState::Data }
    }

    /// Process server bytes
    ///
    /// Terminal data is appended to `data`; negotiation answers for the
    /// server are appended to `replies`. Commands split across reads are
    /// carried over to the next call.
    pub fn feed(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &byte in input {
            self.state = match self.state {
                FilterState::Data if byte == IAC => FilterState::Iac,
                FilterState::Data => {
                    data.push(byte);
                    FilterState::Data
                }
                FilterState::Iac => match byte {
                    IAC => {
                        data.push(IAC);
                        FilterState::Data
                    }
                    WILL | WONT | DO | DONT => FilterState::Option(byte),
                    SB => FilterState::Sub,
                    // NOP, GA and friends carry no terminal data
                    _ => FilterState::Data,
                },
                FilterState::Option(command) => {
                    match command {
                        WILL if byte == OPT_ECHO || byte == OPT_SUPPRESS_GO_AHEAD => {
                            replies.extend_from_slice(&[IAC, DO, byte])
                        }
                        WILL => replies.extend_from_slice(&[IAC, DONT, byte]),
                        DO => replies.extend_from_slice(&[IAC, WONT, byte]),
                        _ => {}
                    }
                    FilterState::Data
                }
                FilterState::Sub if byte == IAC => FilterState::SubIac,
                FilterState::Sub => FilterState::Sub,
                FilterState::SubIac if byte == SE => FilterState::Data,
                FilterState::SubIac => FilterState::Sub,
            };
        }
    }
}

/// Double every IAC byte so the server reads it as data
pub fn escape_iac(input: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(input.len());
    for &byte in input {
        escaped.push(byte);
        if byte == IAC {
            escaped.push(IAC);
        }
    }
    escaped
}

/// Raw telnet
#[derive(Debug, Clone)]
pub struct TelnetBackend {
    connect_timeout: Duration,
}

impl TelnetBackend {
    /// Create a backend
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl TerminalBackend for TelnetBackend {
    fn name(&self) -> &'static str {
        "telnet"
    }

    async fn run(&self, target: &TerminalTarget, reader: ControlReader, writer: ControlWriter) -> Result<()> {
        let stream = dial(target.protocol, &target.addr, self.connect_timeout).await?;
        info!("Telnet session to {} for proxy {}", target.addr, target.id);

        let (remote_reader, remote_writer) = tokio::io::split(stream);
        let (reply_tx, reply_rx) = mpsc::channel(16);

        let (finished, outcome) = first_completion(
            remote_to_control(remote_reader, writer, reply_tx),
            control_to_remote(reader, remote_writer, reply_rx),
        )
        .await;

        let direction = match finished {
            Finished::First => "remote to control",
            Finished::Second => "control to remote",
        };
        info!("Telnet session to {} ended ({} finished first)", target.addr, direction);

        outcome.unwrap_or_else(|| Err(ProxyError::Bridge(format!("telnet {} task panicked", direction))))
    }
}

async fn remote_to_control<R>(
    mut remote: ReadHalf<R>,
    writer: ControlWriter,
    replies: mpsc::Sender<Vec<u8>>,
) -> Result<()>
where
    R: AsyncRead,
{
    let mut filter = TelnetFilter::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = remote.read(&mut buffer).await.map_err(ProxyError::Relay)?;
        if n == 0 {
            debug!("Telnet server closed the connection");
            return Ok(());
        }

        let mut data = Vec::with_capacity(n);
        let mut answer = Vec::new();
        filter.feed(&buffer[..n], &mut data, &mut answer);

        if !answer.is_empty() && replies.send(answer).await.is_err() {
            return Ok(());
        }
        if !data.is_empty() {
            writer.send(OutputKind::Stdout, Bytes::from(data)).await?;
        }
    }
}

async fn control_to_remote<W>(
    mut reader: ControlReader,
    mut remote: WriteHalf<W>,
    mut replies: mpsc::Receiver<Vec<u8>>,
) -> Result<()>
where
    W: AsyncWrite,
{
    loop {
        let bytes = tokio::select! {
            message = reader.recv() => match message {
                Some(message) => escape_iac(&message),
                None => {
                    debug!("Control channel closed");
                    return Ok(());
                }
            },
            Some(answer) = replies.recv() => answer,
        };

        remote.write_all(&bytes).await.map_err(ProxyError::Relay)?;
    }
}
