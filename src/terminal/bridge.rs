//! Terminal bridge entry points

use std::sync::Arc;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::common::{ProxyError, ProxyId, Result};
use crate::proxy::ProxyRegistry;
use super::backend::{backend_for, TerminalSettings, TerminalTarget};
use super::channel::{ControlChannel, ControlReader, ControlWriter, OutputKind};

/// Bridges control channels to terminal sessions on registered rules
///
/// Bridge failures are reported on the control channel and never change
/// the registry.
#[derive(Debug, Clone)]
pub struct TerminalBridge {
    registry: Arc<ProxyRegistry>,
    settings: TerminalSettings,
}

impl TerminalBridge {
    /// Create a bridge over `registry`
    pub fn new(registry: Arc<ProxyRegistry>, settings: TerminalSettings) -> Self {
        Self { registry, settings }
    }

    /// Settings used for new sessions
    pub fn settings(&self) -> &TerminalSettings {
        &self.settings
    }

    /// Run a terminal session for rule `id` over `channel`
    ///
    /// The channel is closed when this returns.
    pub async fn connect(&self, id: ProxyId, channel: ControlChannel) -> Result<()> {
        let session = Uuid::new_v4();
        let (reader, writer) = channel.split();
        debug!("Terminal session {} for proxy {} opened", session, id);

        let result = self.run(id, reader, writer.clone()).await;
        match &result {
            Ok(()) => info!("Terminal session {} for proxy {} closed", session, id),
            Err(e) => {
                warn!("Terminal session {} for proxy {} failed: {}", session, id, e);
                let _ = writer.send_text(&format!("\r\n{}\r\n", e)).await;
            }
        }

        writer.close().await;
        result
    }

    async fn run(&self, id: ProxyId, reader: ControlReader, writer: ControlWriter) -> Result<()> {
        let record = self.registry.get(id).await?;
        let definition = &record.definition;

        let backend = backend_for(definition.term_type, &self.settings)
            .ok_or_else(|| ProxyError::Bridge(format!("Proxy {} has no terminal type", id)))?;
        debug!("Proxy {} bridged with {}", id, backend.name());

        backend.run(&TerminalTarget::from(definition), reader, writer).await
    }

    /// Echo every inbound message back until the channel closes
    pub async fn echo(channel: ControlChannel) -> Result<()> {
        let (mut reader, writer) = channel.split();

        while let Some(message) = reader.recv().await {
            if let Err(e) = writer.send(OutputKind::Stdout, message).await {
                debug!("Echo channel closed: {}", e);
                break;
            }
        }

        writer.close().await;
        Ok(())
    }
}
