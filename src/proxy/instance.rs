//! Runtime state of one forwarding rule

use log::info;

use crate::common::{ProxyStatus, Result};
use super::acceptor::{spawn_acceptor, AcceptorHandle, RelaySettings, RelayTarget};
use super::listener::Listener;
use super::rule::{ProxyDefinition, ProxyRecord};
use super::session::SessionCounter;

/// A rule definition plus its listener state
///
/// The instance is Started exactly while it owns a live acceptor.
#[derive(Debug)]
pub struct ProxyInstance {
    definition: ProxyDefinition,
    sessions: SessionCounter,
    acceptor: Option<AcceptorHandle>,
    generation: u64,
}

impl ProxyInstance {
    /// Create a stopped instance with no sessions
    pub fn new(definition: ProxyDefinition) -> Self {
        Self {
            definition,
            sessions: SessionCounter::new(),
            acceptor: None,
            generation: 0,
        }
    }

    /// Current definition
    pub fn definition(&self) -> &ProxyDefinition {
        &self.definition
    }

    /// Replace the definition without touching the listener
    pub fn set_definition(&mut self, definition: ProxyDefinition) {
        self.definition = definition;
    }

    /// Current status
    ///
    /// An acceptor that exited on its own no longer counts as started.
    pub fn status(&self) -> ProxyStatus {
        match &self.acceptor {
            Some(handle) if !handle.is_finished() => ProxyStatus::Started,
            _ => ProxyStatus::Stopped,
        }
    }

    /// Number of live relay sessions
    pub fn sessions(&self) -> usize {
        self.sessions.get()
    }

    /// Number of successful starts so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Snapshot for listing and persistence
    pub fn record(&self) -> ProxyRecord {
        ProxyRecord {
            definition: self.definition.clone(),
            status: self.status(),
            instances: self.sessions(),
        }
    }

    /// Bind the local endpoint and spawn the acceptor
    ///
    /// Starting a started instance does nothing.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Bind` if the listener cannot be created; the
    /// instance stays stopped.
    pub async fn start(&mut self, settings: RelaySettings) -> Result<()> {
        if self.status() == ProxyStatus::Started {
            return Ok(());
        }

        // Reap an acceptor that exited on its own
        if let Some(stale) = self.acceptor.take() {
            stale.stop().await;
        }

        let listener = Listener::bind(self.definition.protocol, &self.definition.local_addr()).await?;
        info!("Proxy {} started, listening on {}", self.definition, listener.local_addr());

        let target = RelayTarget::new(&self.definition, settings);
        self.acceptor = Some(spawn_acceptor(listener, target, self.sessions.clone()));
        self.generation += 1;
        Ok(())
    }

    /// Close the listener and wait for the acceptor to exit
    ///
    /// Relay sessions already running are not interrupted.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.acceptor.take() {
            handle.stop().await;
            info!("Proxy {} stopped ({} sessions still active)", self.definition, self.sessions());
        }
    }

    /// Stop, then start again with the current definition
    pub async fn restart(&mut self, settings: RelaySettings) -> Result<()> {
        self.stop().await;
        self.start(settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ProxyError;
    use tokio::net::TcpListener;

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let port = free_port().await;
        let mut instance = ProxyInstance::new(ProxyDefinition::new("127.0.0.1", port, "127.0.0.1", 9));
        assert_eq!(instance.status(), ProxyStatus::Stopped);

        instance.start(RelaySettings::default()).await.unwrap();
        instance.start(RelaySettings::default()).await.unwrap();
        assert_eq!(instance.status(), ProxyStatus::Started);
        assert_eq!(instance.generation(), 1);

        instance.restart(RelaySettings::default()).await.unwrap();
        assert_eq!(instance.generation(), 2);

        instance.stop().await;
        instance.stop().await;
        assert_eq!(instance.status(), ProxyStatus::Stopped);
    }

    #[tokio::test]
    async fn test_start_failure_stays_stopped() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let mut instance = ProxyInstance::new(ProxyDefinition::new("127.0.0.1", port, "127.0.0.1", 9));
        let result = instance.start(RelaySettings::default()).await;
        assert!(matches!(result, Err(ProxyError::Bind { .. })));
        assert_eq!(instance.status(), ProxyStatus::Stopped);
        assert_eq!(instance.record().status, ProxyStatus::Stopped);
    }
}
