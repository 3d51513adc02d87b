//! Proxy registry
//!
//! The registry owns every [`ProxyInstance`], assigns rule ids and persists
//! the rule set. All mutating operations take one async lock for their whole
//! read-modify-write sequence, so `modify`'s compare-then-restart is atomic
//! and a concurrent `start` can never observe a half-swapped definition.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::{error, info, warn};
use tokio::sync::Mutex;

use crate::common::{ProxyError, ProxyId, ProxyStatus, Result};
use super::acceptor::RelaySettings;
use super::instance::ProxyInstance;
use super::rule::{ProxyDefinition, ProxyRecord};
use super::store::{read_records, write_records};

/// What `modify` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOutcome {
    /// The new definition equals the current one
    Unchanged,
    /// Descriptive fields changed; the listener was left alone
    Updated,
    /// Endpoints or protocol changed; the rule was restarted
    Restarted,
}

/// Operations accepted by [`ProxyRegistry::op`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start the rule
    Start,
    /// Stop the rule
    Stop,
    /// Delete the rule
    Del,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Start => write!(f, "start"),
            Action::Stop => write!(f, "stop"),
            Action::Del => write!(f, "del"),
        }
    }
}

impl FromStr for Action {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "del" | "delete" => Ok(Self::Del),
            _ => Err(ProxyError::Validation(format!(
                "Invalid op: {}. Valid values are: start, stop, del",
                s
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    instances: BTreeMap<ProxyId, ProxyInstance>,
    max_id: ProxyId,
}

impl RegistryState {
    fn next_id(&mut self) -> ProxyId {
        self.max_id += 1;
        self.max_id
    }

    fn instance_mut(&mut self, id: ProxyId) -> Result<&mut ProxyInstance> {
        self.instances.get_mut(&id).ok_or(ProxyError::NotFound(id))
    }
}

/// Owner of all forwarding rules
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    state: Mutex<RegistryState>,
    settings: RelaySettings,
}

impl ProxyRegistry {
    /// Create an empty registry
    ///
    /// # Parameters
    ///
    /// * `settings` - Relay tuning applied to every rule
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            settings,
        }
    }

    /// Relay tuning applied to every rule
    pub fn settings(&self) -> RelaySettings {
        self.settings
    }

    /// Add a stopped rule
    ///
    /// # Returns
    ///
    /// The id assigned to the rule.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Validation` for a malformed definition; no id is
    /// consumed in that case.
    pub async fn add(&self, mut definition: ProxyDefinition) -> Result<ProxyId> {
        definition.apply_defaults();
        definition.validate()?;

        let mut state = self.state.lock().await;
        let id = state.next_id();
        definition.id = id;

        info!("Proxy added: {}", definition);
        state.instances.insert(id, ProxyInstance::new(definition));
        Ok(id)
    }

    /// Snapshot of one rule
    pub async fn get(&self, id: ProxyId) -> Result<ProxyRecord> {
        let state = self.state.lock().await;
        state
            .instances
            .get(&id)
            .map(ProxyInstance::record)
            .ok_or(ProxyError::NotFound(id))
    }

    /// Snapshot of every rule, sorted by id
    pub async fn list(&self) -> Vec<ProxyRecord> {
        let state = self.state.lock().await;
        state.instances.values().map(ProxyInstance::record).collect()
    }

    /// Number of successful starts of a rule
    pub async fn generation(&self, id: ProxyId) -> Result<u64> {
        let state = self.state.lock().await;
        state
            .instances
            .get(&id)
            .map(ProxyInstance::generation)
            .ok_or(ProxyError::NotFound(id))
    }

    /// Start a rule; starting a started rule does nothing
    pub async fn start(&self, id: ProxyId) -> Result<ProxyRecord> {
        let mut state = self.state.lock().await;
        let instance = state.instance_mut(id)?;
        instance.start(self.settings).await?;
        Ok(instance.record())
    }

    /// Stop a rule and wait for its listener to close
    pub async fn stop(&self, id: ProxyId) -> Result<ProxyRecord> {
        let mut state = self.state.lock().await;
        let instance = state.instance_mut(id)?;
        instance.stop().await;
        Ok(instance.record())
    }

    /// Replace a rule's definition
    ///
    /// The id inside `definition` is ignored. When endpoints or protocol
    /// change, the rule is stopped and started again with the new
    /// definition. If that start fails the rule stays stopped, keeps the new
    /// definition and the bind error is returned.
    pub async fn modify(&self, id: ProxyId, mut definition: ProxyDefinition) -> Result<ModifyOutcome> {
        definition.id = id;
        definition.apply_defaults();
        definition.validate()?;

        let mut state = self.state.lock().await;
        let instance = state.instance_mut(id)?;

        if instance.definition() == &definition {
            return Ok(ModifyOutcome::Unchanged);
        }

        if !instance.definition().needs_restart(&definition) {
            info!("Proxy {} updated", definition);
            instance.set_definition(definition);
            return Ok(ModifyOutcome::Updated);
        }

        info!("Proxy {} changed to {}, restarting", instance.definition(), definition);
        instance.stop().await;
        instance.set_definition(definition);
        instance.start(self.settings).await?;
        Ok(ModifyOutcome::Restarted)
    }

    /// Stop a rule, then remove it
    pub async fn delete(&self, id: ProxyId) -> Result<()> {
        let mut state = self.state.lock().await;
        let instance = state.instance_mut(id)?;
        instance.stop().await;

        if let Some(instance) = state.instances.remove(&id) {
            info!("Proxy deleted: {}", instance.definition());
        }
        Ok(())
    }

    /// Dispatch a start, stop or delete
    ///
    /// # Returns
    ///
    /// The rule's status after the operation. A deleted rule reports
    /// `Stopped`.
    pub async fn op(&self, id: ProxyId, action: Action) -> Result<ProxyStatus> {
        match action {
            Action::Start => self.start(id).await.map(|record| record.status),
            Action::Stop => self.stop(id).await.map(|record| record.status),
            Action::Del => self.delete(id).await.map(|_| ProxyStatus::Stopped),
        }
    }

    /// Write every rule to `path`
    ///
    /// # Returns
    ///
    /// The number of rules written.
    pub async fn persist(&self, path: &Path) -> Result<usize> {
        let records = self.list().await;
        write_records(path, &records).await?;
        info!("Saved {} proxies to {}", records.len(), path.display());
        Ok(records.len())
    }

    /// Load rules from `path`
    ///
    /// Runtime fields in the file are ignored; every loaded rule starts out
    /// stopped with no sessions. A missing file loads nothing. When
    /// `auto_start` is set every loaded rule is started, and rules that fail
    /// to start are logged and left stopped.
    ///
    /// # Returns
    ///
    /// The number of rules loaded.
    pub async fn load(&self, path: &Path, auto_start: bool) -> Result<usize> {
        let Some(records) = read_records(path).await? else {
            info!("No proxy file at {}, starting empty", path.display());
            return Ok(0);
        };

        let mut state = self.state.lock().await;
        let mut loaded: BTreeMap<ProxyId, ProxyDefinition> = BTreeMap::new();
        let mut unnumbered = Vec::new();

        for record in records {
            let mut definition = record.definition;
            definition.apply_defaults();
            if let Err(e) = definition.validate() {
                warn!("Skipping invalid proxy {} in {}: {}", definition.id, path.display(), e);
                continue;
            }

            if definition.id == 0 {
                unnumbered.push(definition);
            } else if let Some(previous) = loaded.insert(definition.id, definition) {
                warn!("Duplicate proxy id {} in {}, keeping the later entry", previous.id, path.display());
            }
        }

        if let Some(&highest) = loaded.keys().next_back() {
            state.max_id = state.max_id.max(highest);
        }
        for mut definition in unnumbered {
            definition.id = state.next_id();
            loaded.insert(definition.id, definition);
        }

        let count = loaded.len();
        for (id, definition) in loaded {
            if let Some(mut previous) = state.instances.remove(&id) {
                previous.stop().await;
            }
            state.instances.insert(id, ProxyInstance::new(definition));
        }
        info!("Loaded {} proxies from {}", count, path.display());

        if auto_start {
            for instance in state.instances.values_mut() {
                if let Err(e) = instance.start(self.settings).await {
                    error!("Failed to start proxy {}: {}", instance.definition(), e);
                }
            }
        }

        Ok(count)
    }

    /// Stop every started rule
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        for instance in state.instances.values_mut() {
            instance.stop().await;
        }
        info!("All proxies stopped");
    }
}
