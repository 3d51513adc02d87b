//! Forwarding rule definitions
//!
//! A rule binds a local endpoint to a remote endpoint. [`ProxyDefinition`]
//! holds the user-supplied fields; [`ProxyRecord`] adds the runtime fields
//! that are reported by the registry and written to the rule file.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::common::net::endpoint_addr;
use crate::common::{Protocol, ProxyError, ProxyId, ProxyStatus, Result};

/// Interactive terminal backend reachable through a rule's remote endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TermType {
    /// No terminal bridge for this rule
    #[default]
    None,
    /// SSH with inline password authentication
    Ssh,
    /// Raw telnet
    Telnet,
}

impl fmt::Display for TermType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermType::None => write!(f, "none"),
            TermType::Ssh => write!(f, "ssh"),
            TermType::Telnet => write!(f, "telnet"),
        }
    }
}

impl FromStr for TermType {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "ssh" => Ok(Self::Ssh),
            "telnet" => Ok(Self::Telnet),
            _ => Err(ProxyError::Validation(format!(
                "Invalid terminal type: {}. Valid values are: ssh, telnet, none",
                s
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for TermType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TermType::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Rule files written by older versions carry `"Type": ""` for tcp
fn deserialize_protocol<'de, D>(deserializer: D) -> std::result::Result<Protocol, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Protocol::from_str(&s).map_err(serde::de::Error::custom)
}

/// User-supplied fields of a forwarding rule
///
/// Capitalized field names are accepted as aliases when loading.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyDefinition {
    /// Rule identifier, assigned by the registry
    #[serde(default, alias = "Id")]
    pub id: ProxyId,

    /// Local listen host (socket path for unix rules)
    #[serde(default, alias = "LocalIp")]
    pub local_ip: String,

    /// Local listen port
    #[serde(default, alias = "LocalPort")]
    pub local_port: u16,

    /// Remote host (socket path for unix rules)
    #[serde(default, alias = "RemoteIp")]
    pub remote_ip: String,

    /// Remote port
    #[serde(default, alias = "RemotePort")]
    pub remote_port: u16,

    /// Transport protocol
    #[serde(rename = "type", default, alias = "Type", deserialize_with = "deserialize_protocol")]
    pub protocol: Protocol,

    /// Terminal backend for the bridge
    #[serde(default, alias = "TermType")]
    pub term_type: TermType,

    /// Free-text description
    #[serde(default, alias = "Desc")]
    pub desc: String,
}

impl ProxyDefinition {
    /// Create a tcp rule without description or terminal
    pub fn new(local_ip: &str, local_port: u16, remote_ip: &str, remote_port: u16) -> Self {
        Self {
            local_ip: local_ip.to_string(),
            local_port,
            remote_ip: remote_ip.to_string(),
            remote_port,
            ..Default::default()
        }
    }

    /// Set the protocol
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the terminal type
    pub fn with_term_type(mut self, term_type: TermType) -> Self {
        self.term_type = term_type;
        self
    }

    /// Set the description
    pub fn with_desc(mut self, desc: &str) -> Self {
        self.desc = desc.to_string();
        self
    }

    /// Normalize user input: surrounding whitespace is not part of a host
    pub fn apply_defaults(&mut self) {
        let trimmed = self.local_ip.trim();
        if trimmed.len() != self.local_ip.len() {
            self.local_ip = trimmed.to_string();
        }
        let trimmed = self.remote_ip.trim();
        if trimmed.len() != self.remote_ip.len() {
            self.remote_ip = trimmed.to_string();
        }
    }

    /// Structural validation
    ///
    /// All problems are reported at once, one per line.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.local_ip.is_empty() {
            problems.push("No local ip");
        }
        if self.protocol.uses_port() && self.local_port == 0 {
            problems.push("Invalid local port");
        }
        if self.remote_ip.is_empty() {
            problems.push("No remote ip");
        }
        if self.protocol.uses_port() && self.remote_port == 0 {
            problems.push("Invalid remote port");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ProxyError::Validation(problems.join("\n")))
        }
    }

    /// Address the rule listens on
    pub fn local_addr(&self) -> String {
        endpoint_addr(self.protocol, &self.local_ip, self.local_port)
    }

    /// Address the rule forwards to
    pub fn remote_addr(&self) -> String {
        endpoint_addr(self.protocol, &self.remote_ip, self.remote_port)
    }

    /// Whether switching from `self` to `other` requires rebinding
    ///
    /// Description and terminal type are cosmetic for the relay engine.
    pub fn needs_restart(&self, other: &ProxyDefinition) -> bool {
        self.local_ip != other.local_ip
            || self.local_port != other.local_port
            || self.remote_ip != other.remote_ip
            || self.remote_port != other.remote_port
            || self.protocol != other.protocol
    }
}

impl fmt::Display for ProxyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} -> {}",
            self.id,
            self.protocol,
            self.local_addr(),
            self.remote_addr()
        )
    }
}

/// Snapshot of a rule as reported by the registry and persisted to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    /// Rule definition
    #[serde(flatten)]
    pub definition: ProxyDefinition,

    /// Runtime status; ignored on load
    #[serde(default, alias = "Status")]
    pub status: ProxyStatus,

    /// Active relay sessions; ignored on load
    #[serde(default, alias = "Instances")]
    pub instances: usize,
}

impl ProxyRecord {
    /// Rule identifier
    pub fn id(&self) -> ProxyId {
        self.definition.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reports_all_problems() {
        let def = ProxyDefinition::default();
        let err = def.validate().unwrap_err().to_string();
        assert!(err.contains("No local ip"));
        assert!(err.contains("Invalid local port"));
        assert!(err.contains("No remote ip"));
        assert!(err.contains("Invalid remote port"));

        let def = ProxyDefinition::new("127.0.0.1", 9000, "127.0.0.1", 22);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_unix_rule_ignores_ports() {
        let def = ProxyDefinition::new("/tmp/in.sock", 0, "/tmp/out.sock", 0)
            .with_protocol(Protocol::Unix);
        assert!(def.validate().is_ok());
        assert_eq!(def.local_addr(), "/tmp/in.sock");
    }

    #[test]
    fn test_needs_restart() {
        let base = ProxyDefinition::new("127.0.0.1", 9000, "127.0.0.1", 22);

        assert!(!base.needs_restart(&base.clone().with_desc("ssh jump")));
        assert!(!base.needs_restart(&base.clone().with_term_type(TermType::Ssh)));
        assert!(base.needs_restart(&ProxyDefinition::new("127.0.0.1", 9001, "127.0.0.1", 22)));
        assert!(base.needs_restart(&ProxyDefinition::new("127.0.0.1", 9000, "10.0.0.1", 22)));
        assert!(base.needs_restart(&base.clone().with_protocol(Protocol::Udp)));
    }

    #[test]
    fn test_record_json_shape() {
        let record = ProxyRecord {
            definition: ProxyDefinition {
                id: 3,
                ..ProxyDefinition::new("0.0.0.0", 2222, "10.0.0.5", 22)
                    .with_term_type(TermType::Ssh)
                    .with_desc("bastion")
            },
            status: ProxyStatus::Started,
            instances: 2,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["localIp"], "0.0.0.0");
        assert_eq!(value["localPort"], 2222);
        assert_eq!(value["remoteIp"], "10.0.0.5");
        assert_eq!(value["remotePort"], 22);
        assert_eq!(value["type"], "tcp");
        assert_eq!(value["termType"], "ssh");
        assert_eq!(value["desc"], "bastion");
        assert_eq!(value["status"], 1);
        assert_eq!(value["instances"], 2);
    }

    #[test]
    fn test_record_accepts_legacy_field_names() {
        let json = r#"{
            "Id": 7, "Status": 1, "LocalIp": "127.0.0.1", "LocalPort": 8022,
            "RemoteIp": "192.168.1.10", "RemotePort": 22, "Desc": "old",
            "Type": "", "Instances": 4
        }"#;

        let record: ProxyRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id(), 7);
        assert_eq!(record.definition.protocol, Protocol::Tcp);
        assert_eq!(record.definition.term_type, TermType::None);
        assert_eq!(record.definition.remote_addr(), "192.168.1.10:22");
        assert_eq!(record.status, ProxyStatus::Started);
        assert_eq!(record.instances, 4);
    }
}
