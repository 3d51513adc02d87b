//! Control-plane request and response types

use serde::{Deserialize, Serialize};

use crate::common::{Protocol, ProxyError, ProxyId, ProxyStatus};
use crate::proxy::{ProxyDefinition, TermType};

/// Result of a start/stop/delete/modify request
///
/// `result` is 0 on success and 1 on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpResult {
    pub result: u8,
    pub err_msg: String,
    pub id: ProxyId,
    pub status: ProxyStatus,
}

impl OpResult {
    /// Successful operation on rule `id`
    pub fn success(id: ProxyId, status: ProxyStatus) -> Self {
        Self {
            result: 0,
            err_msg: "Success".to_string(),
            id,
            status,
        }
    }

    /// Failed operation on rule `id`
    pub fn failure(id: ProxyId, status: ProxyStatus, err: &ProxyError) -> Self {
        Self {
            result: 1,
            err_msg: err.to_string(),
            id,
            status,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Query of the rule list endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub op: Option<String>,
}

/// Query selecting a rule and an optional operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyQuery {
    pub id: Option<String>,
    pub op: Option<String>,
}

impl ProxyQuery {
    /// Parsed rule id
    pub fn id(&self) -> Result<ProxyId, String> {
        parse_id(self.id.as_deref())
    }
}

/// Query of the websocket endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsQuery {
    pub op: Option<String>,
    pub id: Option<String>,
}

pub(crate) fn parse_id(id: Option<&str>) -> Result<ProxyId, String> {
    match id.map(str::trim) {
        None | Some("") => Err("Param id missing".to_string()),
        Some(raw) => raw.parse().map_err(|_| format!("Invalid id: {}", raw)),
    }
}

/// Rule fields submitted as query parameters
///
/// Lower-case names are what the web UI sends; the JSON field names are
/// accepted too.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyForm {
    pub id: Option<String>,
    #[serde(alias = "localIp")]
    pub localip: Option<String>,
    #[serde(alias = "localPort")]
    pub localport: Option<String>,
    #[serde(alias = "remoteIp")]
    pub remoteip: Option<String>,
    #[serde(alias = "remotePort")]
    pub remoteport: Option<String>,
    #[serde(rename = "type")]
    pub protocol: Option<String>,
    #[serde(alias = "termType")]
    pub termtype: Option<String>,
    pub desc: Option<String>,
}

fn parse_port(name: &str, value: Option<&str>, required: bool) -> Result<u16, String> {
    match value.map(str::trim) {
        None | Some("") if required => Err(format!("Param {} missing", name)),
        None | Some("") => Ok(0),
        Some(raw) => raw.parse().map_err(|_| format!("Invalid {}: {}", name, raw)),
    }
}

impl ProxyForm {
    /// Build a definition, requiring an id when `with_id` is set
    ///
    /// All problems are reported at once, one per line.
    pub fn into_definition(self, with_id: bool) -> Result<ProxyDefinition, String> {
        let mut problems = Vec::new();

        let protocol = match self.protocol.as_deref().map(str::parse::<Protocol>) {
            None => Protocol::Tcp,
            Some(Ok(protocol)) => protocol,
            Some(Err(e)) => {
                problems.push(e.to_string());
                Protocol::Tcp
            }
        };

        let term_type = match self.termtype.as_deref().map(str::parse::<TermType>) {
            None => TermType::None,
            Some(Ok(term_type)) => term_type,
            Some(Err(e)) => {
                problems.push(e.to_string());
                TermType::None
            }
        };

        let id = if with_id {
            parse_id(self.id.as_deref()).unwrap_or_else(|e| {
                problems.push(e);
                0
            })
        } else {
            0
        };

        let local_port = parse_port("localport", self.localport.as_deref(), protocol.uses_port())
            .unwrap_or_else(|e| {
                problems.push(e);
                0
            });
        let remote_port = parse_port("remoteport", self.remoteport.as_deref(), protocol.uses_port())
            .unwrap_or_else(|e| {
                problems.push(e);
                0
            });

        let local_ip = self.localip.unwrap_or_default();
        if local_ip.trim().is_empty() {
            problems.push("Param localip missing".to_string());
        }
        let remote_ip = self.remoteip.unwrap_or_default();
        if remote_ip.trim().is_empty() {
            problems.push("Param remoteip missing".to_string());
        }

        if !problems.is_empty() {
            return Err(problems.join("\n"));
        }

        Ok(ProxyDefinition {
            id,
            local_ip,
            local_port,
            remote_ip,
            remote_port,
            protocol,
            term_type,
            desc: self.desc.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_result_shape() {
        let value = serde_json::to_value(OpResult::success(4, ProxyStatus::Started)).unwrap();
        assert_eq!(value["result"], 0);
        assert_eq!(value["errMsg"], "Success");
        assert_eq!(value["id"], 4);
        assert_eq!(value["status"], 1);

        let err = ProxyError::NotFound(9);
        let value = serde_json::to_value(OpResult::failure(9, ProxyStatus::Stopped, &err)).unwrap();
        assert_eq!(value["result"], 1);
        assert_eq!(value["errMsg"], "Proxy 9 not exist");
    }

    #[test]
    fn test_form_into_definition() {
        let form = ProxyForm {
            localip: Some("0.0.0.0".to_string()),
            localport: Some("2222".to_string()),
            remoteip: Some("10.0.0.5".to_string()),
            remoteport: Some("22".to_string()),
            termtype: Some("ssh".to_string()),
            desc: Some("bastion".to_string()),
            ..Default::default()
        };

        let def = form.into_definition(false).unwrap();
        assert_eq!(def.local_port, 2222);
        assert_eq!(def.remote_addr(), "10.0.0.5:22");
        assert_eq!(def.term_type, TermType::Ssh);
        assert_eq!(def.protocol, Protocol::Tcp);
    }

    #[test]
    fn test_form_reports_every_problem() {
        let form = ProxyForm {
            localport: Some("abc".to_string()),
            ..Default::default()
        };

        let err = form.into_definition(true).unwrap_err();
        assert!(err.contains("Param id missing"));
        assert!(err.contains("Invalid localport: abc"));
        assert!(err.contains("Param remoteport missing"));
        assert!(err.contains("Param localip missing"));
        assert!(err.contains("Param remoteip missing"));
    }

    #[test]
    fn test_unix_form_needs_no_ports() {
        let form = ProxyForm {
            localip: Some("/tmp/in.sock".to_string()),
            remoteip: Some("/tmp/out.sock".to_string()),
            protocol: Some("unix".to_string()),
            ..Default::default()
        };
        assert!(form.into_definition(false).is_ok());
    }
}
