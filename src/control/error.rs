//! Control-plane error types
//!
//! Maps registry and bridge failures onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::common::ProxyError;

/// Result type for control-plane handlers
pub type ControlResult<T> = Result<T, ControlError>;

/// Control-plane error types
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Malformed request parameters
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Error raised by the registry or the bridge
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub message: String,

    /// Optional detailed error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// HTTP status for a registry or bridge error
pub fn status_for(err: &ProxyError) -> StatusCode {
    match err {
        ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
        ProxyError::Validation(_) => StatusCode::BAD_REQUEST,
        ProxyError::Bind { .. } => StatusCode::CONFLICT,
        ProxyError::Dial { .. } | ProxyError::Bridge(_) => StatusCode::BAD_GATEWAY,
        ProxyError::Persistence(_)
        | ProxyError::Relay(_)
        | ProxyError::Io(_)
        | ProxyError::Config(_)
        | ProxyError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ControlError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ControlError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ControlError::Proxy(err) => status_for(err),
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match status {
            StatusCode::NOT_FOUND => "Resource not found",
            StatusCode::BAD_REQUEST => "Bad request",
            StatusCode::CONFLICT => "Conflict",
            StatusCode::BAD_GATEWAY => "Upstream error",
            _ => "Internal server error",
        };

        if status.is_server_error() {
            log::error!("Control request failed: {}", self);
        }

        let body = ErrorResponse {
            message: message.to_string(),
            details: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ControlError::from(ProxyError::NotFound(1)).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ControlError::from(ProxyError::Validation("No local ip".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        let bind = ProxyError::Bind {
            protocol: "tcp".to_string(),
            addr: "127.0.0.1:1".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(ControlError::from(bind).status(), StatusCode::CONFLICT);
        assert_eq!(
            ControlError::from(ProxyError::Persistence("disk full".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ControlError::BadRequest("x".to_string()).status(), StatusCode::BAD_REQUEST);
    }
}
