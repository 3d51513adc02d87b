//! Control-plane request handlers
//!
//! Each handler is a thin adapter between HTTP and [`ProxyRegistry`].

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use log::{info, warn};

use crate::common::net::default_outbound_ip;
use crate::common::{ProxyError, ProxyId};
use crate::control::error::{status_for, ControlError, ControlResult};
use crate::control::server::AppState;
use crate::control::types::{HealthResponse, ListQuery, OpResult, ProxyForm, ProxyQuery};
use crate::proxy::{Action, ModifyOutcome, ProxyDefinition, ProxyRecord, ProxyRegistry};

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// List every rule
///
/// `op=save` persists the registry first; `op=defaultip` answers like
/// [`default_ip`].
pub async fn list_proxies(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ControlResult<Response> {
    match query.op.as_deref().unwrap_or("") {
        "" => {}
        "save" => {
            state.registry.persist(&state.config_file).await?;
        }
        "defaultip" => return default_ip().await.map(IntoResponse::into_response),
        other => return Err(ControlError::BadRequest(format!("Unknown operation: {}", other))),
    }

    Ok(Json(state.registry.list().await).into_response())
}

/// Primary outbound address of this host, as plain text
pub async fn default_ip() -> ControlResult<String> {
    Ok(default_outbound_ip().map_err(ProxyError::Io)?)
}

/// Get a rule, or start/stop it when `op` is given
pub async fn get_proxy(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> ControlResult<Response> {
    let id = query.id().map_err(ControlError::BadRequest)?;

    match query.op.as_deref().unwrap_or("") {
        "" => Ok(Json(state.registry.get(id).await?).into_response()),
        "start" => Ok(run_op(&state.registry, id, Action::Start).await),
        "stop" => Ok(run_op(&state.registry, id, Action::Stop).await),
        other => Err(ControlError::BadRequest(format!("Unknown operation: {}", other))),
    }
}

/// Delete a rule
pub async fn delete_proxy(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> ControlResult<Response> {
    let id = query.id().map_err(ControlError::BadRequest)?;
    Ok(run_op(&state.registry, id, Action::Del).await)
}

/// Dispatch `op` (start, stop, del) on a rule
pub async fn proxy_op(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> ControlResult<Response> {
    let id = query.id().map_err(ControlError::BadRequest)?;
    let action: Action = query
        .op
        .as_deref()
        .ok_or_else(|| ControlError::BadRequest("Param op missing".to_string()))?
        .parse()
        .map_err(|e: ProxyError| ControlError::BadRequest(e.to_string()))?;

    Ok(run_op(&state.registry, id, action).await)
}

/// Add a rule from a JSON body
pub async fn add_proxy(
    State(state): State<AppState>,
    Json(definition): Json<ProxyDefinition>,
) -> ControlResult<Json<ProxyRecord>> {
    add(&state.registry, definition).await
}

/// Add a rule from query parameters
pub async fn add_proxy_form(
    State(state): State<AppState>,
    Query(form): Query<ProxyForm>,
) -> ControlResult<Json<ProxyRecord>> {
    let definition = form.into_definition(false).map_err(ControlError::BadRequest)?;
    add(&state.registry, definition).await
}

/// Modify a rule from a JSON body
pub async fn modify_proxy(
    State(state): State<AppState>,
    Json(definition): Json<ProxyDefinition>,
) -> ControlResult<Response> {
    if definition.id == 0 {
        return Err(ControlError::BadRequest("Param id missing".to_string()));
    }
    Ok(modify(&state.registry, definition).await)
}

/// Modify a rule from query parameters
pub async fn modify_proxy_form(
    State(state): State<AppState>,
    Query(form): Query<ProxyForm>,
) -> ControlResult<Response> {
    let definition = form.into_definition(true).map_err(ControlError::BadRequest)?;
    Ok(modify(&state.registry, definition).await)
}

async fn add(registry: &ProxyRegistry, definition: ProxyDefinition) -> ControlResult<Json<ProxyRecord>> {
    let id = registry.add(definition).await?;
    Ok(Json(registry.get(id).await?))
}

async fn modify(registry: &ProxyRegistry, definition: ProxyDefinition) -> Response {
    let id = definition.id;

    match registry.modify(id, definition).await {
        Ok(outcome) => {
            if outcome == ModifyOutcome::Restarted {
                info!("Proxy {} restarted after modify", id);
            }
            let status = current_status(registry, id).await;
            (StatusCode::OK, Json(OpResult::success(id, status))).into_response()
        }
        Err(err) => failure(registry, id, "modify", err).await,
    }
}

async fn run_op(registry: &ProxyRegistry, id: ProxyId, action: Action) -> Response {
    match registry.op(id, action).await {
        Ok(status) => (StatusCode::OK, Json(OpResult::success(id, status))).into_response(),
        Err(err) => failure(registry, id, &action.to_string(), err).await,
    }
}

async fn failure(registry: &ProxyRegistry, id: ProxyId, what: &str, err: ProxyError) -> Response {
    warn!("Failed to {} proxy {}: {}", what, id, err);
    let status = current_status(registry, id).await;
    (status_for(&err), Json(OpResult::failure(id, status, &err))).into_response()
}

async fn current_status(registry: &ProxyRegistry, id: ProxyId) -> crate::common::ProxyStatus {
    registry
        .get(id)
        .await
        .map(|record| record.status)
        .unwrap_or_default()
}
