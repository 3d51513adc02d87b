//! Websocket endpoint
//!
//! Adapts an axum [`WebSocket`] to a [`ControlChannel`]: every websocket
//! message becomes one inbound control message and every outbound control
//! message becomes one websocket message.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::debug;

use crate::common::first_completion;
use crate::control::error::{ControlError, ControlResult};
use crate::control::server::AppState;
use crate::control::types::{parse_id, WsQuery};
use crate::terminal::{ControlChannel, ControlPeer, Outbound, TerminalBridge};

/// `/ws?op=termconnect&id=N` or `/ws?op=wscomm`
///
/// Parameters are checked before the upgrade so that an unknown rule is
/// answered with a plain 404.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    upgrade: Option<WebSocketUpgrade>,
) -> ControlResult<Response> {
    debug!("Websocket request: op={:?} id={:?}", query.op, query.id);

    match query.op.as_deref().unwrap_or("") {
        "termconnect" => {
            let id = parse_id(query.id.as_deref()).map_err(ControlError::BadRequest)?;
            state.registry.get(id).await?;

            let upgrade = require_upgrade(upgrade)?;
            let bridge = state.bridge.clone();
            Ok(upgrade.on_upgrade(move |socket| async move {
                let (channel, peer) = ControlChannel::pair();
                let _ = tokio::join!(bridge.connect(id, channel), pump(socket, peer));
            }))
        }
        "wscomm" => {
            let upgrade = require_upgrade(upgrade)?;
            Ok(upgrade.on_upgrade(|socket| async move {
                let (channel, peer) = ControlChannel::pair();
                let _ = tokio::join!(TerminalBridge::echo(channel), pump(socket, peer));
            }))
        }
        other => Err(ControlError::BadRequest(format!("Unknown operation: {}", other))),
    }
}

fn require_upgrade(upgrade: Option<WebSocketUpgrade>) -> ControlResult<WebSocketUpgrade> {
    upgrade.ok_or_else(|| ControlError::BadRequest("Websocket upgrade required".to_string()))
}

/// Shuttle messages between `socket` and `peer` until either side closes
async fn pump(socket: WebSocket, peer: ControlPeer) {
    let (mut sink, mut stream) = socket.split();
    let (inbound, mut outbound) = peer.split();

    let to_socket = async move {
        while let Some(message) = outbound.recv().await {
            let data = match message {
                Outbound::Data(_, data) => data,
                Outbound::Close => break,
            };
            let message = match String::from_utf8(data.to_vec()) {
                Ok(text) => Message::Text(text),
                Err(e) => Message::Binary(e.into_bytes()),
            };
            if sink.send(message).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    };

    let from_socket = async move {
        while let Some(Ok(message)) = stream.next().await {
            let data = match message {
                Message::Text(text) => Bytes::from(text),
                Message::Binary(data) => Bytes::from(data),
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            if inbound.send(data).await.is_err() {
                break;
            }
        }
    };

    first_completion(to_socket, from_socket).await;
    debug!("Websocket closed");
}
