// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The axum WebSocket upgrade handler and per-socket event loop: the
//! concrete realization of an ordered, reliable, message-oriented channel
//! carrying the gateway's full request/response/event envelope.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::app::AppState;
use crate::dispatcher::Request;
use crate::session::{Permission, Session};
use crate::transport::auth::validate_token;

/// Query parameters on the WebSocket upgrade. The core does not
/// authenticate; it consumes whatever identity and permission set an
/// upstream identity layer already established — here, expressed as
/// upgrade query parameters for a runnable standalone gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "workspaceId")]
    pub workspace_id: Option<String>,
    /// Comma-separated permission tags, e.g. `FILE_READ,TERMINAL_CREATE`.
    #[serde(default)]
    pub permissions: String,
}

fn parse_permission(tag: &str) -> Option<Permission> {
    match tag.trim() {
        "FILE_READ" => Some(Permission::FileRead),
        "FILE_WRITE" => Some(Permission::FileWrite),
        "FILE_DELETE" => Some(Permission::FileDelete),
        "TERMINAL_CREATE" => Some(Permission::TerminalCreate),
        "TERMINAL_WRITE" => Some(Permission::TerminalWrite),
        "ASSISTANT_SPAWN" => Some(Permission::AssistantSpawn),
        "ASSISTANT_CONTROL" => Some(Permission::AssistantControl),
        "WORKSPACE_MANAGE" => Some(Permission::WorkspaceManage),
        _ => None,
    }
}

/// `GET /ws` — WebSocket upgrade for a gateway client.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if !validate_token(query.token.as_deref(), state.config.auth_token.as_deref()) {
        return axum::http::Response::builder()
            .status(401)
            .body(axum::body::Body::from("unauthorized"))
            .unwrap_or_default()
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_ws(socket, state, query)).into_response()
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>, query: WsQuery) {
    let socket_id = uuid::Uuid::new_v4().to_string();
    let session_id = uuid::Uuid::new_v4().to_string();
    let permissions = query.permissions.split(',').filter_map(parse_permission).collect();

    let session = Session {
        id: session_id,
        socket_id: socket_id.clone(),
        user_id: query.user_id,
        workspace_id: query.workspace_id,
        permissions,
    };
    state.dispatcher.sessions.register(session).await;
    let mut event_rx = state.events.register(socket_id.clone()).await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let request: Request = match serde_json::from_str(&text) {
                            Ok(r) => r,
                            Err(e) => {
                                tracing::debug!(error = %e, "malformed request envelope, dropping");
                                continue;
                            }
                        };
                        let response = state.dispatcher.dispatch(&socket_id, request, Arc::clone(&state.events)).await;
                        let Ok(text) = serde_json::to_string(&response) else { continue };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.events.unregister(&socket_id).await;
    state.dispatcher.cleanup_socket(&socket_id).await;
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
