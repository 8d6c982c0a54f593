// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end gateway scenarios.
//!
//! Builds a real `AppState` + `Router` in-process, binds it to a loopback
//! TCP port, and exercises it over a genuine WebSocket connection — the
//! concrete channel the core's request/response/event envelope rides on.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gateway::app::AppState;
use gateway::config::GatewayConfig;
use gateway::host_bridge::HostBridge;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A `GatewayConfig` with every knob pinned to a value safe for tests:
/// loopback host, ephemeral port, no auth token, `/bin/sh` as a stand-in
/// assistant binary (so `assistant:spawn` exercises the owned-PTY path
/// without depending on a real assistant CLI being installed).
pub fn test_config(max_instances_per_user: usize) -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        auth_token: None,
        max_instances_per_user,
        assistant_binary: Some("/bin/sh".to_string()),
        user_config_path: None,
        log_format: "text".to_string(),
        log_level: "error".to_string(),
    }
}

/// Build the app state and serve it on a real loopback TCP socket. Returns
/// the bound address and the server's join handle (aborted on drop by the
/// caller discarding it, same as any other background task in tests).
pub async fn spawn_gateway(config: GatewayConfig, host_bridge: Arc<dyn HostBridge>) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let state = Arc::new(AppState::new(config, host_bridge));
    let router = gateway::transport::build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}

pub type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
pub type WsTx = futures_util::stream::SplitSink<WsStream, Message>;
pub type WsRx = futures_util::stream::SplitStream<WsStream>;

/// Build the `/ws` query string for a client identity: a user id, an
/// optional workspace, and a comma-separated permission tag list.
pub fn ws_query(user_id: &str, workspace_id: Option<&str>, permissions: &[&str]) -> String {
    let mut query = format!("userId={user_id}&permissions={}", permissions.join(","));
    if let Some(workspace_id) = workspace_id {
        query.push_str(&format!("&workspaceId={workspace_id}"));
    }
    query
}

pub async fn ws_connect(addr: &SocketAddr, query: &str) -> anyhow::Result<(WsTx, WsRx)> {
    let url = format!("ws://{addr}/ws?{query}");
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.map_err(|e| anyhow::anyhow!("ws connect: {e}"))?;
    Ok(stream.split())
}

pub async fn ws_send(tx: &mut WsTx, value: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    tx.send(Message::Text(text.into())).await.map_err(|e| anyhow::anyhow!("ws send: {e}"))
}

/// Receive and parse the next JSON message, skipping nothing — callers that
/// expect a specific event among several should loop `ws_recv` themselves.
pub async fn ws_recv(rx: &mut WsRx, timeout: Duration) -> anyhow::Result<serde_json::Value> {
    let msg = tokio::time::timeout(timeout, rx.next())
        .await
        .map_err(|_| anyhow::anyhow!("ws recv timeout"))?
        .ok_or_else(|| anyhow::anyhow!("ws stream closed"))?
        .map_err(|e| anyhow::anyhow!("ws recv: {e}"))?;

    match msg {
        Message::Text(text) => Ok(serde_json::from_str(&text)?),
        other => anyhow::bail!("expected a text ws message, got: {other:?}"),
    }
}

/// Receive messages until one matches `predicate`, or the overall timeout
/// elapses. Used for events that may be preceded by unrelated traffic
/// (e.g. a terminal may emit several `TERMINAL_DATA` chunks before one
/// contains the expected marker).
pub async fn ws_recv_until(
    rx: &mut WsRx,
    timeout: Duration,
    predicate: impl Fn(&serde_json::Value) -> bool,
) -> anyhow::Result<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        anyhow::ensure!(remaining > Duration::ZERO, "no matching message within {timeout:?}");
        let value = ws_recv(rx, remaining).await?;
        if predicate(&value) {
            return Ok(value);
        }
    }
}

pub fn decode_base64(data: &str) -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(data).unwrap_or_default()
}
