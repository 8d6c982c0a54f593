// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asynchronous events pushed from components to the client that owns a
//! socket: an internally-tagged enum over the full outbound event set, with
//! `sync:patches` carrying the broadcast-style multi-patch payload the other
//! variants don't need.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

use crate::session::SocketId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventName", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    #[serde(rename = "TERMINAL_DATA")]
    TerminalData { terminal_id: String, data: String },
    #[serde(rename = "TERMINAL_EXIT")]
    TerminalExit { terminal_id: String, code: Option<i32>, signal: Option<i32> },
    #[serde(rename = "ASSISTANT_OUTPUT")]
    AssistantOutput { instance_id: String, data: String },
    #[serde(rename = "ASSISTANT_EXIT")]
    AssistantExit { instance_id: String, code: Option<i32>, signal: Option<i32> },
    #[serde(rename = "ASSISTANT_ERROR")]
    AssistantError { instance_id: String, error: String },
    #[serde(rename = "ASSISTANT_RESPONSE_COMPLETE")]
    AssistantResponseComplete { instance_id: String },
    #[serde(rename = "sync:patches")]
    SyncPatches { patches: Vec<serde_json::Value>, from: String },
    #[serde(rename = "FILE_CHANGE")]
    FileChange { path: String, kind: String },
}

/// Per-socket outbound queue registry. A component that wants to push an
/// event to a specific socket looks up its sender here and sends
/// (best-effort: a send failure just means the socket is gone, and is
/// logged, not surfaced — fan-out to siblings is best-effort by design.
#[derive(Default)]
pub struct EventBus {
    senders: RwLock<HashMap<SocketId, mpsc::UnboundedSender<GatewayEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, socket_id: SocketId) -> mpsc::UnboundedReceiver<GatewayEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().await.insert(socket_id, tx);
        rx
    }

    pub async fn unregister(&self, socket_id: &str) {
        self.senders.write().await.remove(socket_id);
    }

    /// Best-effort emit: a missing or closed socket is silently dropped.
    pub async fn emit(&self, socket_id: &str, event: GatewayEvent) {
        if let Some(tx) = self.senders.read().await.get(socket_id) {
            let _ = tx.send(event);
        }
    }
}

pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
