// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only cross-session patch exchange: an in-memory,
//! per-`(userId, workspaceId)` store with cross-session fan-out.
//! Persistence is an explicit implementation choice left open; in-memory is
//! sufficient since patches are also delivered live via `sync:patches`.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{ErrorCode, GatewayError};
use crate::events::{EventBus, GatewayEvent};
use crate::session::{Session, SessionRegistry};

/// Advisory threshold past which `pull` flags its response `compressed`.
const COMPRESSED_COUNT_THRESHOLD: usize = 10;
const COMPRESSED_BYTES_THRESHOLD: usize = 10 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    #[serde(rename = "entityType")]
    pub entity_type: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "receivedAt")]
    pub received_at: i64,
    #[serde(flatten)]
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub total_patches: usize,
    pub patches_by_type: HashMap<String, usize>,
    pub oldest_patch: Option<i64>,
    pub newest_patch: Option<i64>,
}

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn store_key(user_id: &str, workspace_key: &str) -> String {
    format!("{user_id}:{workspace_key}")
}

/// A compressed patch entry is a base64 string wrapping zstd-compressed JSON.
fn decompress_patch(value: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
    let encoded = value
        .as_str()
        .ok_or_else(|| GatewayError::new(ErrorCode::SyncError, "compressed patch entry must be a base64 string"))?;
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| GatewayError::new(ErrorCode::SyncError, format!("invalid base64 patch: {e}")))?;
    let json_bytes = zstd::decode_all(compressed.as_slice())
        .map_err(|e| GatewayError::new(ErrorCode::SyncError, format!("failed to decompress patch: {e}")))?;
    serde_json::from_slice(&json_bytes)
        .map_err(|e| GatewayError::new(ErrorCode::SyncError, format!("decompressed patch is not valid JSON: {e}")))
}

#[derive(Default)]
struct Store {
    patches: Vec<Patch>,
}

/// One append-only `Vec<Patch>` per `(userId, workspaceId)`; each entry's own
/// position in `stores` is protected independently so two users' pushes
/// never contend. Fan-out uses `SessionRegistry` + `EventBus`, both already
/// best-effort by construction.
#[derive(Default)]
pub struct SyncHub {
    stores: Mutex<HashMap<String, Store>>,
}

impl SyncHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// `sync:push`. When `compressed` is set, each entry of `patches` is a
    /// base64 string wrapping a zstd-compressed JSON patch body rather than
    /// the body itself; decompress each one back to its `Value` before
    /// enriching. Uncompressed bodies pass straight through.
    pub async fn push(
        &self,
        session: &Session,
        patches: Vec<serde_json::Value>,
        compressed: bool,
        registry: &SessionRegistry,
        events: &EventBus,
    ) -> Result<(), GatewayError> {
        let key = store_key(&session.user_id, &session.workspace_key());
        let received_at = now_millis();

        let bodies: Vec<serde_json::Value> =
            if compressed { patches.into_iter().map(decompress_patch).collect::<Result<_, _>>()? } else { patches };

        let enriched: Vec<Patch> = bodies
            .into_iter()
            .map(|body| {
                let entity_type = body.get("entityType").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
                Patch { entity_type, user_id: session.user_id.clone(), session_id: session.id.clone(), received_at, body }
            })
            .collect();

        {
            let mut stores = self.stores.lock().await;
            stores.entry(key).or_default().patches.extend(enriched.clone());
        }

        let siblings = registry.sessions_for_user(&session.user_id).await;
        let values: Vec<serde_json::Value> =
            enriched.iter().filter_map(|p| serde_json::to_value(p).ok()).collect();
        for sibling in siblings {
            if sibling.id == session.id || sibling.workspace_key() != session.workspace_key() {
                continue;
            }
            events
                .emit(
                    &sibling.socket_id,
                    GatewayEvent::SyncPatches { patches: values.clone(), from: session.id.clone() },
                )
                .await;
        }

        Ok(())
    }

    /// `sync:pull`. Excludes patches authored by the calling session.
    pub async fn pull(
        &self,
        session: &Session,
        since: Option<i64>,
        types: Option<Vec<String>>,
    ) -> (Vec<Patch>, bool) {
        let key = store_key(&session.user_id, &session.workspace_key());
        let stores = self.stores.lock().await;
        let Some(store) = stores.get(&key) else {
            return (Vec::new(), false);
        };

        let matched: Vec<Patch> = store
            .patches
            .iter()
            .filter(|p| p.session_id != session.id)
            .filter(|p| since.is_none_or(|s| p.received_at > s))
            .filter(|p| types.as_ref().is_none_or(|ts| ts.contains(&p.entity_type)))
            .cloned()
            .collect();

        let serialized_len = serde_json::to_vec(&matched).map(|v| v.len()).unwrap_or(0);
        let compressed = matched.len() > COMPRESSED_COUNT_THRESHOLD || serialized_len > COMPRESSED_BYTES_THRESHOLD;
        (matched, compressed)
    }

    /// `sync:status`.
    pub async fn status(&self, session: &Session) -> SyncStatus {
        let key = store_key(&session.user_id, &session.workspace_key());
        let stores = self.stores.lock().await;
        let Some(store) = stores.get(&key) else {
            return SyncStatus::default();
        };

        let mut patches_by_type = HashMap::new();
        for patch in &store.patches {
            *patches_by_type.entry(patch.entity_type.clone()).or_insert(0) += 1;
        }

        SyncStatus {
            total_patches: store.patches.len(),
            patches_by_type,
            oldest_patch: store.patches.first().map(|p| p.received_at),
            newest_patch: store.patches.last().map(|p| p.received_at),
        }
    }
}

#[cfg(test)]
#[path = "sync_hub_tests.rs"]
mod tests;
