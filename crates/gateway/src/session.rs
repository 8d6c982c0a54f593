// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lookup and permission checks. Pure in-memory bookkeeping, no I/O:
//! a read-mostly registry keyed by socket, with a secondary per-user index
//! for fan-out to a user's other live connections.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

pub type SocketId = String;
pub type UserId = String;
pub type SessionId = String;

/// Static per-session permission tags, checked before any side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    FileRead,
    FileWrite,
    FileDelete,
    TerminalCreate,
    TerminalWrite,
    AssistantSpawn,
    AssistantControl,
    WorkspaceManage,
}

/// A session bound to a socket, a user identity, and an optional workspace.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub socket_id: SocketId,
    pub user_id: UserId,
    pub workspace_id: Option<String>,
    pub permissions: HashSet<Permission>,
}

impl Session {
    pub fn has_permission(&self, perm: Permission) -> bool {
        self.permissions.contains(&perm)
    }

    /// Key used by `SyncHub` to group patches: workspace id, or a stable
    /// "default" bucket when the session has none.
    pub fn workspace_key(&self) -> String {
        self.workspace_id.clone().unwrap_or_else(|| "default".to_string())
    }
}

/// Maps socket identifier to session, and user identifier to the set of
/// sockets that user currently has live. Pure lookup; no I/O; thread-safety
/// is concurrent-readers/rare-writers via `RwLock`.
#[derive(Default)]
pub struct SessionRegistry {
    by_socket: RwLock<HashMap<SocketId, Arc<Session>>>,
    by_user: RwLock<HashMap<UserId, HashSet<SocketId>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly-established session (the core does not
    /// authenticate; it only consumes what the transport layer hands it).
    pub async fn register(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.by_socket.write().await.insert(session.socket_id.clone(), Arc::clone(&session));
        self.by_user
            .write()
            .await
            .entry(session.user_id.clone())
            .or_default()
            .insert(session.socket_id.clone());
        session
    }

    /// Remove the session bound to a socket (invoked on disconnect). Returns
    /// the removed session, if any, so callers can cascade cleanup.
    pub async fn unregister(&self, socket_id: &str) -> Option<Arc<Session>> {
        let session = self.by_socket.write().await.remove(socket_id)?;
        if let Some(sockets) = self.by_user.write().await.get_mut(&session.user_id) {
            sockets.remove(socket_id);
        }
        Some(session)
    }

    pub async fn session_by_socket(&self, socket_id: &str) -> Option<Arc<Session>> {
        self.by_socket.read().await.get(socket_id).cloned()
    }

    pub async fn sessions_for_user(&self, user_id: &str) -> Vec<Arc<Session>> {
        let by_socket = self.by_socket.read().await;
        let Some(sockets) = self.by_user.read().await.get(user_id).cloned() else {
            return Vec::new();
        };
        sockets.iter().filter_map(|s| by_socket.get(s).cloned()).collect()
    }

    pub fn has_permission(&self, session: &Session, perm: Permission) -> bool {
        session.has_permission(perm)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
