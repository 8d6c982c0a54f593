// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn session(socket: &str, user: &str, perms: &[Permission]) -> Session {
    Session {
        id: format!("sess-{socket}"),
        socket_id: socket.to_string(),
        user_id: user.to_string(),
        workspace_id: Some("w1".to_string()),
        permissions: perms.iter().copied().collect(),
    }
}

#[tokio::test]
async fn register_then_lookup_by_socket() {
    let registry = SessionRegistry::new();
    registry.register(session("s1", "alice", &[Permission::FileRead])).await;

    let found = registry.session_by_socket("s1").await.expect("session present");
    assert_eq!(found.user_id, "alice");
    assert!(found.has_permission(Permission::FileRead));
    assert!(!found.has_permission(Permission::FileWrite));
}

#[tokio::test]
async fn sessions_for_user_spans_sockets() {
    let registry = SessionRegistry::new();
    registry.register(session("s1", "alice", &[])).await;
    registry.register(session("s2", "alice", &[])).await;
    registry.register(session("s3", "bob", &[])).await;

    let alice_sessions = registry.sessions_for_user("alice").await;
    assert_eq!(alice_sessions.len(), 2);
}

#[tokio::test]
async fn unregister_removes_from_both_indexes() {
    let registry = SessionRegistry::new();
    registry.register(session("s1", "alice", &[])).await;

    let removed = registry.unregister("s1").await;
    assert!(removed.is_some());
    assert!(registry.session_by_socket("s1").await.is_none());
    assert_eq!(registry.sessions_for_user("alice").await.len(), 0);
}

#[tokio::test]
async fn unregister_unknown_socket_is_none() {
    let registry = SessionRegistry::new();
    assert!(registry.unregister("ghost").await.is_none());
}
