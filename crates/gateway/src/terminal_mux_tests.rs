// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;

use super::*;
use crate::host_bridge::NullHostBridge;

fn create_request(socket_id: &str) -> CreateRequest {
    CreateRequest {
        session_id: "sess-1".into(),
        socket_id: socket_id.into(),
        cols: 80,
        rows: 24,
        cwd: Some("/tmp".into()),
        env: HashMap::new(),
        name: None,
        global_workspace: None,
    }
}

#[tokio::test]
async fn write_then_destroy_forbids_further_writes() -> anyhow::Result<()> {
    std::env::set_var("SHELL", "/bin/sh");
    let mux = TerminalMux::new();
    let events = Arc::new(EventBus::new());
    let mut rx = events.register("s1".into()).await;

    let terminal_id = mux.create(create_request("s1"), Arc::clone(&events)).await?;

    mux.write(&terminal_id, "s1", b"echo hi\n".to_vec()).await?;

    let mut saw_hi = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            if let crate::events::GatewayEvent::TerminalData { data, .. } = event {
                let decoded = base64::engine::general_purpose::STANDARD.decode(&data)?;
                if String::from_utf8_lossy(&decoded).contains("hi") {
                    saw_hi = true;
                    break;
                }
            }
        }
    }
    assert!(saw_hi, "expected echoed output containing 'hi'");

    mux.destroy(&terminal_id, "s1").await?;

    let err = mux.write(&terminal_id, "s1", b"x".to_vec()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TerminalNotFound);

    Ok(())
}

#[tokio::test]
async fn destroy_kills_the_live_child_process() -> anyhow::Result<()> {
    std::env::set_var("SHELL", "/bin/sh");
    let mux = TerminalMux::new();
    let events = Arc::new(EventBus::new());
    let mut rx = events.register("s1".into()).await;

    let terminal_id = mux.create(create_request("s1"), Arc::clone(&events)).await?;
    mux.write(&terminal_id, "s1", b"echo pid:$$\n".to_vec()).await?;

    let mut child_pid: Option<i32> = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            if let crate::events::GatewayEvent::TerminalData { data, .. } = event {
                let decoded = base64::engine::general_purpose::STANDARD.decode(&data)?;
                let text = String::from_utf8_lossy(&decoded);
                if let Some(rest) = text.split("pid:").nth(1) {
                    if let Some(pid) = rest.split_whitespace().next().and_then(|s| s.parse::<i32>().ok()) {
                        child_pid = Some(pid);
                        break;
                    }
                }
            }
        }
    }
    let child_pid = child_pid.expect("expected to observe the shell's own pid in its echoed output");

    // The child is alive before destroy: signal 0 is a pure existence
    // check, it never actually delivers a signal.
    assert!(
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(child_pid), None).is_ok(),
        "child should be alive before destroy"
    );

    mux.destroy(&terminal_id, "s1").await?;

    // `kill`'s SIGHUP/SIGKILL pair plus its own 50ms grace period should
    // have reaped the process well within this deadline.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    let mut gone = false;
    while tokio::time::Instant::now() < deadline {
        if nix::sys::signal::kill(nix::unistd::Pid::from_raw(child_pid), None).is_err() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(gone, "destroy must leave no live child process");

    Ok(())
}

#[tokio::test]
async fn write_from_non_owning_socket_is_denied() -> anyhow::Result<()> {
    std::env::set_var("SHELL", "/bin/sh");
    let mux = TerminalMux::new();
    let events = Arc::new(EventBus::new());

    let terminal_id = mux.create(create_request("owner"), Arc::clone(&events)).await?;

    let err = mux.write(&terminal_id, "intruder", b"x".to_vec()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);

    mux.destroy(&terminal_id, "owner").await?;
    Ok(())
}

#[tokio::test]
async fn cleanup_socket_terminals_removes_all_entries() -> anyhow::Result<()> {
    std::env::set_var("SHELL", "/bin/sh");
    let mux = TerminalMux::new();
    let events = Arc::new(EventBus::new());

    let t1 = mux.create(create_request("s1"), Arc::clone(&events)).await?;
    let t2 = mux.create(create_request("s1"), Arc::clone(&events)).await?;

    mux.cleanup_socket_terminals("s1").await;

    assert_eq!(mux.write(&t1, "s1", vec![]).await.unwrap_err().code, ErrorCode::TerminalNotFound);
    assert_eq!(mux.write(&t2, "s1", vec![]).await.unwrap_err().code, ErrorCode::TerminalNotFound);
    Ok(())
}

#[tokio::test]
async fn list_includes_host_owned_entries() -> anyhow::Result<()> {
    std::env::set_var("SHELL", "/bin/sh");
    let mux = TerminalMux::new();
    let events = Arc::new(EventBus::new());
    let terminal_id = mux.create(create_request("s1"), Arc::clone(&events)).await?;

    let bridge = NullHostBridge;
    let list = mux.list(&bridge).await;
    assert!(list.iter().any(|t| t.id == terminal_id && !t.host_owned));

    mux.destroy(&terminal_id, "s1").await?;
    Ok(())
}
