// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box scenario tests driving the gateway over a real WebSocket
//! connection, exactly as a remote client would.

use std::time::Duration;

use gateway::host_bridge::test_support::StubHostBridge;
use gateway::host_bridge::{HostInstanceStatus, NullHostBridge};
use gateway_specs::{decode_base64, spawn_gateway, test_config, ws_connect, ws_query, ws_recv, ws_recv_until, ws_send, RECV_TIMEOUT};
use std::sync::Arc;

fn request(id: &str, extra: serde_json::Value) -> serde_json::Value {
    let mut value = extra;
    value["id"] = serde_json::Value::String(id.to_string());
    value
}

// -- S1 Terminal lifecycle -----------------------------------------------------

#[tokio::test]
async fn s1_terminal_lifecycle() -> anyhow::Result<()> {
    std::env::set_var("SHELL", "/bin/sh");
    let (addr, _server) = spawn_gateway(test_config(10), Arc::new(NullHostBridge)).await?;
    let query = ws_query("user-a", None, &["TERMINAL_CREATE", "TERMINAL_WRITE"]);
    let (mut tx, mut rx) = ws_connect(&addr, &query).await?;

    ws_send(&mut tx, &request("c1", serde_json::json!({"verb": "terminal:create", "cols": 80, "rows": 24}))).await?;
    let created = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(created["success"], true, "{created}");
    let terminal_id = created["data"]["terminalId"].as_str().unwrap().to_string();

    ws_send(
        &mut tx,
        &request("w1", serde_json::json!({"verb": "terminal:write", "terminalId": terminal_id, "data": "echo hi\n"})),
    )
    .await?;
    let ack = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(ack["success"], true, "{ack}");

    let data_event = ws_recv_until(&mut rx, Duration::from_secs(2), |v| {
        v["eventName"] == "TERMINAL_DATA"
            && v["terminalId"] == terminal_id
            && String::from_utf8_lossy(&decode_base64(v["data"].as_str().unwrap_or(""))).contains("hi")
    })
    .await?;
    assert_eq!(data_event["terminalId"], terminal_id);

    ws_send(&mut tx, &request("d1", serde_json::json!({"verb": "terminal:destroy", "terminalId": terminal_id}))).await?;
    let destroy_ack = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(destroy_ack["success"], true, "{destroy_ack}");

    let exit_event = ws_recv_until(&mut rx, Duration::from_secs(1), |v| v["eventName"] == "TERMINAL_EXIT").await?;
    assert_eq!(exit_event["terminalId"], terminal_id);

    ws_send(&mut tx, &request("w2", serde_json::json!({"verb": "terminal:write", "terminalId": terminal_id, "data": "x"})))
        .await?;
    let denied = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(denied["success"], false);
    assert_eq!(denied["error"]["code"], "TERMINAL_NOT_FOUND");

    Ok(())
}

// -- S2 Cross-user isolation -----------------------------------------------------

#[tokio::test]
async fn s2_cross_user_isolation() -> anyhow::Result<()> {
    std::env::set_var("SHELL", "/bin/sh");
    let (addr, _server) = spawn_gateway(test_config(10), Arc::new(NullHostBridge)).await?;

    let (mut tx_a, mut rx_a) = ws_connect(&addr, &ws_query("user-a", None, &["ASSISTANT_SPAWN", "ASSISTANT_CONTROL"])).await?;
    let (mut tx_b, mut rx_b) = ws_connect(&addr, &ws_query("user-b", None, &["ASSISTANT_SPAWN", "ASSISTANT_CONTROL"])).await?;

    ws_send(
        &mut tx_a,
        &request(
            "sp1",
            serde_json::json!({"verb": "assistant:spawn", "instanceId": "inst-a", "workingDirectory": "/tmp"}),
        ),
    )
    .await?;
    let spawned = ws_recv(&mut rx_a, RECV_TIMEOUT).await?;
    assert_eq!(spawned["success"], true, "{spawned}");

    ws_send(&mut tx_b, &request("sd1", serde_json::json!({"verb": "assistant:send", "instanceId": "inst-a", "data": "x"}))).await?;
    let denied = ws_recv(&mut rx_b, RECV_TIMEOUT).await?;
    assert_eq!(denied["success"], false);
    assert_eq!(denied["error"]["code"], "ACCESS_DENIED");

    ws_send(&mut tx_b, &request("gi1", serde_json::json!({"verb": "assistant:getInstances"}))).await?;
    let instances = ws_recv(&mut rx_b, RECV_TIMEOUT).await?;
    assert!(instances["data"]["instances"].as_array().unwrap().iter().all(|i| i["instanceId"] != "inst-a"));

    Ok(())
}

// -- S3 Quota ---------------------------------------------------------------------

#[tokio::test]
async fn s3_quota_rejects_fourth_instance() -> anyhow::Result<()> {
    std::env::set_var("SHELL", "/bin/sh");
    let (addr, _server) = spawn_gateway(test_config(3), Arc::new(NullHostBridge)).await?;
    let (mut tx, mut rx) = ws_connect(&addr, &ws_query("user-a", None, &["ASSISTANT_SPAWN", "ASSISTANT_CONTROL"])).await?;

    for n in 1..=3 {
        let id = format!("inst-{n}");
        ws_send(
            &mut tx,
            &request(
                &format!("sp{n}"),
                serde_json::json!({"verb": "assistant:spawn", "instanceId": id, "workingDirectory": "/tmp"}),
            ),
        )
        .await?;
        let resp = ws_recv(&mut rx, RECV_TIMEOUT).await?;
        assert_eq!(resp["success"], true, "{resp}");
    }

    ws_send(
        &mut tx,
        &request(
            "sp4",
            serde_json::json!({"verb": "assistant:spawn", "instanceId": "inst-4", "workingDirectory": "/tmp"}),
        ),
    )
    .await?;
    let rejected = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(rejected["success"], false);
    assert_eq!(rejected["error"]["code"], "QUOTA_EXCEEDED");

    ws_send(&mut tx, &request("gi1", serde_json::json!({"verb": "assistant:getInstances"}))).await?;
    let instances = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    let ids: Vec<String> = instances["data"]["instances"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["instanceId"].as_str().unwrap().to_string())
        .collect();
    assert!(!ids.contains(&"inst-4".to_string()));

    Ok(())
}

// -- S4 Forwarded reconnect -------------------------------------------------------

#[tokio::test]
async fn s4_forwarded_reconnect_moves_output_to_new_socket() -> anyhow::Result<()> {
    let bridge = Arc::new(StubHostBridge::default());
    bridge.seed("host-inst", HostInstanceStatus::Connected, b"");
    let (addr, _server) = spawn_gateway(test_config(10), bridge.clone()).await?;

    let (mut tx1, mut rx1) = ws_connect(&addr, &ws_query("user-a", None, &["ASSISTANT_SPAWN", "ASSISTANT_CONTROL"])).await?;
    ws_send(
        &mut tx1,
        &request(
            "sp1",
            serde_json::json!({"verb": "assistant:spawn", "instanceId": "host-inst", "workingDirectory": "/tmp"}),
        ),
    )
    .await?;
    let spawned = ws_recv(&mut rx1, RECV_TIMEOUT).await?;
    assert_eq!(spawned["success"], true, "{spawned}");

    // Disconnect s1.
    drop(tx1);
    drop(rx1);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (mut tx2, mut rx2) = ws_connect(&addr, &ws_query("user-a", None, &["ASSISTANT_SPAWN", "ASSISTANT_CONTROL"])).await?;
    ws_send(
        &mut tx2,
        &request(
            "sp2",
            serde_json::json!({"verb": "assistant:spawn", "instanceId": "host-inst", "workingDirectory": "/tmp"}),
        ),
    )
    .await?;
    let respawned = ws_recv(&mut rx2, RECV_TIMEOUT).await?;
    assert_eq!(respawned["success"], true, "{respawned}");

    bridge.emit_output("host-inst", b"after reconnect");
    let event = ws_recv_until(&mut rx2, Duration::from_secs(2), |v| {
        v["eventName"] == "ASSISTANT_OUTPUT"
            && String::from_utf8_lossy(&decode_base64(v["data"].as_str().unwrap_or(""))).contains("after reconnect")
    })
    .await?;
    assert_eq!(event["instanceId"], "host-inst");

    Ok(())
}

// -- S5 Sync fan-out ---------------------------------------------------------------

#[tokio::test]
async fn s5_sync_fan_out_excludes_sender() -> anyhow::Result<()> {
    let (addr, _server) = spawn_gateway(test_config(10), Arc::new(NullHostBridge)).await?;

    let (mut tx1, mut rx1) = ws_connect(&addr, &ws_query("user-u", Some("ws-1"), &["WORKSPACE_MANAGE"])).await?;
    let (_tx2, mut rx2) = ws_connect(&addr, &ws_query("user-u", Some("ws-1"), &["WORKSPACE_MANAGE"])).await?;

    ws_send(
        &mut tx1,
        &request(
            "p1",
            serde_json::json!({"verb": "sync:push", "patches": [{"entityType": "task", "id": "t1"}]}),
        ),
    )
    .await?;
    let push_ack = ws_recv(&mut rx1, RECV_TIMEOUT).await?;
    assert_eq!(push_ack["success"], true, "{push_ack}");

    let fan_out = ws_recv(&mut rx2, RECV_TIMEOUT).await?;
    assert_eq!(fan_out["eventName"], "sync:patches");
    assert!(fan_out["patches"].as_array().unwrap().iter().any(|p| p["id"] == "t1"));

    ws_send(&mut tx1, &request("pl1", serde_json::json!({"verb": "sync:pull"}))).await?;
    let pulled = ws_recv(&mut rx1, RECV_TIMEOUT).await?;
    assert!(pulled["data"]["patches"].as_array().unwrap().is_empty());

    Ok(())
}

// -- S6 Path guard ------------------------------------------------------------------

#[tokio::test]
async fn s6_path_guard_rejects_forbidden_and_traversal_paths() -> anyhow::Result<()> {
    let (addr, _server) = spawn_gateway(test_config(10), Arc::new(NullHostBridge)).await?;
    let (mut tx, mut rx) = ws_connect(&addr, &ws_query("user-a", None, &["FILE_READ", "FILE_WRITE"])).await?;

    ws_send(&mut tx, &request("r1", serde_json::json!({"verb": "file:read", "path": "/etc/passwd"}))).await?;
    let denied = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(denied["success"], false);
    assert_eq!(denied["error"]["code"], "INVALID_PATH");

    ws_send(&mut tx, &request("r2", serde_json::json!({"verb": "file:read", "path": "/tmp/../etc/passwd"}))).await?;
    let denied_traversal = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(denied_traversal["success"], false);
    assert_eq!(denied_traversal["error"]["code"], "INVALID_PATH");

    let dir = tempfile::tempdir()?;
    let ok_path = dir.path().join("ok.txt").to_string_lossy().into_owned();
    ws_send(&mut tx, &request("w1", serde_json::json!({"verb": "file:write", "path": ok_path, "content": "hello"}))).await?;
    let write_ack = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(write_ack["success"], true, "{write_ack}");

    ws_send(&mut tx, &request("r3", serde_json::json!({"verb": "file:read", "path": ok_path}))).await?;
    let read_ok = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(read_ok["success"], true, "{read_ok}");
    assert_eq!(read_ok["data"]["content"], "hello");

    Ok(())
}
