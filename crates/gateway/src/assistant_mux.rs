// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single assistant-instance abstraction spanning two ownership regimes:
//! processes the gateway spawns itself on a local PTY, and processes
//! already running under a colocated host that the gateway only proxies
//! I/O for. The owned path runs its own PTY spawn/output loop; the proxied
//! path installs an idempotent per-`(socketId, instanceId)` output
//! subscription that a reconnect simply replaces.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{ErrorCode, GatewayError};
use crate::events::{EventBus, GatewayEvent};
use crate::host_bridge::{HostBridge, HostInstanceStatus};
use crate::isolation::UserIsolation;
use crate::pty::{Backend, NativePty, SpawnRequest};
use crate::session::{SessionId, SocketId};
use crate::transcoder::Transcoder;

/// How "response complete" is detected for a forwarded instance: no output
/// bytes for this long.
const RESPONSE_IDLE_GRACE: Duration = Duration::from_millis(800);

struct OwnedInstance {
    instance_id: String,
    socket_id: SocketId,
    name: Option<String>,
    input_tx: mpsc::Sender<bytes::Bytes>,
    pty: Arc<dyn Backend>,
}

/// Everything torn down together when a proxy for `(socketId, instanceId)`
/// is removed: the forwarding task and the idle-watcher task.
struct ProxyHandles {
    output_task: JoinHandle<()>,
    idle_task: JoinHandle<()>,
}

impl Drop for ProxyHandles {
    fn drop(&mut self) {
        self.output_task.abort();
        self.idle_task.abort();
    }
}

/// `assistant:spawn` request payload.
pub struct SpawnRequestPayload {
    pub instance_id: String,
    pub working_directory: String,
    pub instance_name: Option<String>,
    pub custom_instructions: Option<String>,
}

pub struct SpawnResult {
    pub pid: i64,
}

pub struct AssistantListEntry {
    pub instance_id: String,
    pub name: Option<String>,
    pub forwarded: bool,
}

/// Owns gateway-spawned assistant PTYs, proxies for host-owned instances,
/// and per-`(socketId, instanceId)` transcoders. One `tokio::sync::Mutex`
/// each: no lock is ever held across a suspension point —
/// every lock here is acquired, mutated, and released before any `.await`
/// that performs PTY spawn, file I/O, or a `HostBridge` call.
///
/// `instances` and `transcoders` are individually `Arc`-wrapped (not the
/// struct as a whole) so the output-forwarding and exit-watching tasks
/// spawned by `spawn`/`install_proxy` can hold onto exactly the maps they
/// touch for as long as the subscription lives, without requiring callers
/// to hold `AssistantMux` itself behind an `Arc`.
pub struct AssistantMux {
    instances: Arc<Mutex<HashMap<String, Arc<OwnedInstance>>>>,
    forwarding_set: Mutex<HashMap<SocketId, HashSet<String>>>,
    proxies: Mutex<HashMap<(SocketId, String), ProxyHandles>>,
    transcoders: Arc<Mutex<HashMap<(SocketId, String), Transcoder>>>,
    isolation: Arc<UserIsolation>,
}

impl AssistantMux {
    pub fn new(isolation: Arc<UserIsolation>) -> Self {
        Self {
            instances: Arc::new(Mutex::new(HashMap::new())),
            forwarding_set: Mutex::new(HashMap::new()),
            proxies: Mutex::new(HashMap::new()),
            transcoders: Arc::new(Mutex::new(HashMap::new())),
            isolation,
        }
    }

    fn env_for(req: &SpawnRequestPayload, user_id: &str, workspace_id: Option<&str>) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("TERM".to_string(), "xterm-256color".to_string());
        env.insert("COLORTERM".to_string(), "truecolor".to_string());
        env.insert("ASSISTANT_INSTANCE_ID".to_string(), req.instance_id.clone());
        if let Some(name) = &req.instance_name {
            env.insert("ASSISTANT_INSTANCE_NAME".to_string(), name.clone());
        }
        env.insert("USER_ID".to_string(), user_id.to_string());
        if let Some(workspace_id) = workspace_id {
            env.insert("WORKSPACE_ID".to_string(), workspace_id.to_string());
        }
        env.insert("REMOTE_MODE".to_string(), "true".to_string());
        if let Some(instructions) = &req.custom_instructions {
            env.insert("ASSISTANT_CUSTOM_INSTRUCTIONS".to_string(), instructions.clone());
        }
        env
    }

    /// `assistant:spawn` decision tree.
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        &self,
        req: SpawnRequestPayload,
        session_id: &SessionId,
        socket_id: &SocketId,
        user_id: &str,
        workspace_id: Option<&str>,
        assistant_binary: Option<&str>,
        host_bridge: &dyn HostBridge,
        events: Arc<EventBus>,
    ) -> Result<SpawnResult, GatewayError> {
        let already_forwarding =
            self.forwarding_set.lock().await.get(socket_id).is_some_and(|s| s.contains(&req.instance_id));

        if already_forwarding {
            self.isolation.register_forwarded(user_id, &req.instance_id, session_id).await;
            return self.spawn_forwarded(req, socket_id, host_bridge, events).await;
        }

        // Host is authoritative on existence: its answer wins over any
        // stale local bookkeeping.
        if host_bridge.instance_exists(&req.instance_id).await {
            self.forwarding_set.lock().await.entry(socket_id.clone()).or_default().insert(req.instance_id.clone());
            self.isolation.register_forwarded(user_id, &req.instance_id, session_id).await;
            return self.spawn_forwarded(req, socket_id, host_bridge, events).await;
        }

        if self.instances.lock().await.contains_key(&req.instance_id) {
            return Err(GatewayError::new(ErrorCode::InstanceExists, "assistant instance already exists"));
        }

        let binary = assistant_binary
            .ok_or_else(|| GatewayError::new(ErrorCode::AssistantNotFound, "no assistant binary detected"))?;

        self.isolation
            .register_instance(
                user_id,
                &req.instance_id,
                session_id,
                workspace_id.map(|w| w.to_string()),
                None,
            )
            .await?;

        let env = Self::env_for(&req, user_id, workspace_id);
        let spawn_req = SpawnRequest {
            command: vec![binary.to_string()],
            cwd: std::path::PathBuf::from(&req.working_directory),
            env,
            cols: 80,
            rows: 24,
        };

        let pty: Arc<dyn Backend> = match NativePty::spawn(&spawn_req) {
            Ok(pty) => Arc::new(pty),
            Err(e) => {
                self.isolation.unregister_instance(&req.instance_id).await;
                return Err(GatewayError::new(ErrorCode::SpawnError, e.to_string()));
            }
        };
        let pid = pty.child_pid().map(|p| p as i64).unwrap_or(-1);

        let (input_tx, input_rx) = mpsc::channel::<bytes::Bytes>(256);
        let (output_tx, mut output_rx) = mpsc::channel::<bytes::Bytes>(256);

        let run_pty = Arc::clone(&pty);
        let instance_id = req.instance_id.clone();
        let socket_id_owned = socket_id.clone();
        let instances_for_exit = Arc::clone(&self.instances);
        let isolation_for_exit = Arc::clone(&self.isolation);
        let events_for_exit = Arc::clone(&events);
        tokio::spawn({
            let instance_id = instance_id.clone();
            async move {
                match run_pty.run(output_tx, input_rx).await {
                    Ok(status) => {
                        events_for_exit
                            .emit(
                                &socket_id_owned,
                                GatewayEvent::AssistantExit {
                                    instance_id: instance_id.clone(),
                                    code: status.code,
                                    signal: status.signal,
                                },
                            )
                            .await;
                    }
                    Err(e) => {
                        events_for_exit
                            .emit(
                                &socket_id_owned,
                                GatewayEvent::AssistantError { instance_id: instance_id.clone(), error: e.to_string() },
                            )
                            .await;
                    }
                }
                instances_for_exit.lock().await.remove(&instance_id);
                isolation_for_exit.unregister_instance(&instance_id).await;
            }
        });

        let socket_id_for_output = socket_id.clone();
        let instance_id_for_output = instance_id.clone();
        let events_for_output = Arc::clone(&events);
        let transcoders_for_output = Arc::clone(&self.transcoders);
        tokio::spawn(async move {
            while let Some(chunk) = output_rx.recv().await {
                let key = (socket_id_for_output.clone(), instance_id_for_output.clone());
                if let Some(t) = transcoders_for_output.lock().await.get_mut(&key) {
                    t.feed(&chunk);
                }
                let encoded = base64::engine::general_purpose::STANDARD.encode(&chunk);
                events_for_output
                    .emit(
                        &socket_id_for_output,
                        GatewayEvent::AssistantOutput {
                            instance_id: instance_id_for_output.clone(),
                            data: encoded,
                        },
                    )
                    .await;
            }
        });

        let entry = Arc::new(OwnedInstance {
            instance_id: req.instance_id.clone(),
            socket_id: socket_id.clone(),
            name: req.instance_name,
            input_tx,
            pty,
        });
        self.instances.lock().await.insert(req.instance_id, entry);

        Ok(SpawnResult { pid })
    }

    /// Case 1/2 of the decision tree: the instance is (or is now known to
    /// be) host-owned. Installs/refreshes the proxy, nudges the host to
    /// start it if disconnected, and returns its pid (`-1` when already
    /// connected, matching `{success:true, pid:-1}`).
    async fn spawn_forwarded(
        &self,
        req: SpawnRequestPayload,
        socket_id: &SocketId,
        host_bridge: &dyn HostBridge,
        events: Arc<EventBus>,
    ) -> Result<SpawnResult, GatewayError> {
        let status = host_bridge.instance_status(&req.instance_id).await;
        let pid = match status {
            Some(HostInstanceStatus::Connected) => -1,
            _ => host_bridge
                .start(&req.instance_id, &req.working_directory, req.instance_name.as_deref())
                .await
                .map_err(|e| GatewayError::new(ErrorCode::StartError, e.to_string()))?,
        };

        self.install_proxy(socket_id, &req.instance_id, host_bridge, events).await;

        Ok(SpawnResult { pid })
    }

    /// Idempotent per `(socketId, instanceId)`: installing over an existing
    /// proxy for the same pair is a no-op; installing for a different
    /// socket tears down the old one first so a reconnect moves output to
    /// the new socket.
    async fn install_proxy(
        &self,
        socket_id: &SocketId,
        instance_id: &str,
        host_bridge: &dyn HostBridge,
        events: Arc<EventBus>,
    ) {
        let key = (socket_id.clone(), instance_id.to_string());
        if self.proxies.lock().await.contains_key(&key) {
            return;
        }

        let stale_keys: Vec<(SocketId, String)> = self
            .proxies
            .lock()
            .await
            .keys()
            .filter(|(sid, iid)| iid == instance_id && sid != socket_id)
            .cloned()
            .collect();
        for stale_key in stale_keys {
            self.proxies.lock().await.remove(&stale_key);
            self.transcoders.lock().await.remove(&stale_key);
            if let Some(set) = self.forwarding_set.lock().await.get_mut(&stale_key.0) {
                set.remove(instance_id);
            }
        }

        let mut output_rx = host_bridge.subscribe_output(instance_id).await;
        let mut complete_rx = host_bridge.subscribe_response_complete(instance_id).await;

        let socket_for_output = socket_id.clone();
        let instance_for_output = instance_id.to_string();
        let events_for_output = Arc::clone(&events);
        let transcoders_for_output = Arc::clone(&self.transcoders);
        let output_task = tokio::spawn(async move {
            while let Ok(chunk) = output_rx.recv().await {
                let tkey = (socket_for_output.clone(), instance_for_output.clone());
                if let Some(t) = transcoders_for_output.lock().await.get_mut(&tkey) {
                    t.feed(&chunk);
                }
                let encoded = base64::engine::general_purpose::STANDARD.encode(&chunk);
                events_for_output
                    .emit(
                        &socket_for_output,
                        GatewayEvent::AssistantOutput { instance_id: instance_for_output.clone(), data: encoded },
                    )
                    .await;
            }
        });

        let socket_for_complete = socket_id.clone();
        let instance_for_complete = instance_id.to_string();
        let idle_task = tokio::spawn(async move {
            loop {
                match tokio::time::timeout(RESPONSE_IDLE_GRACE, complete_rx.recv()).await {
                    Ok(Ok(())) => {
                        events
                            .emit(
                                &socket_for_complete,
                                GatewayEvent::AssistantResponseComplete {
                                    instance_id: instance_for_complete.clone(),
                                },
                            )
                            .await;
                    }
                    Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => break,
                    Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => continue,
                    Err(_) => continue,
                }
            }
        });

        self.proxies.lock().await.insert(key, ProxyHandles { output_task, idle_task });
        self.forwarding_set.lock().await.entry(socket_id.clone()).or_default().insert(instance_id.to_string());
    }

    /// Ownership of both gateway-owned and host-forwarded instances is by
    /// *user*, not socket or session (§4.3, §4.6.4): a user controlling an
    /// instance from a second live socket is not denied, only a different
    /// user is.
    async fn check_owner(&self, user_id: &str, instance_id: &str) -> Result<(), GatewayError> {
        if self.isolation.user_owns_instance(user_id, instance_id).await {
            Ok(())
        } else {
            Err(GatewayError::new(ErrorCode::AccessDenied, "assistant instance not owned by this user"))
        }
    }

    /// `assistant:send`. Routes to the PTY for gateway-owned instances, or
    /// `HostBridge.send` for forwarded ones.
    pub async fn send(
        &self,
        instance_id: &str,
        user_id: &str,
        data: Vec<u8>,
        host_bridge: &dyn HostBridge,
    ) -> Result<(), GatewayError> {
        self.check_owner(user_id, instance_id).await?;

        if let Some(entry) = self.instances.lock().await.get(instance_id).cloned() {
            return entry
                .input_tx
                .send(bytes::Bytes::from(data))
                .await
                .map_err(|e| GatewayError::new(ErrorCode::SendError, e.to_string()));
        }

        host_bridge.send(instance_id, &data).await.map_err(|e| GatewayError::new(ErrorCode::SendError, e.to_string()))
    }

    /// `assistant:resize`. Only meaningful for gateway-owned instances;
    /// forwarded instances are resized on the host side out of band — here
    /// it just resizes that socket's transcoder, if one was configured.
    pub async fn resize(
        &self,
        instance_id: &str,
        socket_id: &str,
        user_id: &str,
        cols: u16,
        rows: u16,
    ) -> Result<(), GatewayError> {
        self.check_owner(user_id, instance_id).await?;

        if let Some(entry) = self.instances.lock().await.get(instance_id).cloned() {
            return entry.pty.resize(cols, rows).map_err(|e| GatewayError::new(ErrorCode::ResizeError, e.to_string()));
        }
        if let Some(t) = self.transcoders.lock().await.get_mut(&(socket_id.to_string(), instance_id.to_string())) {
            t.resize(cols, rows);
        }
        Ok(())
    }

    /// `assistant:stop`.
    pub async fn stop(
        &self,
        instance_id: &str,
        user_id: &str,
        host_bridge: &dyn HostBridge,
    ) -> Result<(), GatewayError> {
        self.check_owner(user_id, instance_id).await?;

        if let Some(entry) = self.instances.lock().await.remove(instance_id) {
            self.isolation.unregister_instance(instance_id).await;
            // The output-driving task spawned in `spawn` holds its own
            // `Arc<dyn Backend>` clone for as long as `run` is in flight, so
            // removing this map entry does not drop the last reference.
            // Kill the child explicitly instead of relying on `Drop`.
            entry.pty.kill().map_err(|e| GatewayError::new(ErrorCode::StopError, e.to_string()))?;
            return Ok(());
        }

        self.isolation.unregister_instance(instance_id).await;
        host_bridge.stop(instance_id).await.map_err(|e| GatewayError::new(ErrorCode::StopError, e.to_string()))
    }

    /// `assistant:configureTerminal`. Replays the host's
    /// current scrollback into a fresh transcoder so the client's first
    /// snapshot reflects history predating this configuration call. Valid
    /// for both gateway-owned and forwarded instances; the former simply
    /// gets an empty initial replay since `HostBridge.get_buffer` will fail
    /// for an id it does not know.
    pub async fn configure_terminal(
        &self,
        instance_id: &str,
        socket_id: &str,
        user_id: &str,
        cols: u16,
        rows: u16,
        host_bridge: &dyn HostBridge,
    ) -> Result<(), GatewayError> {
        self.check_owner(user_id, instance_id).await?;

        let mut transcoder = Transcoder::new(cols, rows);
        if let Ok(buffer) = host_bridge.get_buffer(instance_id).await {
            transcoder.feed(&buffer);
        }
        self.transcoders.lock().await.insert((socket_id.to_string(), instance_id.to_string()), transcoder);
        Ok(())
    }

    /// `assistant:getBuffer`. Prefers the host's full buffer over the
    /// transcoder's, since the transcoder may not have seen
    /// pre-configuration history.
    pub async fn get_buffer(
        &self,
        instance_id: &str,
        socket_id: &str,
        user_id: &str,
        host_bridge: &dyn HostBridge,
    ) -> Result<Vec<u8>, GatewayError> {
        self.check_owner(user_id, instance_id).await?;

        if let Ok(buf) = host_bridge.get_buffer(instance_id).await {
            return Ok(buf);
        }
        if let Some(t) = self.transcoders.lock().await.get(&(socket_id.to_string(), instance_id.to_string())) {
            return Ok(t.serialize());
        }
        Err(GatewayError::new(ErrorCode::GetBufferError, "no buffer available for instance"))
    }

    /// `assistant:getInstances`: gateway-owned instances belonging to this
    /// session's socket.
    pub async fn get_instances(&self, socket_id: &str) -> Vec<AssistantListEntry> {
        self.instances
            .lock()
            .await
            .values()
            .filter(|e| e.socket_id == socket_id)
            .map(|e| AssistantListEntry { instance_id: e.instance_id.clone(), name: e.name.clone(), forwarded: false })
            .collect()
    }

    /// `assistant:listHost`.
    pub async fn list_host(&self, host_bridge: &dyn HostBridge) -> Vec<AssistantListEntry> {
        host_bridge
            .list_instances()
            .await
            .into_iter()
            .map(|info| AssistantListEntry { instance_id: info.instance_id, name: info.name, forwarded: true })
            .collect()
    }

    /// Socket disconnect teardown: kill owned PTYs, dispose
    /// transcoders, remove proxy subscriptions.
    pub async fn cleanup_socket(&self, socket_id: &str) {
        let owned_ids: Vec<String> = {
            let instances = self.instances.lock().await;
            instances.values().filter(|e| e.socket_id == socket_id).map(|e| e.instance_id.clone()).collect()
        };
        for id in &owned_ids {
            if let Some(entry) = self.instances.lock().await.remove(id) {
                // As in `stop`: the output-driving task still holds a
                // clone of this `Arc<dyn Backend>`, so the child must be
                // killed explicitly rather than left to `Drop`.
                if let Err(e) = entry.pty.kill() {
                    tracing::warn!(instance_id = %id, error = %e, "failed to kill assistant PTY on socket cleanup");
                }
            }
            self.isolation.unregister_instance(id).await;
        }

        let forwarded_ids: Vec<String> =
            self.forwarding_set.lock().await.remove(socket_id).map(|s| s.into_iter().collect()).unwrap_or_default();

        let mut proxies = self.proxies.lock().await;
        let mut transcoders = self.transcoders.lock().await;
        for id in forwarded_ids {
            let key = (socket_id.to_string(), id);
            proxies.remove(&key);
            transcoders.remove(&key);
        }
    }
}

#[cfg(test)]
#[path = "assistant_mux_tests.rs"]
mod tests;
