// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawns and owns PTY processes for remote-created shells: a generalization
//! of a single-session PTY-ownership loop to many concurrently owned
//! terminals keyed by `terminalId`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use tokio::sync::{mpsc, Mutex};

use crate::error::{ErrorCode, GatewayError};
use crate::events::{EventBus, GatewayEvent};
use crate::host_bridge::HostBridge;
use crate::pty::{Backend, NativePty, SpawnRequest};
use crate::session::{SessionId, SocketId};

struct TerminalEntry {
    id: String,
    #[allow(dead_code)]
    session_id: SessionId,
    socket_id: SocketId,
    #[allow(dead_code)]
    workspace_path: PathBuf,
    #[allow(dead_code)]
    created_at: std::time::Instant,
    name: Option<String>,
    input_tx: mpsc::Sender<bytes::Bytes>,
    pty: Arc<dyn Backend>,
}

/// Remote-created shell multiplexer. One `tokio::sync::Mutex` guards the
/// terminal map; never held across PTY spawn or I/O.
#[derive(Default)]
pub struct TerminalMux {
    terminals: Mutex<HashMap<String, Arc<TerminalEntry>>>,
    by_socket: Mutex<HashMap<SocketId, HashSet<String>>>,
}

pub struct CreateRequest {
    pub session_id: SessionId,
    pub socket_id: SocketId,
    pub cols: u16,
    pub rows: u16,
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub name: Option<String>,
    pub global_workspace: Option<String>,
}

pub struct TerminalListEntry {
    pub id: String,
    pub name: Option<String>,
    pub host_owned: bool,
    pub current_buffer: Option<String>,
}

impl TerminalMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Working directory resolution order: `request.cwd` -> `globalWorkspace` -> `HOME`.
    fn resolve_cwd(req: &CreateRequest) -> PathBuf {
        req.cwd
            .clone()
            .or_else(|| req.global_workspace.clone())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/"))
            })
    }

    fn shell_command() -> Vec<String> {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        vec![shell]
    }

    /// `terminal:create`. Spawns a child shell on a new PTY and streams its
    /// output as `TERMINAL_DATA` events to the originating socket.
    pub async fn create(
        &self,
        req: CreateRequest,
        events: Arc<EventBus>,
    ) -> Result<String, GatewayError> {
        let cwd = Self::resolve_cwd(&req);

        // Environment merges on top of the gateway's own, with TERM/COLORTERM
        // pinned last so a caller-supplied override can't shadow them.
        let mut env = req.env.clone();
        env.insert("TERM".to_string(), "xterm-256color".to_string());
        env.insert("COLORTERM".to_string(), "truecolor".to_string());

        let spawn_req = SpawnRequest {
            command: Self::shell_command(),
            cwd: cwd.clone(),
            env,
            cols: req.cols,
            rows: req.rows,
        };

        let pty: Arc<dyn Backend> = Arc::new(
            NativePty::spawn(&spawn_req).map_err(|e| GatewayError::new(ErrorCode::CreateError, e.to_string()))?,
        );

        let terminal_id = uuid::Uuid::new_v4().to_string();
        let (input_tx, input_rx) = mpsc::channel::<bytes::Bytes>(256);
        let (output_tx, mut output_rx) = mpsc::channel::<bytes::Bytes>(256);

        let run_pty = Arc::clone(&pty);
        let socket_id_for_exit = req.socket_id.clone();
        let terminal_id_for_exit = terminal_id.clone();
        let events_for_exit = Arc::clone(&events);
        tokio::spawn(async move {
            match run_pty.run(output_tx, input_rx).await {
                Ok(status) => {
                    events_for_exit
                        .emit(
                            &socket_id_for_exit,
                            GatewayEvent::TerminalExit {
                                terminal_id: terminal_id_for_exit,
                                code: status.code,
                                signal: status.signal,
                            },
                        )
                        .await;
                }
                Err(e) => tracing::warn!(error = %e, "terminal pty exited with error"),
            }
        });

        let socket_id_for_output = req.socket_id.clone();
        let terminal_id_for_output = terminal_id.clone();
        let events_for_output = Arc::clone(&events);
        tokio::spawn(async move {
            while let Some(chunk) = output_rx.recv().await {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&chunk);
                events_for_output
                    .emit(
                        &socket_id_for_output,
                        GatewayEvent::TerminalData {
                            terminal_id: terminal_id_for_output.clone(),
                            data: encoded,
                        },
                    )
                    .await;
            }
        });

        let entry = Arc::new(TerminalEntry {
            id: terminal_id.clone(),
            session_id: req.session_id.clone(),
            socket_id: req.socket_id.clone(),
            workspace_path: cwd,
            created_at: std::time::Instant::now(),
            name: req.name.clone(),
            input_tx,
            pty,
        });

        self.terminals.lock().await.insert(terminal_id.clone(), Arc::clone(&entry));
        self.by_socket.lock().await.entry(req.socket_id).or_default().insert(terminal_id.clone());

        Ok(terminal_id)
    }

    fn check_owner(entry: &TerminalEntry, socket_id: &str) -> Result<(), GatewayError> {
        if entry.socket_id != socket_id {
            return Err(GatewayError::new(ErrorCode::AccessDenied, "terminal owned by another session"));
        }
        Ok(())
    }

    async fn lookup(&self, terminal_id: &str) -> Result<Arc<TerminalEntry>, GatewayError> {
        self.terminals
            .lock()
            .await
            .get(terminal_id)
            .cloned()
            .ok_or_else(|| GatewayError::new(ErrorCode::TerminalNotFound, "no such terminal"))
    }

    pub async fn write(&self, terminal_id: &str, socket_id: &str, data: Vec<u8>) -> Result<(), GatewayError> {
        let entry = self.lookup(terminal_id).await?;
        Self::check_owner(&entry, socket_id)?;
        // Zero-byte writes are accepted and forwarded as-is.
        entry
            .input_tx
            .send(bytes::Bytes::from(data))
            .await
            .map_err(|e| GatewayError::new(ErrorCode::WriteError, e.to_string()))
    }

    pub async fn resize(
        &self,
        terminal_id: &str,
        socket_id: &str,
        cols: u16,
        rows: u16,
    ) -> Result<(), GatewayError> {
        let entry = self.lookup(terminal_id).await?;
        Self::check_owner(&entry, socket_id)?;
        entry.pty.resize(cols, rows).map_err(|e| GatewayError::new(ErrorCode::ResizeError, e.to_string()))
    }

    pub async fn destroy(&self, terminal_id: &str, socket_id: &str) -> Result<(), GatewayError> {
        let entry = {
            let mut terminals = self.terminals.lock().await;
            terminals
                .get(terminal_id)
                .cloned()
                .ok_or_else(|| GatewayError::new(ErrorCode::TerminalNotFound, "no such terminal"))?
        };
        Self::check_owner(&entry, socket_id)?;

        self.terminals.lock().await.remove(terminal_id);
        if let Some(sockets) = self.by_socket.lock().await.get_mut(&entry.socket_id) {
            sockets.remove(terminal_id);
        }
        // The exit-watcher task spawned in `create` holds its own
        // `Arc<dyn Backend>` clone for as long as `run` is in flight, so
        // dropping `entry` here does not drop the last reference. Kill the
        // child explicitly instead of relying on `Drop`.
        entry.pty.kill().map_err(|e| GatewayError::new(ErrorCode::DestroyError, e.to_string()))
    }

    pub async fn list(&self, host_bridge: &dyn HostBridge) -> Vec<TerminalListEntry> {
        let mut out: Vec<TerminalListEntry> = self
            .terminals
            .lock()
            .await
            .values()
            .map(|e| TerminalListEntry {
                id: e.id.clone(),
                name: e.name.clone(),
                host_owned: false,
                current_buffer: None,
            })
            .collect();

        for info in host_bridge.list_instances().await {
            let buffer = host_bridge.get_buffer(&info.instance_id).await.ok();
            out.push(TerminalListEntry {
                id: info.instance_id,
                name: info.name,
                host_owned: true,
                current_buffer: buffer.map(|b| String::from_utf8_lossy(&b).into_owned()),
            });
        }

        out
    }

    /// Invoked by the Dispatcher on socket disconnect: kills every PTY
    /// referenced by `socket_id` and clears ownership maps. Individual
    /// kill errors are logged, not surfaced.
    pub async fn cleanup_socket_terminals(&self, socket_id: &str) {
        let ids: Vec<String> =
            self.by_socket.lock().await.remove(socket_id).map(|s| s.into_iter().collect()).unwrap_or_default();

        for id in ids {
            let entry = self.terminals.lock().await.remove(&id);
            if let Some(entry) = entry {
                if let Err(e) = entry.pty.kill() {
                    tracing::warn!(terminal_id = %id, error = %e, "failed to kill terminal PTY on socket cleanup");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "terminal_mux_tests.rs"]
mod tests;
