// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-socket verb registry: binds every request verb to its component,
//! wrapping each in session lookup, permission gate, and uniform response
//! envelope construction.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::assistant_mux::{AssistantMux, SpawnRequestPayload};
use crate::error::{ErrorCode, GatewayError};
use crate::events::EventBus;
use crate::feature_cache::{FeatureCache, FeatureDescriptor};
use crate::file_ops::{FileEncoding, FileOpsHandler};
use crate::host_bridge::HostBridge;
use crate::isolation::UserIsolation;
use crate::session::{Permission, Session, SessionRegistry};
use crate::sync_hub::SyncHub;
use crate::terminal_mux::{CreateRequest, TerminalMux};
use crate::workspace_query::WorkspaceQuery;

#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(flatten)]
    pub payload: RequestPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    fn ok(id: String, data: serde_json::Value) -> Self {
        Self { id, success: true, data: Some(data), error: None }
    }

    fn ok_empty(id: String) -> Self {
        Self { id, success: true, data: None, error: None }
    }

    fn err(id: String, error: GatewayError) -> Self {
        Self { id, success: false, data: None, error: Some(ErrorBody { code: error.code.as_str().to_string(), message: error.message }) }
    }
}

/// One variant per verb in the table; `#[serde(tag = "verb")]` means an
/// inbound `{"verb": "file:read", "path": "..."}` deserializes directly
/// into `RequestPayload::FileRead { path }`.
#[derive(Debug, Deserialize)]
#[serde(tag = "verb")]
pub enum RequestPayload {
    #[serde(rename = "file:read")]
    FileRead {
        path: String,
        #[serde(default)]
        encoding: FileEncoding,
    },
    #[serde(rename = "file:write")]
    FileWrite {
        path: String,
        content: String,
        #[serde(default)]
        encoding: FileEncoding,
    },
    #[serde(rename = "file:list")]
    FileList { path: String },
    #[serde(rename = "file:delete")]
    FileDelete { path: String },
    #[serde(rename = "file:stat")]
    FileStat { path: String },
    #[serde(rename = "file:watch")]
    FileWatch { path: String },
    #[serde(rename = "terminal:create")]
    TerminalCreate {
        cols: u16,
        rows: u16,
        cwd: Option<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        name: Option<String>,
    },
    #[serde(rename = "terminal:write")]
    TerminalWrite {
        #[serde(rename = "terminalId")]
        terminal_id: String,
        data: String,
    },
    #[serde(rename = "terminal:resize")]
    TerminalResize {
        #[serde(rename = "terminalId")]
        terminal_id: String,
        cols: u16,
        rows: u16,
    },
    #[serde(rename = "terminal:destroy")]
    TerminalDestroy {
        #[serde(rename = "terminalId")]
        terminal_id: String,
    },
    #[serde(rename = "terminal:list")]
    TerminalList {},
    #[serde(rename = "assistant:spawn")]
    AssistantSpawn {
        #[serde(rename = "instanceId")]
        instance_id: String,
        #[serde(rename = "workingDirectory")]
        working_directory: String,
        #[serde(rename = "instanceName")]
        instance_name: Option<String>,
        config: Option<SpawnConfig>,
    },
    #[serde(rename = "assistant:send")]
    AssistantSend {
        #[serde(rename = "instanceId")]
        instance_id: String,
        data: String,
    },
    #[serde(rename = "assistant:resize")]
    AssistantResize {
        #[serde(rename = "instanceId")]
        instance_id: String,
        cols: u16,
        rows: u16,
    },
    #[serde(rename = "assistant:stop")]
    AssistantStop {
        #[serde(rename = "instanceId")]
        instance_id: String,
    },
    #[serde(rename = "assistant:configureTerminal")]
    AssistantConfigureTerminal {
        #[serde(rename = "instanceId")]
        instance_id: String,
        cols: u16,
        rows: u16,
    },
    #[serde(rename = "assistant:getInstances")]
    AssistantGetInstances {},
    #[serde(rename = "assistant:listHost")]
    AssistantListHost {},
    #[serde(rename = "assistant:getBuffer")]
    AssistantGetBuffer {
        #[serde(rename = "instanceId")]
        instance_id: String,
    },
    #[serde(rename = "sync:push")]
    SyncPush {
        patches: Vec<serde_json::Value>,
        #[serde(default)]
        compressed: bool,
    },
    #[serde(rename = "sync:pull")]
    SyncPull { since: Option<i64>, types: Option<Vec<String>> },
    #[serde(rename = "sync:status")]
    SyncStatus {},
    #[serde(rename = "workspace:get")]
    WorkspaceGet {},
    #[serde(rename = "features:get")]
    FeaturesGet {},
    #[serde(rename = "features:store")]
    FeaturesStore { descriptor: FeatureDescriptor },
}

#[derive(Debug, Deserialize)]
pub struct SpawnConfig {
    #[serde(rename = "customInstructions")]
    pub custom_instructions: Option<String>,
}

impl RequestPayload {
    /// `None` means no permission is required for this verb.
    fn required_permission(&self) -> Option<Permission> {
        match self {
            Self::FileRead { .. } | Self::FileList { .. } | Self::FileStat { .. } | Self::FileWatch { .. } => {
                Some(Permission::FileRead)
            }
            Self::FileWrite { .. } => Some(Permission::FileWrite),
            Self::FileDelete { .. } => Some(Permission::FileDelete),
            Self::TerminalCreate { .. } | Self::TerminalList {} => Some(Permission::TerminalCreate),
            Self::TerminalWrite { .. } | Self::TerminalResize { .. } | Self::TerminalDestroy { .. } => {
                Some(Permission::TerminalWrite)
            }
            Self::AssistantSpawn { .. } => Some(Permission::AssistantSpawn),
            Self::AssistantSend { .. }
            | Self::AssistantResize { .. }
            | Self::AssistantStop { .. }
            | Self::AssistantConfigureTerminal { .. }
            | Self::AssistantGetInstances {}
            | Self::AssistantListHost {}
            | Self::AssistantGetBuffer { .. } => Some(Permission::AssistantControl),
            Self::SyncPush { .. } => Some(Permission::WorkspaceManage),
            Self::SyncPull { .. }
            | Self::SyncStatus {}
            | Self::WorkspaceGet {}
            | Self::FeaturesGet {}
            | Self::FeaturesStore { .. } => None,
        }
    }
}

/// Owns every component and routes requests to them. One instance is shared
/// across all sockets; components internally guard their own state.
pub struct Dispatcher {
    pub sessions: Arc<SessionRegistry>,
    pub isolation: Arc<UserIsolation>,
    pub terminals: TerminalMux,
    pub assistants: AssistantMux,
    pub files: FileOpsHandler,
    pub sync_hub: SyncHub,
    pub workspace: WorkspaceQuery,
    pub features: FeatureCache,
    pub host_bridge: Arc<dyn HostBridge>,
    pub assistant_binary: Option<String>,
}

impl Dispatcher {
    pub async fn dispatch(&self, socket_id: &str, request: Request, events: Arc<EventBus>) -> Response {
        let session = match self.sessions.session_by_socket(socket_id).await {
            Some(s) => s,
            None => return Response::err(request.id, GatewayError::new(ErrorCode::NoSession, "no session for socket")),
        };

        if let Some(perm) = request.payload.required_permission() {
            if !session.has_permission(perm) {
                return Response::err(
                    request.id,
                    GatewayError::new(ErrorCode::PermissionDenied, format!("missing permission {perm:?}")),
                );
            }
        }

        match self.handle(&session, request.payload, Arc::clone(&events)).await {
            Ok(Some(data)) => Response::ok(request.id, data),
            Ok(None) => Response::ok_empty(request.id),
            Err(e) => Response::err(request.id, e),
        }
    }

    async fn handle(
        &self,
        session: &Session,
        payload: RequestPayload,
        events: Arc<EventBus>,
    ) -> Result<Option<serde_json::Value>, GatewayError> {
        match payload {
            RequestPayload::FileRead { path, encoding } => {
                let content = self.files.read(&path, encoding).await?;
                Ok(Some(json!({ "content": content })))
            }
            RequestPayload::FileWrite { path, content, encoding } => {
                self.files.write(&path, &content, encoding).await?;
                Ok(None)
            }
            RequestPayload::FileList { path } => {
                let entries = self.files.list(&path).await?;
                Ok(Some(serde_json::to_value(entries).map_err(serialize_error)?))
            }
            RequestPayload::FileDelete { path } => {
                self.files.delete(&path).await?;
                Ok(None)
            }
            RequestPayload::FileStat { path } => {
                let stat = self.files.stat(&path).await?;
                Ok(Some(serde_json::to_value(stat).map_err(serialize_error)?))
            }
            RequestPayload::FileWatch { path } => {
                self.files.watch(&path, &session.socket_id, events).await?;
                Ok(None)
            }

            RequestPayload::TerminalCreate { cols, rows, cwd, env, name } => {
                let req = CreateRequest {
                    session_id: session.id.clone(),
                    socket_id: session.socket_id.clone(),
                    cols,
                    rows,
                    cwd,
                    env,
                    name,
                    global_workspace: Some(self.workspace.get().await.path),
                };
                let terminal_id = self.terminals.create(req, events).await?;
                Ok(Some(json!({ "terminalId": terminal_id })))
            }
            RequestPayload::TerminalWrite { terminal_id, data } => {
                self.terminals.write(&terminal_id, &session.socket_id, data.into_bytes()).await?;
                Ok(None)
            }
            RequestPayload::TerminalResize { terminal_id, cols, rows } => {
                self.terminals.resize(&terminal_id, &session.socket_id, cols, rows).await?;
                Ok(None)
            }
            RequestPayload::TerminalDestroy { terminal_id } => {
                self.terminals.destroy(&terminal_id, &session.socket_id).await?;
                Ok(None)
            }
            RequestPayload::TerminalList {} => {
                let entries = self.terminals.list(self.host_bridge.as_ref()).await;
                let values: Vec<serde_json::Value> = entries
                    .into_iter()
                    .map(|e| {
                        json!({
                            "id": e.id,
                            "name": e.name,
                            "hostOwned": e.host_owned,
                            "currentBuffer": e.current_buffer,
                        })
                    })
                    .collect();
                Ok(Some(json!({ "terminals": values })))
            }

            RequestPayload::AssistantSpawn { instance_id, working_directory, instance_name, config } => {
                let req = SpawnRequestPayload {
                    instance_id,
                    working_directory,
                    instance_name,
                    custom_instructions: config.and_then(|c| c.custom_instructions),
                };
                let result = self
                    .assistants
                    .spawn(
                        req,
                        &session.id,
                        &session.socket_id,
                        &session.user_id,
                        session.workspace_id.as_deref(),
                        self.assistant_binary.as_deref(),
                        self.host_bridge.as_ref(),
                        events,
                    )
                    .await?;
                Ok(Some(json!({ "pid": result.pid })))
            }
            RequestPayload::AssistantSend { instance_id, data } => {
                self.assistants
                    .send(&instance_id, &session.user_id, data.into_bytes(), self.host_bridge.as_ref())
                    .await?;
                Ok(None)
            }
            RequestPayload::AssistantResize { instance_id, cols, rows } => {
                self.assistants
                    .resize(&instance_id, &session.socket_id, &session.user_id, cols, rows)
                    .await?;
                Ok(None)
            }
            RequestPayload::AssistantStop { instance_id } => {
                self.assistants.stop(&instance_id, &session.user_id, self.host_bridge.as_ref()).await?;
                Ok(None)
            }
            RequestPayload::AssistantConfigureTerminal { instance_id, cols, rows } => {
                self.assistants
                    .configure_terminal(
                        &instance_id,
                        &session.socket_id,
                        &session.user_id,
                        cols,
                        rows,
                        self.host_bridge.as_ref(),
                    )
                    .await?;
                Ok(None)
            }
            RequestPayload::AssistantGetInstances {} => {
                let instances = self.assistants.get_instances(&session.socket_id).await;
                Ok(Some(json!({ "instances": assistant_list_to_json(instances) })))
            }
            RequestPayload::AssistantListHost {} => {
                let instances = self.assistants.list_host(self.host_bridge.as_ref()).await;
                Ok(Some(json!({ "instances": assistant_list_to_json(instances) })))
            }
            RequestPayload::AssistantGetBuffer { instance_id } => {
                let buffer = self
                    .assistants
                    .get_buffer(&instance_id, &session.socket_id, &session.user_id, self.host_bridge.as_ref())
                    .await?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(&buffer);
                Ok(Some(json!({ "buffer": encoded })))
            }

            RequestPayload::SyncPush { patches, compressed } => {
                self.sync_hub.push(session, patches, compressed, &self.sessions, &events).await?;
                Ok(None)
            }
            RequestPayload::SyncPull { since, types } => {
                let (patches, compressed) = self.sync_hub.pull(session, since, types).await;
                Ok(Some(json!({ "patches": patches, "compressed": compressed })))
            }
            RequestPayload::SyncStatus {} => {
                let status = self.sync_hub.status(session).await;
                Ok(Some(serde_json::to_value(status).map_err(serialize_error)?))
            }

            RequestPayload::WorkspaceGet {} => {
                let info = self.workspace.get().await;
                Ok(Some(json!({ "path": info.path, "name": info.name, "hasWorkspace": info.has_workspace })))
            }

            RequestPayload::FeaturesGet {} => {
                let descriptor = self.features.get().await;
                Ok(Some(serde_json::to_value(descriptor).map_err(serialize_error)?))
            }
            RequestPayload::FeaturesStore { descriptor } => {
                let stored = self.features.store(descriptor).await;
                Ok(Some(serde_json::to_value(stored).map_err(serialize_error)?))
            }
        }
    }

    /// Disconnect cascade: unregister session, then cascade
    /// cleanup through every component in order. Each stage's errors are
    /// swallowed (logged) so one failure doesn't block the rest.
    pub async fn cleanup_socket(&self, socket_id: &str) {
        let session = self.sessions.unregister(socket_id).await;
        self.terminals.cleanup_socket_terminals(socket_id).await;
        self.assistants.cleanup_socket(socket_id).await;
        if let Some(session) = session {
            self.isolation.cleanup_session_instances(&session.id).await;
        }
        self.files.cleanup_socket_watches(socket_id).await;
    }
}

fn assistant_list_to_json(entries: Vec<crate::assistant_mux::AssistantListEntry>) -> Vec<serde_json::Value> {
    entries
        .into_iter()
        .map(|e| json!({ "instanceId": e.instance_id, "name": e.name, "forwarded": e.forwarded }))
        .collect()
}

fn serialize_error(e: serde_json::Error) -> GatewayError {
    GatewayError::new(ErrorCode::GetError, e.to_string())
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
