// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified, exhaustive error vocabulary returned in response envelopes.
///
/// Every internal failure is caught at the Dispatcher boundary and mapped to
/// one of these; nothing propagates to the transport as a panic or a raw
/// `anyhow::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NoSession,
    PermissionDenied,
    InvalidPath,
    ReadError,
    WriteError,
    ListError,
    DeleteError,
    StatError,
    WatchError,
    CreateError,
    ResizeError,
    DestroyError,
    TerminalNotFound,
    AccessDenied,
    InstanceExists,
    InstanceNotFound,
    AssistantNotFound,
    QuotaExceeded,
    SpawnError,
    SendError,
    StopError,
    StartError,
    GetError,
    GetBufferError,
    ConfigureError,
    SyncError,
    FeaturesError,
    StoreError,
    WorkspaceError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSession => "NO_SESSION",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::InvalidPath => "INVALID_PATH",
            Self::ReadError => "READ_ERROR",
            Self::WriteError => "WRITE_ERROR",
            Self::ListError => "LIST_ERROR",
            Self::DeleteError => "DELETE_ERROR",
            Self::StatError => "STAT_ERROR",
            Self::WatchError => "WATCH_ERROR",
            Self::CreateError => "CREATE_ERROR",
            Self::ResizeError => "RESIZE_ERROR",
            Self::DestroyError => "DESTROY_ERROR",
            Self::TerminalNotFound => "TERMINAL_NOT_FOUND",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::InstanceExists => "INSTANCE_EXISTS",
            Self::InstanceNotFound => "INSTANCE_NOT_FOUND",
            Self::AssistantNotFound => "ASSISTANT_NOT_FOUND",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::SpawnError => "SPAWN_ERROR",
            Self::SendError => "SEND_ERROR",
            Self::StopError => "STOP_ERROR",
            Self::StartError => "START_ERROR",
            Self::GetError => "GET_ERROR",
            Self::GetBufferError => "GET_BUFFER_ERROR",
            Self::ConfigureError => "CONFIGURE_ERROR",
            Self::SyncError => "SYNC_ERROR",
            Self::FeaturesError => "FEATURES_ERROR",
            Self::StoreError => "STORE_ERROR",
            Self::WorkspaceError => "WORKSPACE_ERROR",
        }
    }

    /// HTTP status this code would carry if exposed over a plain HTTP
    /// surface alongside the WebSocket one (the core's handlers are
    /// transport-agnostic; only the WS envelope is wired up today).
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoSession | Self::PermissionDenied | Self::AccessDenied => 401,
            Self::InvalidPath => 400,
            Self::TerminalNotFound | Self::InstanceNotFound | Self::AssistantNotFound => 404,
            Self::InstanceExists => 409,
            Self::QuotaExceeded => 429,
            _ => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error surfaced from a component to the Dispatcher: a code plus a
/// human-readable message. Never crosses the transport boundary as
/// anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}
