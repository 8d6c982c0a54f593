// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `file:read`/`write`/`list`/`delete`/`stat`/`watch`. Every verb begins
//! with `PathGuard::validate` before touching the filesystem; `tokio::fs`
//! is used throughout so a slow network mount never blocks the runtime.
//! `watch` forwards raw `notify` events for an arbitrary path, uncoalesced.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use tokio::sync::Mutex;

use crate::error::{ErrorCode, GatewayError};
use crate::events::{EventBus, GatewayEvent};
use crate::path_guard::PathGuard;
use crate::session::SocketId;

/// Requested text/binary encoding for `file:read`/`file:write` content.
/// `Utf8` is the default: plain text, read/written as-is. `Base64` lets a
/// client round-trip arbitrary binary content through the JSON envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEncoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Debug, Clone)]
pub struct ListEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub is_file: bool,
    pub size: Option<u64>,
    pub modified: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StatResult {
    pub exists: bool,
    pub is_directory: bool,
    pub is_file: bool,
    pub size: Option<u64>,
    pub created: Option<i64>,
    pub modified: Option<i64>,
    pub accessed: Option<i64>,
}

fn unix_millis(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn validate_path(path: &str) -> Result<PathBuf, GatewayError> {
    PathGuard::validate(path).ok_or_else(|| GatewayError::new(ErrorCode::InvalidPath, "path rejected by guard"))
}

/// Stateless except for `watch` subscriptions, which are tracked per
/// `(socketId, path)` so `cleanup_socket_watches` can dispose them on
/// disconnect, mirroring every other component's socket-scoped teardown.
#[derive(Default)]
pub struct FileOpsHandler {
    watchers: Mutex<HashMap<(SocketId, PathBuf), notify::RecommendedWatcher>>,
}

impl FileOpsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self, path: &str, encoding: FileEncoding) -> Result<String, GatewayError> {
        let path = validate_path(path)?;
        match encoding {
            FileEncoding::Utf8 => tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| GatewayError::new(ErrorCode::ReadError, e.to_string())),
            FileEncoding::Base64 => {
                let bytes = tokio::fs::read(&path).await.map_err(|e| GatewayError::new(ErrorCode::ReadError, e.to_string()))?;
                Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        }
    }

    pub async fn write(&self, path: &str, content: &str, encoding: FileEncoding) -> Result<(), GatewayError> {
        let path = validate_path(path)?;
        match encoding {
            FileEncoding::Utf8 => {
                tokio::fs::write(&path, content).await.map_err(|e| GatewayError::new(ErrorCode::WriteError, e.to_string()))
            }
            FileEncoding::Base64 => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| GatewayError::new(ErrorCode::WriteError, e.to_string()))?;
                tokio::fs::write(&path, bytes).await.map_err(|e| GatewayError::new(ErrorCode::WriteError, e.to_string()))
            }
        }
    }

    pub async fn list(&self, path: &str) -> Result<Vec<ListEntry>, GatewayError> {
        let path = validate_path(path)?;
        let mut dir = tokio::fs::read_dir(&path).await.map_err(|e| GatewayError::new(ErrorCode::ListError, e.to_string()))?;

        let mut out = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(e)) => e,
                Ok(None) => break,
                Err(e) => return Err(GatewayError::new(ErrorCode::ListError, e.to_string())),
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let entry_path = entry.path().to_string_lossy().into_owned();

            match entry.metadata().await {
                Ok(meta) => out.push(ListEntry {
                    name,
                    path: entry_path,
                    is_directory: meta.is_dir(),
                    is_file: meta.is_file(),
                    size: Some(meta.len()),
                    modified: meta.modified().ok().map(unix_millis),
                    error: None,
                }),
                Err(e) => out.push(ListEntry {
                    name,
                    path: entry_path,
                    is_directory: false,
                    is_file: false,
                    size: None,
                    modified: None,
                    error: Some(e.to_string()),
                }),
            }
        }

        Ok(out)
    }

    pub async fn delete(&self, path: &str) -> Result<(), GatewayError> {
        let path = validate_path(path)?;
        let meta = tokio::fs::metadata(&path).await.map_err(|e| GatewayError::new(ErrorCode::DeleteError, e.to_string()))?;
        let result =
            if meta.is_dir() { tokio::fs::remove_dir_all(&path).await } else { tokio::fs::remove_file(&path).await };
        result.map_err(|e| GatewayError::new(ErrorCode::DeleteError, e.to_string()))
    }

    pub async fn stat(&self, path: &str) -> Result<StatResult, GatewayError> {
        let path = validate_path(path)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(StatResult {
                exists: true,
                is_directory: meta.is_dir(),
                is_file: meta.is_file(),
                size: Some(meta.len()),
                created: meta.created().ok().map(unix_millis),
                modified: meta.modified().ok().map(unix_millis),
                accessed: meta.accessed().ok().map(unix_millis),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StatResult::default()),
            Err(e) => Err(GatewayError::new(ErrorCode::StatError, e.to_string())),
        }
    }

    /// `file:watch`. Registers a `notify` watcher on the validated path and
    /// forwards every raw filesystem event as a `FILE_CHANGE` to the
    /// originating socket; the initial acknowledgement is this call
    /// returning `Ok`, independent of whether any event ever arrives.
    pub async fn watch(&self, path: &str, socket_id: &SocketId, events: Arc<EventBus>) -> Result<(), GatewayError> {
        use notify::Watcher;

        let path = validate_path(path)?;
        let key = (socket_id.clone(), path.clone());
        if self.watchers.lock().await.contains_key(&key) {
            return Ok(());
        }

        let (raw_tx, mut raw_rx) = tokio::sync::mpsc::unbounded_channel::<notify::Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = raw_tx.send(event);
            }
        })
        .map_err(|e| GatewayError::new(ErrorCode::WatchError, e.to_string()))?;

        watcher
            .watch(&path, notify::RecursiveMode::NonRecursive)
            .map_err(|e| GatewayError::new(ErrorCode::WatchError, e.to_string()))?;

        let socket_for_events = socket_id.clone();
        let path_for_events = path.to_string_lossy().into_owned();
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                let kind = format!("{:?}", event.kind);
                events
                    .emit(&socket_for_events, GatewayEvent::FileChange { path: path_for_events.clone(), kind })
                    .await;
            }
        });

        self.watchers.lock().await.insert(key, watcher);
        Ok(())
    }

    /// Drop every watcher registered by `socket_id`.
    pub async fn cleanup_socket_watches(&self, socket_id: &str) {
        self.watchers.lock().await.retain(|(sid, _), _| sid != socket_id);
    }
}

#[cfg(test)]
#[path = "file_ops_tests.rs"]
mod tests;
