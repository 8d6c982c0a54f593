// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `workspace:get` resolution chain: a three-tier in-memory →
//! persisted-file → HOME-directory fallback.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct WorkspaceInfo {
    pub path: String,
    pub name: String,
    pub has_workspace: bool,
}

#[derive(Debug, Deserialize, Default)]
struct NestedWorkspace {
    #[serde(rename = "lastPath")]
    last_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PersistedConfig {
    #[serde(rename = "workspacePath")]
    workspace_path: Option<String>,
    #[serde(default)]
    workspace: NestedWorkspace,
}

fn workspace_name(path: &str) -> String {
    std::path::Path::new(path).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.to_string())
}

/// Holds the in-memory global workspace override, if any set via
/// `workspace:set`-style operations outside this gateway's current verb
/// surface; only `workspace:get` is exposed today, so this stays `None` unless a future
/// caller sets it.
#[derive(Default)]
pub struct WorkspaceQuery {
    in_memory: RwLock<Option<String>>,
    config_path: Option<PathBuf>,
}

impl WorkspaceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// `config_path` points at `userData/config.json`; read-only for this
    /// core.
    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self { in_memory: RwLock::new(None), config_path: Some(config_path) }
    }

    pub async fn set_in_memory(&self, path: String) {
        *self.in_memory.write().await = Some(path);
    }

    async fn from_config_file(&self) -> Option<String> {
        let path = self.config_path.as_ref()?;
        let contents = tokio::fs::read_to_string(path).await.ok()?;
        let parsed: PersistedConfig = serde_json::from_str(&contents).ok()?;
        parsed.workspace_path.or(parsed.workspace.last_path)
    }

    fn from_home() -> Option<String> {
        std::env::var("HOME").ok()
    }

    /// `workspace:get`. Resolution order: in-memory → persisted config file
    /// → `$HOME`. The chosen source is intentionally not reported to the
    /// client; callers only ever see the resolved path.
    pub async fn get(&self) -> WorkspaceInfo {
        if let Some(path) = self.in_memory.read().await.clone() {
            return WorkspaceInfo { name: workspace_name(&path), path, has_workspace: true };
        }
        if let Some(path) = self.from_config_file().await {
            return WorkspaceInfo { name: workspace_name(&path), path, has_workspace: true };
        }
        match Self::from_home() {
            Some(path) => WorkspaceInfo { name: workspace_name(&path), path, has_workspace: false },
            None => WorkspaceInfo { path: "/".to_string(), name: "/".to_string(), has_workspace: false },
        }
    }
}

pub type SharedWorkspaceQuery = Arc<WorkspaceQuery>;

#[cfg(test)]
#[path = "workspace_query_tests.rs"]
mod tests;
