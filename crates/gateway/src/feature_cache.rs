// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `features:get`/`features:store`: a lazily-computed, host-scoped
//! auxiliary feature descriptor. Detection shells out via
//! `tokio::process::Command::new(..).output().await` and the result is
//! cached until explicitly overwritten by `features:store`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeatureDescriptor {
    pub hooks: Vec<String>,
    pub servers: Vec<String>,
    pub commands: Vec<String>,
    pub last_sync: i64,
}

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Runs the host's external tooling query once, on first `features:get` with
/// nothing yet cached. Treated as best-effort: a failing or missing binary
/// yields an empty descriptor rather than an error, since the client asked
/// for a snapshot, not a diagnostic.
async fn probe_host_features() -> FeatureDescriptor {
    let commands = match tokio::process::Command::new("claude").arg("mcp").arg("list").output().await {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect(),
        Ok(output) => {
            tracing::debug!("feature probe: mcp list exited non-zero: {}", String::from_utf8_lossy(&output.stderr).trim());
            Vec::new()
        }
        Err(e) => {
            tracing::debug!("feature probe: mcp list unavailable: {e}");
            Vec::new()
        }
    };

    FeatureDescriptor { hooks: Vec::new(), servers: Vec::new(), commands, last_sync: now_millis() }
}

/// Holds at most one descriptor at a time; `get` computes lazily and
/// memoizes, `store` replaces unconditionally.
#[derive(Default)]
pub struct FeatureCache {
    descriptor: RwLock<Option<FeatureDescriptor>>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> FeatureDescriptor {
        if let Some(d) = self.descriptor.read().await.clone() {
            return d;
        }
        let mut guard = self.descriptor.write().await;
        if let Some(d) = guard.clone() {
            return d;
        }
        let computed = probe_host_features().await;
        *guard = Some(computed.clone());
        computed
    }

    pub async fn store(&self, mut descriptor: FeatureDescriptor) -> FeatureDescriptor {
        descriptor.last_sync = now_millis();
        *self.descriptor.write().await = Some(descriptor.clone());
        descriptor
    }
}

#[cfg(test)]
#[path = "feature_cache_tests.rs"]
mod tests;
