// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user instance ownership, quota enforcement, and activity tracking.
//!
//! Ownership is by *user*, not session: a user reconnecting on a fresh
//! socket retains logical ownership of their gateway-owned instances until
//! explicitly stopped.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::error::{ErrorCode, GatewayError};
use crate::session::{SessionId, UserId};

/// Default per-user instance quota. Overridable via
/// `--max-instances-per-user` / `COOP_GW_MAX_INSTANCES`.
pub const DEFAULT_QUOTA: usize = 10;

#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub user_id: UserId,
    pub instance_id: String,
    pub session_id: SessionId,
    pub workspace: Option<String>,
    pub personality: Option<String>,
    pub last_activity: Instant,
}

#[derive(Default)]
pub struct UserIsolation {
    quota: usize,
    records: RwLock<HashMap<String, InstanceRecord>>,
}

impl UserIsolation {
    pub fn new(quota: usize) -> Self {
        Self { quota, records: RwLock::new(HashMap::new()) }
    }

    /// Register a new instance for `user_id`. Fails with `QUOTA_EXCEEDED`
    /// (no side effect) if the user already owns `>= quota` instances.
    pub async fn register_instance(
        &self,
        user_id: &str,
        instance_id: &str,
        session_id: &str,
        workspace: Option<String>,
        personality: Option<String>,
    ) -> Result<(), GatewayError> {
        let mut records = self.records.write().await;
        let current = records.values().filter(|r| r.user_id == user_id).count();
        if current >= self.quota {
            return Err(GatewayError::new(
                ErrorCode::QuotaExceeded,
                format!("user {user_id} already owns {current} instances (max {})", self.quota),
            ));
        }
        records.insert(
            instance_id.to_string(),
            InstanceRecord {
                user_id: user_id.to_string(),
                instance_id: instance_id.to_string(),
                session_id: session_id.to_string(),
                workspace,
                personality,
                last_activity: Instant::now(),
            },
        );
        Ok(())
    }

    /// Total function: true only when `instance_id` is registered to `user_id`.
    pub async fn user_owns_instance(&self, user_id: &str, instance_id: &str) -> bool {
        self.records.read().await.get(instance_id).is_some_and(|r| r.user_id == user_id)
    }

    /// Record ownership of a host-forwarded instance without a quota check:
    /// the gateway didn't spawn it, so it shouldn't count against the
    /// user's spawn quota, but control verbs still need an owner to check
    /// against. Idempotent: re-forwarding the same id just refreshes it.
    pub async fn register_forwarded(&self, user_id: &str, instance_id: &str, session_id: &str) {
        let mut records = self.records.write().await;
        records.insert(
            instance_id.to_string(),
            InstanceRecord {
                user_id: user_id.to_string(),
                instance_id: instance_id.to_string(),
                session_id: session_id.to_string(),
                workspace: None,
                personality: None,
                last_activity: Instant::now(),
            },
        );
    }

    /// Idempotent timestamp bump; a no-op if the instance is unknown.
    pub async fn update_instance_activity(&self, instance_id: &str) {
        if let Some(record) = self.records.write().await.get_mut(instance_id) {
            record.last_activity = Instant::now();
        }
    }

    /// Idempotent removal; returns true if a record was actually removed.
    pub async fn unregister_instance(&self, instance_id: &str) -> bool {
        self.records.write().await.remove(instance_id).is_some()
    }

    /// Remove all records bound to `session_id`, returning the instance ids
    /// whose PTYs the caller must still kill.
    pub async fn cleanup_session_instances(&self, session_id: &str) -> Vec<String> {
        let mut records = self.records.write().await;
        let dead: Vec<String> = records
            .values()
            .filter(|r| r.session_id == session_id)
            .map(|r| r.instance_id.clone())
            .collect();
        for id in &dead {
            records.remove(id);
        }
        dead
    }

    pub async fn get_user_instances(&self, user_id: &str) -> Vec<InstanceRecord> {
        self.records.read().await.values().filter(|r| r.user_id == user_id).cloned().collect()
    }
}

#[cfg(test)]
#[path = "isolation_tests.rs"]
mod tests;
