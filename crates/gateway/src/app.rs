// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process wiring: builds every component, constructs the axum `Router`,
//! and runs `axum::serve` with `CancellationToken`-driven graceful
//! shutdown.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::assistant_mux::AssistantMux;
use crate::config::GatewayConfig;
use crate::dispatcher::Dispatcher;
use crate::events::EventBus;
use crate::feature_cache::FeatureCache;
use crate::file_ops::FileOpsHandler;
use crate::host_bridge::{HostBridge, NullHostBridge};
use crate::isolation::UserIsolation;
use crate::session::SessionRegistry;
use crate::sync_hub::SyncHub;
use crate::terminal_mux::TerminalMux;
use crate::transport::build_router;
use crate::workspace_query::WorkspaceQuery;

/// Everything a request handler needs: the dispatcher (which owns every
/// component) plus the per-socket event bus and the validated config.
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub events: Arc<EventBus>,
    pub config: GatewayConfig,
}

impl AppState {
    pub fn new(config: GatewayConfig, host_bridge: Arc<dyn HostBridge>) -> Self {
        let isolation = Arc::new(UserIsolation::new(config.max_instances_per_user));
        let assistant_binary = config.detect_assistant_binary();
        let workspace = match &config.user_config_path {
            Some(path) => WorkspaceQuery::with_config_path(path.clone()),
            None => WorkspaceQuery::new(),
        };

        let dispatcher = Arc::new(Dispatcher {
            sessions: Arc::new(SessionRegistry::new()),
            isolation: Arc::clone(&isolation),
            terminals: TerminalMux::new(),
            assistants: AssistantMux::new(isolation),
            files: FileOpsHandler::new(),
            sync_hub: SyncHub::new(),
            workspace,
            features: FeatureCache::new(),
            host_bridge,
            assistant_binary,
        });

        Self { dispatcher, events: Arc::new(EventBus::new()), config }
    }
}

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    config.validate()?;

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = Arc::new(AppState::new(config, Arc::new(NullHostBridge)));
    let router = build_router(Arc::clone(&state));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("coop-gateway listening on {addr}");

    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
