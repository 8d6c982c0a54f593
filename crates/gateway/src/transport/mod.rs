// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete transport: an axum `Router` exposing the WebSocket upgrade and
//! a health endpoint. Everything the core itself requires from "a
//! transport" (ordered, reliable, message-oriented delivery per socket) is
//! satisfied by axum's WS implementation; this module is infrastructure,
//! not a new core responsibility.

pub mod auth;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
