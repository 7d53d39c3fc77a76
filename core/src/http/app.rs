// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Router assembly and shared application state.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::capability_server::server::CapabilityServer;
use crate::egress::journal::Journal;

pub struct AppState {
    pub server: Arc<CapabilityServer>,
    pub journal: Arc<dyn Journal>,
    pub shutdown: CancellationToken,
    pub shutting_down: AtomicBool,
    pub admin_enabled: bool,
}

pub fn app(server: Arc<CapabilityServer>, journal: Arc<dyn Journal>, shutdown: CancellationToken, admin_enabled: bool) -> Router {
    let state = Arc::new(AppState {
        server,
        journal,
        shutdown,
        shutting_down: AtomicBool::new(false),
        admin_enabled,
    });

    Router::new()
        .route("/", post(crate::http::invocation::handle_invocation))
        .route("/piece/{cid}", get(crate::http::retrieval::handle_retrieval))
        .route("/admin/shutdown", post(crate::http::admin::shutdown))
        .route("/healthz", get(crate::http::admin::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
