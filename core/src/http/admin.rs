// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `POST /admin/shutdown` and `GET /healthz`. `spec.md` §6.
//!
//! Shutdown is cooperative: it flips `shutting_down` and cancels the
//! shared [`tokio_util::sync::CancellationToken`], which propagates as a
//! `Cancelled` error into any in-flight `dispatch`/`retrieve_with_body`
//! call. It does not itself stop the HTTP listener — the `cli` crate's
//! serve loop owns that, watching the same token for graceful shutdown.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::http::app::AppState;

pub async fn shutdown(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.admin_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    if state.shutting_down.swap(true, Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    tracing::info!("shutdown requested via admin endpoint");
    state.shutdown.cancel();
    StatusCode::ACCEPTED.into_response()
}

pub async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.shutting_down.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "shutting_down" }))).into_response();
    }

    match state.server.blobs.health_check(state.shutdown.child_token()).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "healthz backend check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "degraded" }))).into_response()
        }
    }
}
