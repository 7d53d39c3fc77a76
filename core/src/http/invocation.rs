// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `POST /`: accepts a signed invocation envelope, dispatches it, and
//! returns the resulting receipt envelope. `spec.md` §6.
//!
//! `retrieve` invocations are rejected here with 400 — the digest they
//! need travels as the `/piece/{cid}` URL parameter, not inside the
//! signed resource, so they must go through [`crate::http::retrieval`].

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::domain::capability::{Ability, Invocation};
use crate::domain::errors::CoreError;
use crate::http::app::AppState;

pub async fn handle_invocation(State(state): State<Arc<AppState>>, Json(invocation): Json<Invocation>) -> impl IntoResponse {
    if matches!(invocation.ability, Ability::Retrieve) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "retrieve invocations must be sent to GET /piece/{cid}" })),
        )
            .into_response();
    }

    let now_unix = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    let cancel = state.shutdown.child_token();

    match state.server.dispatch(invocation, None, now_unix, cancel).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(CoreError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "invocation dispatch failed with a transport-level error");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
