// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `GET /piece/{cid}`: byte-range reads over a stored blob. `spec.md` §4.8/§6.
//!
//! The `{cid}` path segment names the piece; the signed invocation that
//! authorizes the read (including the requested byte range as a caveat)
//! travels as a base64-encoded JSON `?invocation=` query parameter, since a
//! `GET` request has no body to carry it in. On a successful read the
//! response streams the blob body directly and the stored receipt is
//! appended to the egress journal out of band — the append must not hold
//! up the response.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::codec::key_encoding::KeyEncoder;
use crate::domain::capability::Invocation;
use crate::domain::errors::CoreError;
use crate::domain::link::Link;
use crate::http::app::AppState;

#[derive(Debug, Deserialize)]
pub struct RetrievalQuery {
    invocation: String,
}

pub async fn handle_retrieval(
    State(state): State<Arc<AppState>>,
    Path(cid): Path<String>,
    Query(query): Query<RetrievalQuery>,
) -> Response {
    let link = match Link::from_str(&cid) {
        Ok(link) => link,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "malformed cid" }))).into_response(),
    };
    let digest = match link.digest() {
        Ok(digest) => digest,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "unsupported cid" }))).into_response(),
    };

    let invocation_bytes = match base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &query.invocation) {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "invocation is not valid base64" }))).into_response(),
    };
    let invocation: Invocation = match serde_json::from_slice(&invocation_bytes) {
        Ok(invocation) => invocation,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "invocation is not valid json" }))).into_response(),
    };

    let now_unix = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    let cancel = state.shutdown.child_token();

    let (receipt, body) = match state.server.retrieve_with_body(invocation, digest, now_unix, cancel).await {
        Ok(result) => result,
        Err(CoreError::Cancelled) => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "retrieval dispatch failed with a transport-level error");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let journal = state.journal.clone();
    let receipt_for_journal = receipt.clone();
    tokio::spawn(async move {
        if let Err(e) = journal.append(&receipt_for_journal).await {
            tracing::warn!(error = %e, "failed to append retrieve receipt to egress journal");
        }
    });

    let Some(body) = body else {
        return not_ok_response(&receipt);
    };

    let mut headers = HeaderMap::new();
    let etag = format!("\"{}\"", KeyEncoder::Base32.encode(&digest));
    headers.insert(axum::http::header::CONTENT_TYPE, "application/octet-stream".parse().unwrap());
    headers.insert(axum::http::header::ETAG, etag.parse().unwrap());
    headers.insert(axum::http::header::ACCEPT_RANGES, "bytes".parse().unwrap());
    headers.insert(
        axum::http::header::CACHE_CONTROL,
        "public, max-age=29030400, immutable".parse().unwrap(),
    );

    let crate::domain::receipt::Outcome::Ok(value) = &receipt.out else {
        return not_ok_response(&receipt);
    };
    let content_length = value.get("content_length").and_then(|v| v.as_u64()).unwrap_or(body.size);
    let total_size = value.get("total_size").and_then(|v| v.as_u64()).unwrap_or(body.size);
    let is_partial = value.get("partial").and_then(|v| v.as_bool()).unwrap_or(false);
    let range_start = value.get("start").and_then(|v| v.as_u64()).unwrap_or(0);
    let range_end = value.get("end").and_then(|v| v.as_u64()).unwrap_or_else(|| content_length.saturating_sub(1));

    headers.insert(axum::http::header::CONTENT_LENGTH, content_length.into());

    let stream = ReaderStream::new(body.reader);
    let stream_body = Body::from_stream(stream);

    let status = if is_partial {
        headers.insert(
            axum::http::header::CONTENT_RANGE,
            format!("bytes {range_start}-{range_end}/{total_size}").parse().unwrap(),
        );
        headers.insert(axum::http::header::VARY, "Range, Accept-Encoding".parse().unwrap());
        StatusCode::PARTIAL_CONTENT
    } else {
        headers.insert(axum::http::header::VARY, "Accept-Encoding".parse().unwrap());
        StatusCode::OK
    };

    (status, headers, stream_body).into_response()
}

/// An invocation that verified but whose outcome was an error (not found,
/// range not satisfiable, unauthorized) still produces a 200 receipt
/// envelope per `spec.md` §6 — the HTTP status line reports the outcome
/// only for the subset the protocol maps to distinct statuses.
fn not_ok_response(receipt: &crate::domain::receipt::Receipt) -> Response {
    use crate::domain::receipt::{Outcome, ReceiptError};
    match &receipt.out {
        Outcome::Error(ReceiptError::NotFoundError) => StatusCode::NOT_FOUND.into_response(),
        Outcome::Error(ReceiptError::RangeNotSatisfiableError { size, .. }) => {
            let mut headers = HeaderMap::new();
            headers.insert(axum::http::header::CONTENT_RANGE, format!("bytes */{}", size).parse().unwrap());
            (StatusCode::RANGE_NOT_SATISFIABLE, headers, Json(receipt)).into_response()
        }
        Outcome::Error(ReceiptError::Unauthorized) | Outcome::Error(ReceiptError::InvalidResource) => {
            (StatusCode::OK, Json(receipt)).into_response()
        }
        Outcome::Ok(_) => (StatusCode::INTERNAL_SERVER_ERROR, Json(receipt)).into_response(),
    }
}
