// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! The node's HTTP surface: one `axum::Router` exposing invocation
//! dispatch, byte-range retrieval, and the admin shutdown endpoint.
//! `spec.md` §6.

pub mod admin;
pub mod app;
pub mod invocation;
pub mod retrieval;
