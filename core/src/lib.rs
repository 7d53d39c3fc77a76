// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # storage-node-core
//!
//! Core serving path for a single content-addressed storage node: the
//! domain model, the pluggable object-store abstraction, the capability
//! server that authorizes and dispatches `allocate`/`accept`/`retrieve`
//! invocations, and the egress journal that batches receipts for
//! downstream consolidation.
//!
//! ## Module layout
//!
//! ```text
//! http/              ← axum router: invocation, retrieval, admin endpoints
//!     ↓
//! capability_server/  ← verifies invocations, dispatches by ability, signs receipts
//!     ↓
//! blob/, presign/     ← content-addressed blob I/O, pre-signed upload URLs
//!     ↓
//! store/              ← ObjectStore trait + filesystem/embedded-kv/S3 backends, typed stores
//!     ↓
//! domain/              ← digest, link, capability, receipt, config, error types
//! ```
//!
//! `egress/` and `codec/` sit beside this stack rather than under it:
//! `egress` drains accepted receipts into rotated CAR batches for the
//! tracker service; `codec` is the shared key-encoding and CBOR helpers
//! the stores and journal both depend on.
//!
//! This crate never touches the filesystem for configuration or reads
//! environment variables directly — that belongs to the `cli` crate's
//! loader, which hands this crate a fully parsed [`domain::node_config::NodeConfigManifest`].

pub mod blob;
pub mod capability_server;
pub mod codec;
pub mod domain;
pub mod egress;
pub mod http;
pub mod presign;
pub mod store;
