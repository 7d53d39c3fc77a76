// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Acceptance records: completed ingestions. Written once per successful
//! `accept`, never mutated.

use serde::{Deserialize, Serialize};

use crate::domain::allocation::BlobRef;
use crate::domain::capability::Did;
use crate::domain::link::Link;

/// A forward reference into the (external, out-of-scope) proof-of-data-
/// possession aggregation subsystem. The core only ever stores or returns
/// this value; it never inspects or awaits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdpPromise {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceptance {
    pub space: Did,
    pub blob: BlobRef,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pdp_accept: Option<PdpPromise>,
    pub executed_at: i64,
    pub cause: Link,
}
