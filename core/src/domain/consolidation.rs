// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Consolidation records: produced when the egress tracker's `track`
//! invocation comes back with a "please consolidate" effect.

use serde::{Deserialize, Serialize};

use crate::domain::link::Link;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationRecord {
    pub track_invocation: Link,
    pub consolidate_invocation_cid: Link,
}
