// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Core error taxonomy.
//!
//! Every fallible operation below the capability-server boundary resolves to
//! one of these kinds. Backend- and store-specific error enums (see
//! [`crate::store::object_store::ObjectStoreError`],
//! [`crate::blob::blob_store::BlobError`]) convert into `CoreError` via
//! `From`; nothing downstream of the handler boundary matches on error
//! strings.

use thiserror::Error;

use crate::domain::capability::ByteRange;

/// The closed set of error kinds the core returns up to the handler boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A queried key does not exist. Recoverable; maps to a `NotFoundError`
    /// receipt and HTTP 404.
    #[error("not found")]
    NotFound,

    /// The requested byte range crosses or exceeds the object's bounds.
    #[error("range not satisfiable: {range:?} for size {size}")]
    RangeNotSatisfiable { range: ByteRange, size: u64 },

    /// Bytes received do not hash to the claimed digest, or the declared
    /// size did not match what was consumed. Permanent, non-retryable.
    #[error("data inconsistent: {reason}")]
    DataInconsistent { reason: String },

    /// The capability chain does not authorize the invocation. Never leaks
    /// internal details to the caller.
    #[error("unauthorized")]
    Unauthorized,

    /// The capability's resource does not match the node identity or the
    /// scope the caller is operating under.
    #[error("invalid resource")]
    InvalidResource,

    /// Network, timeout, descriptor exhaustion, or another transient backend
    /// condition that survived the backend's own retry budget.
    #[error("transient backend error: {0}")]
    Transient(String),

    /// The caller's deadline elapsed or the operation was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl CoreError {
    /// `true` for error kinds that are safe to retry at a higher layer
    /// (transient backend failures). Everything else is either permanent
    /// (`DataInconsistent`) or already a terminal outcome for the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }
}
