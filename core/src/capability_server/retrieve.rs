// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `retrieve` handler: byte-range reads over a stored blob.
//!
//! Two invocation shapes share this handler, per `spec.md` §4.6/§4.8:
//! `space/content/retrieve` is scoped to a Space (and optionally one
//! Piece within it); `blob/retrieve` is scoped only to the node's own
//! identity and requires no Space membership at all. The caller picks
//! which check applies by the `Resource` variant on the invocation.

use tokio_util::sync::CancellationToken;

use crate::blob::blob_store::{BlobObject, BlobStore};
use crate::domain::capability::{Ability, Did, Invocation, InvocationArguments, Resource};
use crate::domain::digest::Digest;
use crate::domain::errors::CoreError;
use crate::store::acceptance_store::AcceptanceStore;

pub struct RetrieveOutcome {
    pub start: u64,
    pub end: u64,
    pub content_length: u64,
    pub total_size: u64,
    pub is_partial: bool,
    pub body: BlobObject,
}

/// Verify auth is the caller's responsibility, same as
/// [`super::allocate::handle_allocate`]. This function additionally
/// enforces the resource-identity check that distinguishes the two
/// `retrieve` invocation shapes: a `space/content/retrieve` resource must
/// have an Acceptance on record for `(digest, space)` — `spec.md` §4.6's
/// `Accepted` precondition — while a `Node` resource (`blob/retrieve`)
/// must name this node's own DID and requires no Space membership at all.
pub async fn handle_retrieve(
    invocation: &Invocation,
    digest: &Digest,
    this_node: &Did,
    blobs: &BlobStore,
    acceptances: &AcceptanceStore,
    cancel: CancellationToken,
) -> Result<RetrieveOutcome, CoreError> {
    let InvocationArguments::Retrieve { range } = invocation.arguments else {
        return Err(CoreError::InvalidResource);
    };

    // `blob/retrieve` honors no range caveat — full-object only, per
    // `spec.md` §4.8's `blob/retrieve` variant.
    let range = match &invocation.resource {
        Resource::Space { space } | Resource::Piece { space, .. } => {
            // `spec.md` §4.8 step 2 names `Allocations.Get` as the literal
            // first check; this checks the Acceptance store instead, per
            // §4.6's `Accepted` state-machine precondition for `retrieve`
            // (an Allocation alone only reaches the `Allocated` state, not
            // `Accepted`) and per every §8 scenario, all of which gate
            // retrieval on acceptance, not allocation.
            acceptances
                .get(digest, space, cancel.clone())
                .await
                .map_err(|_| CoreError::NotFound)?;
            range
        }
        Resource::Node { node } => {
            if node != this_node {
                return Err(CoreError::InvalidResource);
            }
            None
        }
    };

    let body = blobs.get(digest, range, cancel).await.map_err(CoreError::from)?;
    let total_size = body.size;
    let (content_length, end, is_partial) = crate::store::object_store::resolve_range(range, total_size)?;
    let start = range.map(|r| r.start).unwrap_or(0);

    Ok(RetrieveOutcome {
        start,
        end,
        content_length,
        total_size,
        is_partial,
        body: BlobObject {
            size: body.size,
            reader: body.reader,
        },
    })
}
