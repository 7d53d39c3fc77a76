// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `allocate` handler: reserve space for an upcoming blob. `spec.md` §4.9.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::allocation::{Allocation, BlobRef};
use crate::domain::capability::{Did, Invocation, InvocationArguments, Resource};
use crate::domain::digest::Digest;
use crate::domain::errors::CoreError;
use crate::domain::link::Link;
use crate::presign::presigner::{PresignedUpload, Presigner};
use crate::store::allocation_store::AllocationStore;

pub struct AllocateOutcome {
    pub allocation: Allocation,
    /// Empty when the blob is already present — the client can skip the
    /// upload step entirely.
    pub upload: Option<PresignedUpload>,
}

/// Verify auth is the caller's responsibility (`spec.md` §4.6 dispatch);
/// this function assumes the invocation has already passed
/// [`crate::capability_server::verifier::verify_invocation`].
pub async fn handle_allocate(
    invocation: &Invocation,
    digest: &Digest,
    blob_present: bool,
    allocations: &AllocationStore,
    presigner: &dyn Presigner,
    presign_ttl: Duration,
    now_unix: i64,
    cause: Link,
    cancel: CancellationToken,
) -> Result<AllocateOutcome, CoreError> {
    let InvocationArguments::Allocate { claimed_size } = invocation.arguments else {
        return Err(CoreError::InvalidResource);
    };
    let space: Did = *invocation.resource.space().ok_or(CoreError::InvalidResource)?;

    if let Ok(existing) = allocations.get(digest, &space, cancel.clone()).await {
        let upload = if blob_present {
            None
        } else {
            presigner.presign(digest, existing.blob.size, presign_ttl).await?
        };
        return Ok(AllocateOutcome {
            allocation: existing,
            upload,
        });
    }

    let allocation = Allocation {
        space,
        blob: BlobRef {
            digest: *digest,
            size: claimed_size,
        },
        expires: now_unix + 24 * 60 * 60,
        cause,
    };
    allocations
        .put(&allocation, cancel.clone())
        .await
        .map_err(CoreError::from)?;

    let upload = if blob_present {
        None
    } else {
        presigner.presign(digest, claimed_size, presign_ttl).await?
    };

    Ok(AllocateOutcome { allocation, upload })
}
