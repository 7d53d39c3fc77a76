// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `accept` handler: finalize an allocated upload once bytes have landed.
//! `spec.md` §4.9.

use tokio_util::sync::CancellationToken;

use crate::domain::acceptance::Acceptance;
use crate::domain::capability::{Did, Invocation, InvocationArguments};
use crate::domain::digest::Digest;
use crate::domain::errors::CoreError;
use crate::domain::link::Link;
use crate::store::acceptance_store::AcceptanceStore;
use crate::store::allocation_store::AllocationStore;

/// External collaborator interfaces the `accept` handler may call after
/// writing the Acceptance. `spec.md` §13: out-of-scope subsystems
/// addressed only through their required interface.
#[async_trait::async_trait]
pub trait PdpSubmitter: Send + Sync {
    async fn submit_piece(&self, digest: &Digest, size: u64) -> Result<crate::domain::acceptance::PdpPromise, CoreError>;
}

pub struct NullPdpSubmitter;

#[async_trait::async_trait]
impl PdpSubmitter for NullPdpSubmitter {
    async fn submit_piece(&self, _digest: &Digest, _size: u64) -> Result<crate::domain::acceptance::PdpPromise, CoreError> {
        Err(CoreError::Transient("no PDP subsystem configured".to_string()))
    }
}

#[async_trait::async_trait]
pub trait ContentAdvertiser: Send + Sync {
    async fn advertise(&self, digest: &Digest, provider_url: &str) -> Result<(), CoreError>;
}

pub struct NullContentAdvertiser;

#[async_trait::async_trait]
impl ContentAdvertiser for NullContentAdvertiser {
    async fn advertise(&self, _digest: &Digest, _provider_url: &str) -> Result<(), CoreError> {
        Ok(())
    }
}

pub async fn handle_accept(
    invocation: &Invocation,
    digest: &Digest,
    blob_size: u64,
    allocations: &AllocationStore,
    acceptances: &AcceptanceStore,
    pdp: Option<&dyn PdpSubmitter>,
    advertiser: &dyn ContentAdvertiser,
    public_url: &str,
    now_unix: i64,
    cause: Link,
    cancel: CancellationToken,
) -> Result<Acceptance, CoreError> {
    let InvocationArguments::Accept { .. } = &invocation.arguments else {
        return Err(CoreError::InvalidResource);
    };
    let space: Did = *invocation.resource.space().ok_or(CoreError::InvalidResource)?;

    let allocation = allocations
        .get(digest, &space, cancel.clone())
        .await
        .map_err(|_| CoreError::NotFound)?;

    if allocation.blob.size != blob_size {
        return Err(CoreError::DataInconsistent {
            reason: format!(
                "allocation declared size {}, blob is {} bytes",
                allocation.blob.size, blob_size
            ),
        });
    }

    let pdp_accept = match pdp {
        Some(submitter) => submitter.submit_piece(digest, blob_size).await.ok(),
        None => None,
    };

    let acceptance = Acceptance {
        space,
        blob: allocation.blob,
        pdp_accept,
        executed_at: now_unix,
        cause,
    };
    acceptances.put(&acceptance, cancel).await.map_err(CoreError::from)?;

    if advertiser.advertise(digest, public_url).await.is_err() {
        tracing::warn!(digest = %digest, "content advertisement failed; acceptance already durable");
    }

    Ok(acceptance)
}
