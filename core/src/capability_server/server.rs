// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! The capability server: verifies an invocation, dispatches it to the
//! matching handler, and wraps the outcome in a signed, stored [`Receipt`].
//! `spec.md` §4.9.

use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use tokio_util::sync::CancellationToken;

use crate::blob::blob_store::BlobStore;
use crate::capability_server::accept::{handle_accept, ContentAdvertiser, PdpSubmitter};
use crate::capability_server::allocate::handle_allocate;
use crate::capability_server::retrieve::handle_retrieve;
use crate::capability_server::verifier::verify_invocation;
use crate::domain::capability::{Ability, Did, Invocation, Resource};
use crate::domain::digest::Digest;
use crate::domain::errors::CoreError;
use crate::domain::link::Link;
use crate::domain::receipt::{IpldBlock, Outcome, Receipt, ReceiptError};
use crate::presign::presigner::Presigner;
use crate::store::acceptance_store::AcceptanceStore;
use crate::store::allocation_store::AllocationStore;
use crate::store::receipt_store::ReceiptStore;

/// The node's identity key, used to sign outgoing receipts. Invocations are
/// signed by *clients*; receipts are signed by the *node* attesting to the
/// outcome it produced.
pub struct CapabilityServer {
    pub node_identity: Did,
    signing_key: SigningKey,
    pub allocations: AllocationStore,
    pub acceptances: AcceptanceStore,
    pub receipts: ReceiptStore,
    pub blobs: BlobStore,
    pub presigner: Arc<dyn Presigner>,
    pub pdp: Option<Arc<dyn PdpSubmitter>>,
    pub advertiser: Arc<dyn ContentAdvertiser>,
    pub presign_ttl: Duration,
    pub public_url: String,
}

impl CapabilityServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_identity: Did,
        signing_key: SigningKey,
        allocations: AllocationStore,
        acceptances: AcceptanceStore,
        receipts: ReceiptStore,
        blobs: BlobStore,
        presigner: Arc<dyn Presigner>,
        pdp: Option<Arc<dyn PdpSubmitter>>,
        advertiser: Arc<dyn ContentAdvertiser>,
        presign_ttl: Duration,
        public_url: String,
    ) -> Self {
        Self {
            node_identity,
            signing_key,
            allocations,
            acceptances,
            receipts,
            blobs,
            presigner,
            pdp,
            advertiser,
            presign_ttl,
            public_url,
        }
    }

    /// Verify, dispatch, and produce a stored receipt for one invocation.
    /// `path_digest` is `Some` only for `retrieve`, where the digest
    /// travels as the `/piece/{cid}` URL parameter rather than inside the
    /// signed resource.
    pub async fn dispatch(
        &self,
        invocation: Invocation,
        path_digest: Option<Digest>,
        now_unix: i64,
        cancel: CancellationToken,
    ) -> Result<Receipt, CoreError> {
        let ran = invocation_link(&invocation)?;

        let outcome = match verify_invocation(&invocation, now_unix) {
            Ok(()) => match invocation.ability {
                Ability::Allocate => self.dispatch_allocate(&invocation, ran, now_unix, cancel.clone()).await,
                Ability::Accept => self.dispatch_accept(&invocation, ran, now_unix, cancel.clone()).await,
                Ability::Retrieve => self.dispatch_retrieve(&invocation, path_digest, ran, cancel.clone()).await,
            },
            Err(e) => Err(e),
        };

        let receipt = match outcome {
            Ok(value) => Receipt::ok(ran, ran, value, vec![]),
            Err(e @ (CoreError::Transient(_) | CoreError::Cancelled)) => return Err(e),
            Err(e) => self.error_receipt(ran, e)?,
        };

        self.receipts.put(&receipt, cancel).await.map_err(CoreError::from)?;
        Ok(receipt)
    }

    fn error_receipt(&self, ran: Link, error: CoreError) -> Result<Receipt, CoreError> {
        let receipt_error = match error {
            CoreError::NotFound => ReceiptError::NotFoundError,
            CoreError::RangeNotSatisfiable { range, size } => ReceiptError::RangeNotSatisfiableError { range, size },
            CoreError::Unauthorized => ReceiptError::Unauthorized,
            CoreError::InvalidResource => ReceiptError::InvalidResource,
            other => return Err(other),
        };
        Ok(Receipt::error(ran, ran, receipt_error, vec![]))
    }

    async fn dispatch_allocate(
        &self,
        invocation: &Invocation,
        cause: Link,
        now_unix: i64,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, CoreError> {
        let digest = piece_digest(&invocation.resource)?;
        let blob_present = self.blobs.exists(&digest, cancel.clone()).await.map_err(CoreError::from)?;

        let outcome = handle_allocate(
            invocation,
            &digest,
            blob_present,
            &self.allocations,
            self.presigner.as_ref(),
            self.presign_ttl,
            now_unix,
            cause,
            cancel,
        )
        .await?;

        Ok(match outcome.upload {
            Some(upload) => serde_json::json!({
                "expires": outcome.allocation.expires,
                "upload": {
                    "url": upload.url,
                    "method": upload.method,
                    "headers": upload.required_headers,
                },
            }),
            None => serde_json::json!({ "expires": outcome.allocation.expires, "upload": null }),
        })
    }

    async fn dispatch_accept(
        &self,
        invocation: &Invocation,
        cause: Link,
        now_unix: i64,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, CoreError> {
        let digest = piece_digest(&invocation.resource)?;
        let blob = self.blobs.get(&digest, None, cancel.clone()).await.map_err(CoreError::from)?;

        let acceptance = handle_accept(
            invocation,
            &digest,
            blob.size,
            &self.allocations,
            &self.acceptances,
            self.pdp.as_deref(),
            self.advertiser.as_ref(),
            &self.public_url,
            now_unix,
            cause,
            cancel,
        )
        .await?;

        Ok(serde_json::json!({ "executed_at": acceptance.executed_at }))
    }

    async fn dispatch_retrieve(
        &self,
        invocation: &Invocation,
        path_digest: Option<Digest>,
        _cause: Link,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, CoreError> {
        let digest = path_digest.ok_or(CoreError::InvalidResource)?;
        let outcome = handle_retrieve(invocation, &digest, &self.node_identity, &self.blobs, &self.acceptances, cancel).await?;
        // The byte stream itself is handed back to the HTTP layer out of
        // band; the receipt only records the resolved range metadata.
        Ok(serde_json::json!({
            "start": outcome.start,
            "end": outcome.end,
            "content_length": outcome.content_length,
            "total_size": outcome.total_size,
            "partial": outcome.is_partial,
        }))
    }

    /// Retrieval's HTTP-layer entry point: unlike [`Self::dispatch`], this
    /// hands the byte stream back to the caller instead of folding it into
    /// the receipt's JSON value, since the HTTP handler needs it to stream
    /// the response body. The receipt is still stored synchronously before
    /// this returns; only egress-journal append is the caller's concern to
    /// run asynchronously.
    pub async fn retrieve_with_body(
        &self,
        invocation: Invocation,
        digest: Digest,
        now_unix: i64,
        cancel: CancellationToken,
    ) -> Result<(Receipt, Option<crate::blob::blob_store::BlobObject>), CoreError> {
        let ran = invocation_link(&invocation)?;

        let verified = verify_invocation(&invocation, now_unix);
        let outcome = match verified {
            Ok(()) => handle_retrieve(&invocation, &digest, &self.node_identity, &self.blobs, &self.acceptances, cancel.clone()).await,
            Err(e) => Err(e),
        };

        let (receipt, body) = match outcome {
            Ok(outcome) => {
                let value = serde_json::json!({
                    "start": outcome.start,
                    "end": outcome.end,
                    "content_length": outcome.content_length,
                    "total_size": outcome.total_size,
                    "partial": outcome.is_partial,
                });
                (Receipt::ok(ran, ran, value, vec![]), Some(outcome.body))
            }
            Err(e @ (CoreError::Transient(_) | CoreError::Cancelled)) => return Err(e),
            Err(e) => (self.error_receipt(ran, e)?, None),
        };

        self.receipts.put(&receipt, cancel).await.map_err(CoreError::from)?;
        Ok((receipt, body))
    }

    pub fn sign(&self, payload: &[u8]) -> ed25519_dalek::Signature {
        use ed25519_dalek::Signer;
        self.signing_key.sign(payload)
    }
}

fn piece_digest(resource: &Resource) -> Result<Digest, CoreError> {
    match resource {
        Resource::Piece { piece, .. } => Digest::from_hex(piece).map_err(|_| CoreError::InvalidResource),
        _ => Err(CoreError::InvalidResource),
    }
}

fn invocation_link(invocation: &Invocation) -> Result<Link, CoreError> {
    let bytes = serde_json::to_vec(invocation).map_err(|e| CoreError::DataInconsistent { reason: e.to_string() })?;
    Ok(Link::from_digest(&Digest::of(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability_server::accept::NullContentAdvertiser;
    use crate::codec::key_encoding::KeyEncoder;
    use crate::domain::capability::{ByteRange, InvocationArguments};
    use crate::presign::presigner::NullPresigner;
    use crate::store::backends::embedded_kv::EmbeddedKvObjectStore;
    use ed25519_dalek::Signer;

    fn server(dir: &std::path::Path) -> CapabilityServer {
        let backend: Arc<dyn crate::store::object_store::ObjectStore> =
            Arc::new(EmbeddedKvObjectStore::open(dir.join("db")).unwrap());
        let node_sk = SigningKey::from_bytes(&[9u8; 32]);
        let node_identity = Did(node_sk.verifying_key());
        CapabilityServer::new(
            node_identity,
            node_sk,
            AllocationStore::new(backend.clone(), KeyEncoder::Plain),
            AcceptanceStore::new(backend.clone(), KeyEncoder::Plain),
            ReceiptStore::new(backend.clone()),
            BlobStore::new(backend, KeyEncoder::Plain),
            Arc::new(NullPresigner),
            None,
            Arc::new(NullContentAdvertiser),
            Duration::from_secs(900),
            "https://node.example".to_string(),
        )
    }

    #[tokio::test]
    async fn allocate_then_retrieve_roundtrips_through_receipts() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let owner_sk = SigningKey::from_bytes(&[1u8; 32]);
        let owner = Did(owner_sk.verifying_key());
        let content = b"roundtrip payload".to_vec();
        let digest = Digest::of(&content);

        let resource = Resource::Piece {
            space: owner,
            piece: digest.to_hex(),
        };
        let arguments = InvocationArguments::Allocate { claimed_size: content.len() as u64 };

        #[derive(serde::Serialize)]
        struct SignedPayload<'a> {
            issuer: &'a Did,
            ability: Ability,
            resource: &'a Resource,
            arguments: &'a InvocationArguments,
        }
        let signing_bytes = serde_json::to_vec(&SignedPayload {
            issuer: &owner,
            ability: Ability::Allocate,
            resource: &resource,
            arguments: &arguments,
        })
        .unwrap();
        let signature = owner_sk.sign(&signing_bytes);

        let invocation = Invocation {
            issuer: owner,
            ability: Ability::Allocate,
            resource,
            proofs: vec![],
            arguments,
            signature,
        };

        let receipt = server
            .dispatch(invocation, None, 1_700_000_000, CancellationToken::new())
            .await
            .unwrap();
        assert!(receipt.out.is_ok());

        server
            .blobs
            .put(
                &digest,
                content.len() as u64,
                Box::new(std::io::Cursor::new(content.clone())),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let accept_resource = Resource::Piece {
            space: owner,
            piece: digest.to_hex(),
        };
        let accept_arguments = InvocationArguments::Accept { digest_hex: digest.to_hex() };
        let signing_bytes = serde_json::to_vec(&SignedPayload {
            issuer: &owner,
            ability: Ability::Accept,
            resource: &accept_resource,
            arguments: &accept_arguments,
        })
        .unwrap();
        let signature = owner_sk.sign(&signing_bytes);
        let accept_invocation = Invocation {
            issuer: owner,
            ability: Ability::Accept,
            resource: accept_resource,
            proofs: vec![],
            arguments: accept_arguments,
            signature,
        };
        let receipt = server
            .dispatch(accept_invocation, None, 1_700_000_000, CancellationToken::new())
            .await
            .unwrap();
        assert!(receipt.out.is_ok());

        let retrieve_resource = Resource::Space { space: owner };
        let retrieve_args = InvocationArguments::Retrieve { range: Some(ByteRange::new(0, 3)) };
        let signing_bytes = serde_json::to_vec(&SignedPayload {
            issuer: &owner,
            ability: Ability::Retrieve,
            resource: &retrieve_resource,
            arguments: &retrieve_args,
        })
        .unwrap();
        let signature = owner_sk.sign(&signing_bytes);
        let retrieve_invocation = Invocation {
            issuer: owner,
            ability: Ability::Retrieve,
            resource: retrieve_resource,
            proofs: vec![],
            arguments: retrieve_args,
            signature,
        };

        let receipt = server
            .dispatch(retrieve_invocation, Some(digest), 1_700_000_000, CancellationToken::new())
            .await
            .unwrap();
        assert!(receipt.out.is_ok());
    }

    #[tokio::test]
    async fn retrieve_without_acceptance_in_space_is_not_found_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let owner_sk = SigningKey::from_bytes(&[3u8; 32]);
        let owner = Did(owner_sk.verifying_key());
        let digest = Digest::of(b"never uploaded");

        #[derive(serde::Serialize)]
        struct SignedPayload<'a> {
            issuer: &'a Did,
            ability: Ability,
            resource: &'a Resource,
            arguments: &'a InvocationArguments,
        }
        let resource = Resource::Space { space: owner };
        let arguments = InvocationArguments::Retrieve { range: None };
        let signing_bytes = serde_json::to_vec(&SignedPayload {
            issuer: &owner,
            ability: Ability::Retrieve,
            resource: &resource,
            arguments: &arguments,
        })
        .unwrap();
        let signature = owner_sk.sign(&signing_bytes);
        let invocation = Invocation {
            issuer: owner,
            ability: Ability::Retrieve,
            resource,
            proofs: vec![],
            arguments,
            signature,
        };

        let receipt = server
            .dispatch(invocation, Some(digest), 1_700_000_000, CancellationToken::new())
            .await
            .unwrap();
        assert!(!receipt.out.is_ok());
        assert!(matches!(receipt.out, Outcome::Error(ReceiptError::NotFoundError)));
    }
}
