// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Allocation store: `(digest, space) → Allocation`, keyed
//! `{encoded_digest}/{space}`. `spec.md` §4.3.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::codec::cbor::DagCborCodec;
use crate::codec::key_encoding::{scoped_key, KeyEncoder};
use crate::domain::allocation::Allocation;
use crate::domain::capability::Did;
use crate::domain::digest::Digest;
use crate::store::object_store::ObjectStore;
use crate::store::typed_store::{TypedStore, TypedStoreError};

pub struct AllocationStore {
    inner: TypedStore<Allocation, DagCborCodec<Allocation>>,
    encoder: KeyEncoder,
}

impl AllocationStore {
    pub fn new(backend: Arc<dyn ObjectStore>, encoder: KeyEncoder) -> Self {
        Self {
            inner: TypedStore::new(backend, "allocations"),
            encoder,
        }
    }

    fn key(&self, digest: &Digest, space: &Did) -> String {
        scoped_key(self.encoder, digest, space)
    }

    pub async fn get(
        &self,
        digest: &Digest,
        space: &Did,
        cancel: CancellationToken,
    ) -> Result<Allocation, TypedStoreError> {
        self.inner.get(&self.key(digest, space), cancel).await
    }

    /// First Allocation for `digest` in any space — used for cross-space
    /// existence checks.
    pub async fn get_any(&self, digest: &Digest, cancel: CancellationToken) -> Result<Allocation, TypedStoreError> {
        self.inner.get_any(&self.encoder.encode(digest), cancel).await
    }

    pub async fn exists(&self, digest: &Digest, cancel: CancellationToken) -> Result<bool, TypedStoreError> {
        self.inner
            .exists_with_prefix(&self.encoder.encode(digest), cancel)
            .await
    }

    /// Upsert, per `spec.md` §3 invariant 1: at most one Allocation per
    /// `(digest, space)`.
    pub async fn put(&self, allocation: &Allocation, cancel: CancellationToken) -> Result<(), TypedStoreError> {
        let key = self.key(&allocation.blob.digest, &allocation.space);
        self.inner.put(&key, allocation, cancel).await
    }
}
