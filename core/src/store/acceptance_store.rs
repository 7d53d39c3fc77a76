// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Acceptance store: `(digest, space) → Acceptance`. `spec.md` §4.3.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::codec::cbor::DagCborCodec;
use crate::codec::key_encoding::{scoped_key, KeyEncoder};
use crate::domain::acceptance::Acceptance;
use crate::domain::capability::Did;
use crate::domain::digest::Digest;
use crate::store::object_store::ObjectStore;
use crate::store::typed_store::{TypedStore, TypedStoreError};

pub struct AcceptanceStore {
    inner: TypedStore<Acceptance, DagCborCodec<Acceptance>>,
    encoder: KeyEncoder,
}

impl AcceptanceStore {
    pub fn new(backend: Arc<dyn ObjectStore>, encoder: KeyEncoder) -> Self {
        Self {
            inner: TypedStore::new(backend, "acceptances"),
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
    ) -> Result<Acceptance, TypedStoreError> {
        self.inner.get(&self.key(digest, space), cancel).await
    }

    pub async fn get_any(&self, digest: &Digest, cancel: CancellationToken) -> Result<Acceptance, TypedStoreError> {
        self.inner.get_any(&self.encoder.encode(digest), cancel).await
    }

    pub async fn exists(&self, digest: &Digest, cancel: CancellationToken) -> Result<bool, TypedStoreError> {
        self.inner
            .exists_with_prefix(&self.encoder.encode(digest), cancel)
            .await
    }

    pub async fn put(&self, acceptance: &Acceptance, cancel: CancellationToken) -> Result<(), TypedStoreError> {
        let key = self.key(&acceptance.blob.digest, &acceptance.space);
        self.inner.put(&key, acceptance, cancel).await
    }
}
