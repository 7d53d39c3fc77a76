// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Generic `<K, V>` store layered over an [`ObjectStore`], parameterized by
//! a [`Codec`] and a key prefix. `spec.md` §4.2.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::codec::cbor::{Codec, CodecError};
use crate::domain::errors::CoreError;
use crate::store::object_store::{ObjectStore, ObjectStoreError};

#[derive(Debug, thiserror::Error)]
pub enum TypedStoreError {
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<TypedStoreError> for CoreError {
    fn from(err: TypedStoreError) -> Self {
        match err {
            TypedStoreError::Store(e) => e.into(),
            TypedStoreError::Codec(e) => CoreError::DataInconsistent { reason: e.to_string() },
        }
    }
}

/// A value store over an [`ObjectStore`], with a fixed key prefix and a
/// codec for `V`. `C` is a zero-sized [`Codec`] implementor (e.g.
/// `DagCborCodec<V>`).
pub struct TypedStore<V, C: Codec<V>> {
    backend: Arc<dyn ObjectStore>,
    prefix: String,
    _value: PhantomData<V>,
    _codec: PhantomData<C>,
}

impl<V, C: Codec<V>> TypedStore<V, C> {
    pub fn new(backend: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            _value: PhantomData,
            _codec: PhantomData,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }

    pub async fn get(&self, key: &str, cancel: CancellationToken) -> Result<V, TypedStoreError> {
        let full_key = self.full_key(key);
        let mut body = self.backend.get(&full_key, None, cancel).await?;
        let mut buf = Vec::with_capacity(body.size as usize);
        body.reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| TypedStoreError::Store(ObjectStoreError::Transient(e.to_string())))?;
        Ok(C::decode(&buf)?)
    }

    /// First match under `prefix_within_store` — used for cross-space
    /// existence checks (`GetAny(digest)`).
    pub async fn get_any(
        &self,
        prefix_within_store: &str,
        cancel: CancellationToken,
    ) -> Result<V, TypedStoreError> {
        let full_prefix = self.full_key(prefix_within_store);
        let keys = self.backend.list_prefix(&full_prefix, cancel.clone()).await?;
        let first = keys
            .into_iter()
            .next()
            .ok_or_else(|| ObjectStoreError::NotFound(full_prefix.clone()))?;
        let mut body = self.backend.get(&first, None, cancel).await?;
        let mut buf = Vec::with_capacity(body.size as usize);
        body.reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| TypedStoreError::Store(ObjectStoreError::Transient(e.to_string())))?;
        Ok(C::decode(&buf)?)
    }

    pub async fn exists_with_prefix(
        &self,
        prefix_within_store: &str,
        cancel: CancellationToken,
    ) -> Result<bool, TypedStoreError> {
        let full_prefix = self.full_key(prefix_within_store);
        let keys = self.backend.list_prefix(&full_prefix, cancel).await?;
        Ok(!keys.is_empty())
    }

    pub async fn put(&self, key: &str, value: &V, cancel: CancellationToken) -> Result<(), TypedStoreError> {
        let encoded = C::encode(value)?;
        let full_key = self.full_key(key);
        let size = encoded.len() as u64;
        let reader = Box::new(std::io::Cursor::new(Bytes::from(encoded)));
        self.backend.put(&full_key, size, reader, cancel).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str, cancel: CancellationToken) -> Result<(), TypedStoreError> {
        let full_key = self.full_key(key);
        self.backend.delete(&full_key, cancel).await?;
        Ok(())
    }

    pub async fn list_prefix(
        &self,
        prefix_within_store: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<String>, TypedStoreError> {
        let full_prefix = self.full_key(prefix_within_store);
        Ok(self.backend.list_prefix(&full_prefix, cancel).await?)
    }
}
