// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Content-addressed blob store, layered over an [`ObjectStore`].
//!
//! `spec.md` §4.4: `Put` must verify the SHA-256 of the bytes read equals
//! the digest's embedded bytes *and* that the consumed byte count equals
//! the declared size, with the two failure modes distinguishable
//! (`inconsistent` vs. size mismatch). The backend already enforces the
//! size half of that contract; this layer wraps the reader to compute the
//! running hash and, on a post-hoc mismatch, deletes the object the
//! backend made visible — a write that "succeeded" at the backend level
//! but fails content verification must not leave a visible blob.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use sha2::{Digest as _, Sha256};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;

use crate::codec::key_encoding::KeyEncoder;
use crate::domain::capability::ByteRange;
use crate::domain::digest::Digest;
use crate::domain::errors::CoreError;
use crate::store::object_store::{ObjectStore, ObjectStoreError};

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
    #[error("blob bytes do not hash to the claimed digest")]
    Inconsistent,
}

impl From<BlobStoreError> for CoreError {
    fn from(err: BlobStoreError) -> Self {
        match err {
            BlobStoreError::Store(e) => e.into(),
            BlobStoreError::Inconsistent => CoreError::DataInconsistent {
                reason: "SHA-256 of uploaded bytes did not match the claimed digest".to_string(),
            },
        }
    }
}

pub struct BlobObject {
    pub size: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

pub struct BlobStore {
    backend: std::sync::Arc<dyn ObjectStore>,
    encoder: KeyEncoder,
}

impl BlobStore {
    pub fn new(backend: std::sync::Arc<dyn ObjectStore>, encoder: KeyEncoder) -> Self {
        Self { backend, encoder }
    }

    fn key_for(&self, digest: &Digest) -> String {
        format!("blobs/{}", self.encoder.encode(digest))
    }

    /// Writes `reader` under `digest`'s key, verifying along the way that
    /// the running SHA-256 matches `digest`. The backend enforces
    /// `size == bytes consumed`; this layer enforces content identity and
    /// deletes on a post-hoc mismatch.
    pub async fn put(
        &self,
        digest: &Digest,
        size: u64,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        cancel: CancellationToken,
    ) -> Result<(), BlobStoreError> {
        let key = self.key_for(digest);
        let hashing = HashingReader::new(reader);
        let hash_handle = hashing.hash_handle();

        self.backend.put(&key, size, Box::new(hashing), cancel.clone()).await?;

        let actual = hash_handle.finalize();
        if actual != *digest {
            self.backend.delete(&key, cancel).await.ok();
            return Err(BlobStoreError::Inconsistent);
        }
        Ok(())
    }

    pub async fn get(
        &self,
        digest: &Digest,
        range: Option<ByteRange>,
        cancel: CancellationToken,
    ) -> Result<BlobObject, BlobStoreError> {
        let key = self.key_for(digest);
        let body = self.backend.get(&key, range, cancel).await?;
        Ok(BlobObject {
            size: body.size,
            reader: body.reader,
        })
    }

    pub async fn exists(&self, digest: &Digest, cancel: CancellationToken) -> Result<bool, BlobStoreError> {
        Ok(self.backend.exists(&self.key_for(digest), cancel).await?)
    }

    pub async fn delete(&self, digest: &Digest, cancel: CancellationToken) -> Result<(), BlobStoreError> {
        Ok(self.backend.delete(&self.key_for(digest), cancel).await?)
    }

    pub async fn health_check(&self, cancel: CancellationToken) -> Result<(), BlobStoreError> {
        Ok(self.backend.health_check(cancel).await?)
    }
}

/// Wraps an `AsyncRead`, feeding every byte through a running SHA-256 as
/// it's consumed by the backend, without buffering the whole blob.
struct HashingReader {
    inner: Box<dyn AsyncRead + Send + Unpin>,
    hasher: std::sync::Arc<std::sync::Mutex<Option<Sha256>>>,
}

struct HashHandle {
    hasher: std::sync::Arc<std::sync::Mutex<Option<Sha256>>>,
}

impl HashHandle {
    fn finalize(self) -> Digest {
        let hasher = self.hasher.lock().expect("hasher mutex poisoned").take().expect("finalize called once");
        let out = hasher.finalize();
        let mut raw = [0u8; 32];
        raw.copy_from_slice(&out);
        Digest::from_raw_sha256(raw)
    }
}

impl HashingReader {
    fn new(inner: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self {
            inner,
            hasher: std::sync::Arc::new(std::sync::Mutex::new(Some(Sha256::new()))),
        }
    }

    fn hash_handle(&self) -> HashHandle {
        HashHandle {
            hasher: self.hasher.clone(),
        }
    }
}

impl AsyncRead for HashingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let new_bytes = &buf.filled()[before..];
            if !new_bytes.is_empty() {
                if let Some(hasher) = self.hasher.lock().expect("hasher mutex poisoned").as_mut() {
                    hasher.update(new_bytes);
                }
            }
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backends::embedded_kv::EmbeddedKvObjectStore;
    use std::sync::Arc;

    fn temp_store() -> (tempfile::TempDir, Arc<EmbeddedKvObjectStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddedKvObjectStore::open(dir.path().join("db")).unwrap();
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn put_then_get_round_trips_bytes() {
        let (_dir, backend) = temp_store();
        let blob_store = BlobStore::new(backend, KeyEncoder::Plain);
        let content = b"hello blob store".to_vec();
        let digest = Digest::of(&content);

        blob_store
            .put(
                &digest,
                content.len() as u64,
                Box::new(std::io::Cursor::new(content.clone())),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut object = blob_store.get(&digest, None, CancellationToken::new()).await.unwrap();
        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut object.reader, &mut out).await.unwrap();
        assert_eq!(out, content);
        assert_eq!(object.size, content.len() as u64);
    }

    /// `spec.md` §8 "concurrent writes to one key": two concurrent
    /// `Blob.Put` calls for the same digest must both succeed and leave the
    /// correct bytes visible. This specifically exercises the filesystem
    /// backend's write-collapsing op map, not the embedded KV backend used
    /// by the tests above — a regression here previously caused the
    /// collapsed (losing) caller's `HashingReader` to be read from zero
    /// bytes, fail content verification, and delete the object the winner
    /// had just stored.
    #[tokio::test]
    async fn concurrent_puts_for_the_same_digest_both_succeed() {
        use crate::store::backends::filesystem::{FilesystemObjectStore, ShardStrategy};

        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(
            FilesystemObjectStore::open(dir.path(), ShardStrategy::HashPrefix)
                .await
                .unwrap(),
        );
        let blob_store = Arc::new(BlobStore::new(backend, KeyEncoder::Base32));
        let content = b"identical content uploaded by two concurrent writers".to_vec();
        let digest = Digest::of(&content);

        let (first, second) = tokio::join!(
            blob_store.put(
                &digest,
                content.len() as u64,
                Box::new(std::io::Cursor::new(content.clone())),
                CancellationToken::new(),
            ),
            blob_store.put(
                &digest,
                content.len() as u64,
                Box::new(std::io::Cursor::new(content.clone())),
                CancellationToken::new(),
            ),
        );
        assert!(first.is_ok(), "first concurrent put failed: {first:?}");
        assert!(second.is_ok(), "second concurrent put failed: {second:?}");

        let mut object = blob_store.get(&digest, None, CancellationToken::new()).await.unwrap();
        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut object.reader, &mut out).await.unwrap();
        assert_eq!(out, content);
    }

    #[tokio::test]
    async fn mismatched_digest_is_rejected_and_not_visible() {
        let (_dir, backend) = temp_store();
        let blob_store = BlobStore::new(backend, KeyEncoder::Plain);
        let content = b"actual content".to_vec();
        let wrong_digest = Digest::of(b"different content");

        let err = blob_store
            .put(
                &wrong_digest,
                content.len() as u64,
                Box::new(std::io::Cursor::new(content)),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStoreError::Inconsistent));

        assert!(!blob_store.exists(&wrong_digest, CancellationToken::new()).await.unwrap());
    }
}
