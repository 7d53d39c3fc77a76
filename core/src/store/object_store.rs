// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! The `ObjectStore` trait: a uniform byte-blob key/value abstraction with
//! ranged `Get`, prefix `List`, and atomic `Put`, implemented by three
//! backends (filesystem, embedded KV, S3-compatible) behind one contract.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::domain::capability::ByteRange;
use crate::domain::errors::CoreError;

/// A byte stream plus the full object size it was sliced from. `size` is
/// always the full object size, never the range length — callers compute
/// the range length themselves from the requested range.
pub struct ObjectBody {
    pub size: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

#[derive(Debug, Clone, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("range not satisfiable: {range:?} for size {size}")]
    RangeNotSatisfiable { range: ByteRange, size: u64 },

    #[error("declared size {declared} did not match {actual} bytes consumed")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("transient backend error: {0}")]
    Transient(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<ObjectStoreError> for CoreError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound(_) => CoreError::NotFound,
            ObjectStoreError::RangeNotSatisfiable { range, size } => {
                CoreError::RangeNotSatisfiable { range, size }
            }
            ObjectStoreError::SizeMismatch { declared, actual } => CoreError::DataInconsistent {
                reason: format!("declared size {declared}, consumed {actual}"),
            },
            ObjectStoreError::Transient(msg) => CoreError::Transient(msg),
            ObjectStoreError::Cancelled => CoreError::Cancelled,
        }
    }
}

/// Uniform byte-blob store. `size` in `put` MUST equal the bytes consumed
/// from `reader`; short or long reads are [`ObjectStoreError::SizeMismatch`].
/// `get`'s returned size is always the full object size regardless of
/// `range`; the returned body yields only the requested slice.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        size: u64,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        cancel: CancellationToken,
    ) -> Result<(), ObjectStoreError>;

    async fn get(
        &self,
        key: &str,
        range: Option<ByteRange>,
        cancel: CancellationToken,
    ) -> Result<ObjectBody, ObjectStoreError>;

    async fn delete(&self, key: &str, cancel: CancellationToken) -> Result<(), ObjectStoreError>;

    async fn exists(&self, key: &str, cancel: CancellationToken) -> Result<bool, ObjectStoreError> {
        match self.get(key, Some(ByteRange::new(0, 0)), cancel).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound(_)) => Ok(false),
            Err(ObjectStoreError::RangeNotSatisfiable { .. }) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Lazily enumerate keys under `prefix`. Backends that cannot stream
    /// cheaply (S3) page internally; callers should not assume ordering.
    async fn list_prefix(
        &self,
        prefix: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<String>, ObjectStoreError>;

    async fn health_check(&self, cancel: CancellationToken) -> Result<(), ObjectStoreError>;
}

/// Computes the effective `(content_length, end, is_partial)` triple for a
/// requested range against an object of the given size, per `spec.md` §4.8
/// step 4. `range.end` of `u64::MAX` is treated as "open-ended" (`end ←
/// size - 1`).
pub fn resolve_range(range: Option<ByteRange>, size: u64) -> Result<(u64, u64, bool), ObjectStoreError> {
    match range {
        None => Ok((size, size.saturating_sub(1), false)),
        Some(r) if r.end == u64::MAX => {
            if r.start >= size {
                return Err(ObjectStoreError::RangeNotSatisfiable { range: r, size });
            }
            let end = size - 1;
            Ok((size - r.start, end, size - r.start != size))
        }
        Some(r) => {
            if !r.fits(size) {
                return Err(ObjectStoreError::RangeNotSatisfiable { range: r, size });
            }
            let content_length = r.len();
            Ok((content_length, r.end, content_length != size))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_read_is_not_partial() {
        let (len, end, partial) = resolve_range(None, 100).unwrap();
        assert_eq!(len, 100);
        assert_eq!(end, 99);
        assert!(!partial);
    }

    #[test]
    fn open_ended_range_resolves_to_size_minus_one() {
        let (len, end, partial) = resolve_range(Some(ByteRange::new(10, u64::MAX)), 100).unwrap();
        assert_eq!(end, 99);
        assert_eq!(len, 90);
        assert!(partial);
    }

    #[test]
    fn closed_range_is_partial_when_shorter_than_size() {
        let (len, end, partial) = resolve_range(Some(ByteRange::new(0, 1)), 256).unwrap();
        assert_eq!(len, 2);
        assert_eq!(end, 1);
        assert!(partial);
    }

    #[test]
    fn out_of_bounds_range_is_rejected() {
        let err = resolve_range(Some(ByteRange::new(0, 257)), 256).unwrap_err();
        assert!(matches!(err, ObjectStoreError::RangeNotSatisfiable { .. }));
    }

    #[test]
    fn start_at_size_is_rejected() {
        let err = resolve_range(Some(ByteRange::new(256, u64::MAX)), 256).unwrap_err();
        assert!(matches!(err, ObjectStoreError::RangeNotSatisfiable { .. }));
    }
}
