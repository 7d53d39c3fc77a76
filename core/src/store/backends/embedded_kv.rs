// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Embedded key-value object store backend, backed by `sled`.
//!
//! Stores the whole value under its logical key; range reads slice the
//! buffer sled returns rather than reading from a stream. `sled` already
//! serializes writes internally, so this backend needs no op map of its
//! own — concurrent `put`s for the same key are last-writer-wins, as
//! `spec.md` §5 allows for this backend family.

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::domain::capability::ByteRange;
use crate::store::object_store::{resolve_range, ObjectBody, ObjectStore, ObjectStoreError};

pub struct EmbeddedKvObjectStore {
    db: sled::Db,
}

impl EmbeddedKvObjectStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, ObjectStoreError> {
        let db = sled::open(path).map_err(|e| ObjectStoreError::Transient(e.to_string()))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl ObjectStore for EmbeddedKvObjectStore {
    async fn put(
        &self,
        key: &str,
        size: u64,
        mut reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
        cancel: CancellationToken,
    ) -> Result<(), ObjectStoreError> {
        let mut buf = Vec::with_capacity(size as usize);
        let consumed = tokio::select! {
            result = reader.read_to_end(&mut buf) => {
                result.map_err(|e| ObjectStoreError::Transient(e.to_string()))? as u64
            }
            _ = cancel.cancelled() => return Err(ObjectStoreError::Cancelled),
        };
        if consumed != size {
            return Err(ObjectStoreError::SizeMismatch {
                declared: size,
                actual: consumed,
            });
        }
        // sled only makes the key visible to readers once `insert` returns,
        // so a cancelled or failed read above never leaves a visible entry.
        self.db
            .insert(key, buf)
            .map_err(|e| ObjectStoreError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
        range: Option<ByteRange>,
        _cancel: CancellationToken,
    ) -> Result<ObjectBody, ObjectStoreError> {
        let value = self
            .db
            .get(key)
            .map_err(|e| ObjectStoreError::Transient(e.to_string()))?
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;
        let size = value.len() as u64;
        let (content_length, _end, _partial) = resolve_range(range, size)?;
        let start = range.map(|r| r.start).unwrap_or(0) as usize;
        let slice = value[start..start + content_length as usize].to_vec();
        Ok(ObjectBody {
            size,
            reader: Box::new(std::io::Cursor::new(slice)),
        })
    }

    async fn delete(&self, key: &str, _cancel: CancellationToken) -> Result<(), ObjectStoreError> {
        let removed = self
            .db
            .remove(key)
            .map_err(|e| ObjectStoreError::Transient(e.to_string()))?;
        if removed.is_none() {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn list_prefix(
        &self,
        prefix: &str,
        _cancel: CancellationToken,
    ) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (key, _) = item.map_err(|e| ObjectStoreError::Transient(e.to_string()))?;
            keys.push(String::from_utf8_lossy(&key).to_string());
        }
        Ok(keys)
    }

    async fn health_check(&self, _cancel: CancellationToken) -> Result<(), ObjectStoreError> {
        self.db.size_on_disk().map_err(|e| ObjectStoreError::Transient(e.to_string()))?;
        Ok(())
    }
}
