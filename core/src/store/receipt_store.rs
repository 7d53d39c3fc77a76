// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Receipt store: primary store keyed by `base32(root)`, encoded as a
//! single-root CAR; secondary index `ran → root`. `spec.md` §4.7.
//!
//! Ordering is primary-write-then-index-write. `get_by_ran` tolerates the
//! crash window between the two writes by treating "index present, primary
//! missing" as not-found rather than as corruption — receipts are
//! content-addressed and idempotent, so the caller's retry reproduces the
//! same primary record.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::CoreError;
use crate::domain::receipt::Receipt;
use crate::egress::car::{self, CarBlock};
use crate::store::object_store::{ObjectStore, ObjectStoreError};

#[derive(Debug, thiserror::Error)]
pub enum ReceiptStoreError {
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
    #[error("receipt encode/decode failed: {0}")]
    Codec(String),
}

impl From<ReceiptStoreError> for CoreError {
    fn from(err: ReceiptStoreError) -> Self {
        match err {
            ReceiptStoreError::Store(e) => e.into(),
            ReceiptStoreError::Codec(reason) => CoreError::DataInconsistent { reason },
        }
    }
}

pub struct ReceiptStore {
    backend: Arc<dyn ObjectStore>,
}

impl ReceiptStore {
    pub fn new(backend: Arc<dyn ObjectStore>) -> Self {
        Self { backend }
    }

    fn primary_key(root_base32: &str) -> String {
        format!("receipts/{root_base32}")
    }

    fn index_key(ran_base32: &str) -> String {
        format!("receipts/by-ran/{ran_base32}")
    }

    pub async fn put(&self, receipt: &Receipt, cancel: CancellationToken) -> Result<(), ReceiptStoreError> {
        let payload = serde_json::to_vec(receipt).map_err(|e| ReceiptStoreError::Codec(e.to_string()))?;
        let car_bytes = car::encode(
            &[*receipt.root.cid()],
            &[CarBlock {
                cid: *receipt.root.cid(),
                bytes: payload,
            }],
        )
        .map_err(|e| ReceiptStoreError::Codec(e.to_string()))?;

        let root_b32 = base32::encode(
            base32::Alphabet::Rfc4648Lower { padding: false },
            &receipt.root.cid().hash().to_bytes(),
        );
        let ran_b32 = base32::encode(
            base32::Alphabet::Rfc4648Lower { padding: false },
            &receipt.ran.cid().hash().to_bytes(),
        );

        let size = car_bytes.len() as u64;
        self.backend
            .put(
                &Self::primary_key(&root_b32),
                size,
                Box::new(std::io::Cursor::new(car_bytes)),
                cancel.clone(),
            )
            .await?;

        let index_payload = root_b32.clone().into_bytes();
        let index_size = index_payload.len() as u64;
        self.backend
            .put(
                &Self::index_key(&ran_b32),
                index_size,
                Box::new(std::io::Cursor::new(index_payload)),
                cancel,
            )
            .await?;

        Ok(())
    }

    pub async fn get(&self, root_base32: &str, cancel: CancellationToken) -> Result<Receipt, ReceiptStoreError> {
        self.read_primary(root_base32, cancel).await
    }

    pub async fn get_by_ran(&self, ran_base32: &str, cancel: CancellationToken) -> Result<Receipt, ReceiptStoreError> {
        let mut body = self
            .backend
            .get(&Self::index_key(ran_base32), None, cancel.clone())
            .await?;
        let mut buf = Vec::with_capacity(body.size as usize);
        body.reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| ReceiptStoreError::Store(ObjectStoreError::Transient(e.to_string())))?;
        let root_b32 = String::from_utf8(buf).map_err(|e| ReceiptStoreError::Codec(e.to_string()))?;

        match self.read_primary(&root_b32, cancel).await {
            Ok(receipt) => Ok(receipt),
            Err(ReceiptStoreError::Store(ObjectStoreError::NotFound(_))) => {
                Err(ReceiptStoreError::Store(ObjectStoreError::NotFound(root_b32)))
            }
            other => other,
        }
    }

    async fn read_primary(&self, root_base32: &str, cancel: CancellationToken) -> Result<Receipt, ReceiptStoreError> {
        let mut body = self.backend.get(&Self::primary_key(root_base32), None, cancel).await?;
        let mut buf = Vec::with_capacity(body.size as usize);
        body.reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| ReceiptStoreError::Store(ObjectStoreError::Transient(e.to_string())))?;
        let (_, blocks) = car::decode(&buf).map_err(|e| ReceiptStoreError::Codec(e.to_string()))?;
        let block = blocks.first().ok_or_else(|| ReceiptStoreError::Codec("empty receipt CAR".into()))?;
        serde_json::from_slice(&block.bytes).map_err(|e| ReceiptStoreError::Codec(e.to_string()))
    }
}
