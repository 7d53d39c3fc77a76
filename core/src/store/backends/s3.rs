// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! S3-compatible (MinIO or AWS) object store backend.
//!
//! `Get` with a range always issues a HEAD first to obtain the full object
//! size — interleaving a separate size query with the range body avoids the
//! SDK silently handing back the whole object when size and range are
//! requested in one call, per `spec.md` §9. `Put` can optionally ask S3 to
//! verify the uploaded bytes' SHA-256 against the caller's computed digest
//! (`verify_on_put`); on mismatch the object is deleted rather than left
//! inconsistent.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::domain::capability::ByteRange;
use crate::store::object_store::{resolve_range, ObjectBody, ObjectStore, ObjectStoreError};

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    verify_on_put: bool,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>, verify_on_put: bool) -> Self {
        Self {
            client,
            bucket,
            verify_on_put,
        }
    }

    fn is_not_found(err: &aws_sdk_s3::error::SdkError<impl std::error::Error + 'static>) -> bool {
        err.to_string().contains("NoSuchKey") || err.to_string().contains("NotFound")
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
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

        let expected_sha256 = if self.verify_on_put {
            use base64::Engine;
            use sha2::Digest as _;
            let mut hasher = sha2::Sha256::new();
            hasher.update(&buf);
            Some(base64::engine::general_purpose::STANDARD.encode(hasher.finalize()))
        } else {
            None
        };

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(size as i64)
            .body(ByteStream::from(buf));

        if let Some(checksum) = &expected_sha256 {
            request = request
                .checksum_algorithm(aws_sdk_s3::types::ChecksumAlgorithm::Sha256)
                .checksum_sha256(checksum);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ObjectStoreError::Transient(e.to_string()));

        match (response, &expected_sha256) {
            (Err(e), _) => Err(e),
            (Ok(output), Some(expected)) => {
                let returned = output.checksum_sha256();
                if returned.map(|v| v != expected).unwrap_or(false) {
                    let _ = self
                        .client
                        .delete_object()
                        .bucket(&self.bucket)
                        .key(key)
                        .send()
                        .await;
                    return Err(ObjectStoreError::SizeMismatch {
                        declared: size,
                        actual: consumed,
                    });
                }
                Ok(())
            }
            (Ok(_), None) => Ok(()),
        }
    }

    async fn get(
        &self,
        key: &str,
        range: Option<ByteRange>,
        cancel: CancellationToken,
    ) -> Result<ObjectBody, ObjectStoreError> {
        let head = tokio::select! {
            result = self.client.head_object().bucket(&self.bucket).key(key).send() => result,
            _ = cancel.cancelled() => return Err(ObjectStoreError::Cancelled),
        };
        let head = head.map_err(|e| {
            if Self::is_not_found(&e) {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                ObjectStoreError::Transient(e.to_string())
            }
        })?;
        let size = head.content_length().unwrap_or(0) as u64;

        let (content_length, end, _partial) = resolve_range(range, size)?;
        let start = range.map(|r| r.start).unwrap_or(0);

        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if range.is_some() {
            request = request.range(format!("bytes={start}-{end}"));
        }

        let response = tokio::select! {
            result = request.send() => result,
            _ = cancel.cancelled() => return Err(ObjectStoreError::Cancelled),
        };
        let response = response.map_err(|e| {
            if Self::is_not_found(&e) {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                ObjectStoreError::Transient(e.to_string())
            }
        })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Transient(e.to_string()))?
            .into_bytes();

        let _ = content_length;
        Ok(ObjectBody {
            size,
            reader: Box::new(std::io::Cursor::new(bytes.to_vec())),
        })
    }

    async fn delete(&self, key: &str, cancel: CancellationToken) -> Result<(), ObjectStoreError> {
        tokio::select! {
            result = self.client.delete_object().bucket(&self.bucket).key(key).send() => {
                result.map(|_| ()).map_err(|e| ObjectStoreError::Transient(e.to_string()))
            }
            _ = cancel.cancelled() => Err(ObjectStoreError::Cancelled),
        }
    }

    async fn list_prefix(
        &self,
        prefix: &str,
        _cancel: CancellationToken,
    ) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|e| ObjectStoreError::Transient(e.to_string()))?;
            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
            if response.is_truncated().unwrap_or(false) {
                continuation = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }
        Ok(keys)
    }

    async fn health_check(&self, _cancel: CancellationToken) -> Result<(), ObjectStoreError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ObjectStoreError::Transient(e.to_string()))
    }
}
