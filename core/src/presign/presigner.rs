// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Pre-signed upload URLs: a short-lived URL plus required headers that
//! lets a client PUT bytes directly to the object store, bypassing the
//! handler's own body path. `spec.md` §4.5.
//!
//! Implementations that cannot presign (e.g. the embedded-KV backend) may
//! return `None` from [`Presigner::presign`], signalling to the `allocate`
//! handler that the upload step is skippable entirely (the caller learns
//! this from an empty URL set in the receipt, per `spec.md` §4.9).

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::digest::Digest;
use crate::domain::errors::CoreError;

#[derive(Debug, Clone)]
pub struct PresignedUpload {
    pub url: String,
    pub method: &'static str,
    /// Headers the client's PUT request must carry exactly, e.g.
    /// `Content-Length` and a checksum header, so the backend rejects a
    /// mismatched body rather than accepting it silently.
    pub required_headers: Vec<(String, String)>,
    pub expires_in: Duration,
}

#[async_trait]
pub trait Presigner: Send + Sync {
    async fn presign(
        &self,
        digest: &Digest,
        size: u64,
        ttl: Duration,
    ) -> Result<Option<PresignedUpload>, CoreError>;
}

/// Backends with no native pre-signing support (embedded KV) use this —
/// `allocate` falls back to accepting bytes through the handler body path.
pub struct NullPresigner;

#[async_trait]
impl Presigner for NullPresigner {
    async fn presign(
        &self,
        _digest: &Digest,
        _size: u64,
        _ttl: Duration,
    ) -> Result<Option<PresignedUpload>, CoreError> {
        Ok(None)
    }
}

/// Filesystem-backend presigner: the node's own HTTP surface exposes a
/// direct-PUT endpoint keyed by digest, since there is no third-party
/// object store to delegate the upload to.
pub struct LocalPresigner {
    base_url: String,
    encoder: crate::codec::key_encoding::KeyEncoder,
}

impl LocalPresigner {
    pub fn new(base_url: impl Into<String>, encoder: crate::codec::key_encoding::KeyEncoder) -> Self {
        Self {
            base_url: base_url.into(),
            encoder,
        }
    }
}

#[async_trait]
impl Presigner for LocalPresigner {
    async fn presign(
        &self,
        digest: &Digest,
        size: u64,
        ttl: Duration,
    ) -> Result<Option<PresignedUpload>, CoreError> {
        let key = self.encoder.encode(digest);
        Ok(Some(PresignedUpload {
            url: format!("{}/upload/{key}", self.base_url.trim_end_matches('/')),
            method: "PUT",
            required_headers: vec![
                ("Content-Length".to_string(), size.to_string()),
                ("X-Content-SHA256".to_string(), digest.to_hex()),
            ],
            expires_in: ttl,
        }))
    }
}

/// S3-backend presigner: delegates to the AWS SDK's presigning config,
/// binding bucket/key, exact `Content-Length`, and a SHA-256 checksum so
/// the backend rejects a mismatched body.
pub struct S3Presigner {
    client: aws_sdk_s3::Client,
    bucket: String,
    encoder: crate::codec::key_encoding::KeyEncoder,
}

impl S3Presigner {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, encoder: crate::codec::key_encoding::KeyEncoder) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            encoder,
        }
    }
}

#[async_trait]
impl Presigner for S3Presigner {
    async fn presign(
        &self,
        digest: &Digest,
        size: u64,
        ttl: Duration,
    ) -> Result<Option<PresignedUpload>, CoreError> {
        use base64::Engine;
        use sha2::Digest as _;

        let key = format!("blobs/{}", self.encoder.encode(digest));
        let checksum = base64::engine::general_purpose::STANDARD.encode(digest.raw_bytes());

        let presign_config = aws_sdk_s3::presigning::PresigningConfig::expires_in(ttl)
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_length(size as i64)
            .checksum_sha256(&checksum)
            .presigned(presign_config)
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        Ok(Some(PresignedUpload {
            url: presigned.uri().to_string(),
            method: "PUT",
            required_headers: vec![
                ("Content-Length".to_string(), size.to_string()),
                ("x-amz-checksum-sha256".to_string(), checksum),
            ],
            expires_in: ttl,
        }))
    }
}
