// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Builds the configured [`ObjectStore`] backend and matching
//! [`Presigner`]/[`KeyEncoder`] from a [`StorageBackendConfig`], so the
//! `cli` crate never has to know about `sled` or the AWS SDK directly.

use std::sync::Arc;

use crate::codec::key_encoding::KeyEncoder;
use crate::domain::node_config::StorageBackendConfig;
use crate::presign::presigner::{LocalPresigner, NullPresigner, Presigner, S3Presigner};
use crate::store::backends::embedded_kv::EmbeddedKvObjectStore;
use crate::store::backends::filesystem::{FilesystemObjectStore, ShardStrategy};
use crate::store::backends::s3::S3ObjectStore;
use crate::store::object_store::{ObjectStore, ObjectStoreError};

/// Everything the `cli` crate needs to wire a [`crate::capability_server::server::CapabilityServer`]
/// for the configured backend: the object store, the key encoding it
/// expects (`spec.md` §3 invariant 6 — fixed per backend type), and the
/// presigner that matches it.
pub struct Backend {
    pub store: Arc<dyn ObjectStore>,
    pub encoder: KeyEncoder,
    pub presigner: Arc<dyn Presigner>,
}

pub async fn build_backend(config: &StorageBackendConfig, public_url: &str) -> Result<Backend, ObjectStoreError> {
    match config {
        StorageBackendConfig::Local { base_path, shard_strategy } => {
            let shard = parse_shard_strategy(shard_strategy)?;
            let store = FilesystemObjectStore::open(base_path, shard).await?;
            Ok(Backend {
                store: Arc::new(store),
                encoder: KeyEncoder::Base32,
                presigner: Arc::new(LocalPresigner::new(public_url, KeyEncoder::Base32)),
            })
        }
        StorageBackendConfig::EmbeddedKv { path } => {
            let store = EmbeddedKvObjectStore::open(path)?;
            Ok(Backend {
                store: Arc::new(store),
                encoder: KeyEncoder::Plain,
                presigner: Arc::new(NullPresigner),
            })
        }
        StorageBackendConfig::S3 { bucket, endpoint, region, verify_on_put } => {
            let client = build_s3_client(endpoint.as_deref(), region).await;
            let store = S3ObjectStore::new(client.clone(), bucket.clone(), *verify_on_put);
            Ok(Backend {
                store: Arc::new(store),
                encoder: KeyEncoder::Base32,
                presigner: Arc::new(S3Presigner::new(client, bucket.clone(), KeyEncoder::Base32)),
            })
        }
    }
}

async fn build_s3_client(endpoint: Option<&str>, region: &str) -> aws_sdk_s3::Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(aws_sdk_s3::config::Region::new(region.to_string()));
    if let Some(endpoint) = endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;
    aws_sdk_s3::Client::new(&sdk_config)
}

fn parse_shard_strategy(raw: &str) -> Result<ShardStrategy, ObjectStoreError> {
    match raw {
        "prefix2" | "hash-prefix" | "hash-prefix-v1" => Ok(ShardStrategy::HashPrefix),
        other => Err(ObjectStoreError::Transient(format!("unknown shard strategy '{other}'"))),
    }
}
