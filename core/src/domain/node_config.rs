// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Node configuration types.
//!
//! Defines the configuration schema for a storage node, including:
//! - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
//! - Node identity (signer key material)
//! - Storage backend selection (local / embedded KV / S3-compatible)
//! - Index service and egress tracker endpoints
//! - Observability settings
//!
//! The core crate never reads this from disk or from the environment —
//! that belongs to the `cli` crate's loader. `storage-node-core` only ever
//! sees a fully parsed, validated [`NodeConfigManifest`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level Kubernetes-style node configuration manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ManifestMetadata,
    pub spec: NodeConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    pub node: NodeIdentity,
    pub storage: StorageBackendConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// `did:key:z...` derived from the signer below; recomputed at load
    /// time and compared against this field if both are present.
    pub id: String,
    /// Path to the Ed25519 signing key (32 raw bytes). Supports
    /// `env:VAR_NAME` to read the key material from an environment
    /// variable instead of a file, for container deployments.
    pub signer_key: String,
    /// Public base URL this node advertises for pre-signed uploads and
    /// retrieval links.
    pub public_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StorageBackendConfig {
    /// Sharded local filesystem backend.
    Local {
        base_path: String,
        #[serde(default = "default_shard_strategy")]
        shard_strategy: String,
    },
    /// `sled`-backed embedded key-value store.
    EmbeddedKv { path: String },
    /// S3-compatible backend (MinIO or AWS).
    S3 {
        bucket: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        region: String,
        #[serde(default)]
        verify_on_put: bool,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    /// Index/advertising service base URL; `None` disables advertising.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_service_url: Option<String>,
    /// Egress tracker service base URL; `None` disables the tracker worker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker_url: Option<String>,
    /// Delegation proof (base64 DAG-CBOR) granting this node access to the
    /// services above. Opaque to the core; passed through as bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker_proof: Option<String>,
    /// Maximum egress batch size, in bytes, before forced rotation.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Upload URL TTL, seconds.
    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_seconds: u64,
    /// Egress rotation tick interval, milliseconds.
    #[serde(default = "default_rotation_tick")]
    pub rotation_tick_millis: u64,
    /// Concurrent egress tracker workers.
    #[serde(default = "default_tracker_workers")]
    pub tracker_workers: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            presign_ttl_seconds: default_presign_ttl(),
            rotation_tick_millis: default_rotation_tick(),
            tracker_workers: default_tracker_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    /// Whether `POST /admin/shutdown` is reachable at all. Nodes fronted by
    /// an orchestrator that drives shutdown some other way can turn this
    /// off; the route still exists but answers 404.
    #[serde(default = "default_true")]
    pub admin_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}
fn default_shard_strategy() -> String {
    "prefix2".to_string()
}
fn default_max_batch_size() -> u64 {
    4 * 1024 * 1024
}
fn default_presign_ttl() -> u64 {
    900
}
fn default_rotation_tick() -> u64 {
    30_000
}
fn default_tracker_workers() -> u32 {
    4
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_api_port() -> u16 {
    8080
}

impl NodeConfigManifest {
    pub const API_VERSION: &'static str = "storage-node.dev/v1";
    pub const KIND: &'static str = "NodeConfig";

    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Validate apiVersion/kind and storage backend requirements. Called by
    /// the loader before a daemon is built from this manifest.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_version != Self::API_VERSION {
            return Err(format!(
                "invalid apiVersion: '{}'; expected '{}'",
                self.api_version,
                Self::API_VERSION
            ));
        }
        if self.kind != Self::KIND {
            return Err(format!("invalid kind: '{}'; expected '{}'", self.kind, Self::KIND));
        }
        if self.metadata.name.trim().is_empty() {
            return Err("metadata.name must not be empty".to_string());
        }
        match &self.spec.storage {
            StorageBackendConfig::Local { base_path, .. } if base_path.trim().is_empty() => {
                Err("storage.base_path must not be empty".to_string())
            }
            StorageBackendConfig::EmbeddedKv { path } if path.trim().is_empty() => {
                Err("storage.path must not be empty".to_string())
            }
            StorageBackendConfig::S3 { bucket, region, .. }
                if bucket.trim().is_empty() || region.trim().is_empty() =>
            {
                Err("storage.bucket and storage.region must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml(api_version: &str) -> String {
        format!(
            r#"
apiVersion: {api_version}
kind: NodeConfig
metadata:
  name: test-node
spec:
  node:
    id: "did:key:zExample"
    signer_key: "env:NODE_SIGNER_KEY"
    public_url: "https://node.example"
  storage:
    type: local
    base_path: "/var/lib/storage-node/blobs"
"#
        )
    }

    #[test]
    fn valid_manifest_passes_validation() {
        let manifest = NodeConfigManifest::from_yaml_str(&sample_yaml("storage-node.dev/v1")).unwrap();
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn wrong_api_version_is_rejected() {
        let manifest = NodeConfigManifest::from_yaml_str(&sample_yaml("storage-node.dev/v2")).unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn default_max_batch_size_is_four_mib() {
        let manifest = NodeConfigManifest::from_yaml_str(&sample_yaml("storage-node.dev/v1")).unwrap();
        assert_eq!(manifest.spec.collaborators.max_batch_size, 4 * 1024 * 1024);
    }
}
