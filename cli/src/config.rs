// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration loading: reads a [`NodeConfigManifest`] from disk and
//! resolves its signer key into an [`ed25519_dalek::SigningKey`].
//!
//! `storage-node-core` never touches the filesystem or the environment for
//! its own configuration — that boundary lives here, one layer up.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ed25519_dalek::SigningKey;
use storage_node_core::domain::capability::Did;
use storage_node_core::domain::node_config::NodeConfigManifest;

/// Resolves the default manifest path: `$STORAGE_NODE_CONFIG`, falling back
/// to `~/.config/storage-node/node.yaml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("STORAGE_NODE_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("storage-node")
        .join("node.yaml")
}

pub fn load_manifest(path: &Path) -> Result<NodeConfigManifest> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read config file at {}", path.display()))?;
    let manifest = NodeConfigManifest::from_yaml_str(&raw).with_context(|| format!("failed to parse config file at {}", path.display()))?;
    manifest.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(manifest)
}

/// Resolves `node.signer_key` into a signing key and the `Did` it derives.
/// Accepts a file path or an `env:VAR_NAME` reference; the material itself
/// may be 32 raw bytes or a 64-character hex string (optionally
/// newline-terminated, to survive being written by a text editor).
pub fn resolve_signing_key(signer_key: &str) -> Result<(SigningKey, Did)> {
    let raw = if let Some(var) = signer_key.strip_prefix("env:") {
        std::env::var(var).with_context(|| format!("environment variable '{var}' is not set"))?.into_bytes()
    } else {
        std::fs::read(signer_key).with_context(|| format!("failed to read signer key file at {signer_key}"))?
    };

    let bytes = decode_key_material(&raw)?;
    let signing_key = SigningKey::from_bytes(&bytes);
    let did = Did(signing_key.verifying_key());
    Ok((signing_key, did))
}

fn decode_key_material(raw: &[u8]) -> Result<[u8; 32]> {
    if raw.len() == 32 {
        let mut out = [0u8; 32];
        out.copy_from_slice(raw);
        return Ok(out);
    }

    let text = std::str::from_utf8(raw).context("signer key is neither 32 raw bytes nor valid UTF-8 hex")?;
    let trimmed = text.trim();
    if trimmed.len() != 64 {
        bail!("signer key must be 32 raw bytes or a 64-character hex string, got {} bytes of text", trimmed.len());
    }
    let decoded = hex::decode(trimmed).context("signer key hex is malformed")?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&decoded);
    Ok(out)
}

/// Renders a sample manifest for `storage-node config generate`.
pub fn sample_manifest_yaml() -> &'static str {
    r#"apiVersion: storage-node.dev/v1
kind: NodeConfig
metadata:
  name: example-node
spec:
  node:
    id: "did:key:zReplaceWithDerivedDid"
    signer_key: "env:STORAGE_NODE_SIGNER_KEY"
    public_url: "https://node.example.com"
    region: "us-east-1"
  storage:
    type: local
    base_path: "/var/lib/storage-node/blobs"
  collaborators:
    index_service_url: "https://index.example.com/advertise"
    tracker_url: "https://tracker.example.com/track"
    max_batch_size: 4194304
  runtime:
    presign_ttl_seconds: 900
    rotation_tick_millis: 30000
    tracker_workers: 4
  network:
    bind_address: "0.0.0.0"
    port: 8080
    admin_enabled: true
  observability:
    logging:
      level: "info"
      format: "text"
    metrics:
      enabled: true
      port: 9090
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_32_byte_raw_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.bin");
        std::fs::write(&path, [7u8; 32]).unwrap();
        let (_sk, did) = resolve_signing_key(path.to_str().unwrap()).unwrap();
        assert!(did.to_string().starts_with("did:key:z"));
    }

    #[test]
    fn resolves_hex_encoded_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.hex");
        std::fs::write(&path, hex::encode([9u8; 32])).unwrap();
        let (_sk, did) = resolve_signing_key(path.to_str().unwrap()).unwrap();
        assert!(did.to_string().starts_with("did:key:z"));
    }

    #[test]
    fn resolves_key_from_environment() {
        std::env::set_var("STORAGE_NODE_TEST_KEY", hex::encode([3u8; 32]));
        let (_sk, did) = resolve_signing_key("env:STORAGE_NODE_TEST_KEY").unwrap();
        assert!(did.to_string().starts_with("did:key:z"));
        std::env::remove_var("STORAGE_NODE_TEST_KEY");
    }

    #[test]
    fn sample_manifest_parses_and_validates() {
        let manifest = NodeConfigManifest::from_yaml_str(sample_manifest_yaml()).unwrap();
        assert!(manifest.validate().is_ok());
    }
}
