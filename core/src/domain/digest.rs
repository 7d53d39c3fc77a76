// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Self-describing content digests.
//!
//! `spec.md` §3: "a self-describing hash (algorithm code + raw digest);
//! blobs are required to be SHA2-256." We represent a digest as a
//! [`multihash_codetable::Multihash`], which already carries the algorithm
//! code alongside the raw bytes, and reject anything that isn't SHA2-256 at
//! construction time — rejection elsewhere is fatal per the spec, so we make
//! it impossible to construct a `Digest` of the wrong kind in the first
//! place.

use std::fmt;

use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// Multicodec size used by `multihash-codetable`'s SHA2-256 table entry.
const SHA2_256_DIGEST_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("unsupported hash algorithm code {0:#x}; only SHA2-256 is accepted")]
    UnsupportedAlgorithm(u64),
    #[error("malformed multihash bytes: {0}")]
    Malformed(String),
    #[error("expected {expected} raw digest bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

/// A content digest, required everywhere in this crate to be SHA2-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest {
    raw: [u8; SHA2_256_DIGEST_LEN],
}

impl Digest {
    /// Build a digest directly from 32 raw SHA2-256 bytes.
    pub fn from_raw_sha256(raw: [u8; SHA2_256_DIGEST_LEN]) -> Self {
        Self { raw }
    }

    /// Compute the digest of a byte slice.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let out = hasher.finalize();
        let mut raw = [0u8; SHA2_256_DIGEST_LEN];
        raw.copy_from_slice(&out);
        Self { raw }
    }

    /// Raw (non-self-describing) digest bytes.
    pub fn raw_bytes(&self) -> &[u8; SHA2_256_DIGEST_LEN] {
        &self.raw
    }

    /// Self-describing multihash encoding (algorithm code + raw bytes).
    pub fn to_multihash(&self) -> multihash_codetable::Multihash<64> {
        Code::Sha2_256.digest(&self.raw)
    }

    /// Parse a self-describing multihash, rejecting anything but SHA2-256.
    pub fn from_multihash_bytes(bytes: &[u8]) -> Result<Self, DigestError> {
        let mh = multihash_codetable::Multihash::<64>::from_bytes(bytes)
            .map_err(|e| DigestError::Malformed(e.to_string()))?;
        if mh.code() != u64::from(Code::Sha2_256) {
            return Err(DigestError::UnsupportedAlgorithm(mh.code()));
        }
        let digest = mh.digest();
        if digest.len() != SHA2_256_DIGEST_LEN {
            return Err(DigestError::WrongLength {
                expected: SHA2_256_DIGEST_LEN,
                actual: digest.len(),
            });
        }
        let mut raw = [0u8; SHA2_256_DIGEST_LEN];
        raw.copy_from_slice(digest);
        Ok(Self { raw })
    }

    /// Lowercase hex of the raw digest bytes, used in diagnostics only —
    /// on-wire and on-disk keys use [`crate::codec::key_encoding`] instead.
    pub fn to_hex(&self) -> String {
        hex::encode(self.raw)
    }

    /// Parse raw SHA2-256 hex, as carried in `piece` resource caveats and
    /// `accept`'s `digest_hex` argument.
    pub fn from_hex(s: &str) -> Result<Self, DigestError> {
        let bytes = hex::decode(s).map_err(|e| DigestError::Malformed(e.to_string()))?;
        let raw: [u8; SHA2_256_DIGEST_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| DigestError::WrongLength {
                expected: SHA2_256_DIGEST_LEN,
                actual: b.len(),
            })?;
        Ok(Self { raw })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha2-256:{}", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_bytes_as_b64::serialize(&self.to_multihash().to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = serde_bytes_as_b64::deserialize(deserializer)?;
        Digest::from_multihash_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Digests serialize as base64 multihash bytes in JSON receipt bodies
/// (`blocks`/IPLD encodings use raw multihash bytes directly, not this path).
mod serde_bytes_as_b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_multihash_bytes() {
        let digest = Digest::of(b"hello world");
        let mh = digest.to_multihash();
        let parsed = Digest::from_multihash_bytes(&mh.to_bytes()).unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn rejects_non_sha256_code() {
        let mh = Code::Blake3_256.digest(b"hello world");
        let err = Digest::from_multihash_bytes(&mh.to_bytes()).unwrap_err();
        assert!(matches!(err, DigestError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn display_is_stable() {
        let digest = Digest::of(b"x");
        assert!(digest.to_string().starts_with("sha2-256:"));
    }

    #[test]
    fn from_hex_round_trips_with_to_hex() {
        let digest = Digest::of(b"piece bytes");
        let parsed = Digest::from_hex(&digest.to_hex()).unwrap();
        assert_eq!(digest, parsed);
    }
}
