// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Canonical hash-of-content key encoding.
//!
//! The encoder is a property of the *store instance*, not of the value
//! being stored: S3 and filesystem backends use Base32 (case-insensitive,
//! filesystem- and URL-safe); the embedded KV backend uses the digest's
//! plain textual form directly since it has no path-length or case
//! restrictions to work around.

use crate::domain::digest::Digest;

/// Which textual form a store encodes digests as, fixed for the lifetime
/// of a store instance (`spec.md` §3 invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoder {
    /// RFC 4648 Base32, no padding, lowercase — safe for filesystem paths
    /// and S3 object keys.
    Base32,
    /// The digest's `Display` form (`sha2-256:<hex>`), used as-is.
    Plain,
}

impl KeyEncoder {
    pub fn encode(&self, digest: &Digest) -> String {
        match self {
            KeyEncoder::Base32 => base32::encode(
                base32::Alphabet::Rfc4648Lower { padding: false },
                digest.raw_bytes(),
            ),
            KeyEncoder::Plain => digest.to_string(),
        }
    }
}

/// Key layout for the allocation/acceptance stores: `{encoded_digest}/{space}`.
pub fn scoped_key(encoder: KeyEncoder, digest: &Digest, space: impl std::fmt::Display) -> String {
    format!("{}/{}", encoder.encode(digest), space)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base32_encoding_is_stable_across_calls() {
        let digest = Digest::of(b"content");
        assert_eq!(KeyEncoder::Base32.encode(&digest), KeyEncoder::Base32.encode(&digest));
    }

    #[test]
    fn base32_is_lowercase_and_unpadded() {
        let digest = Digest::of(b"content");
        let key = KeyEncoder::Base32.encode(&digest);
        assert!(!key.contains('='));
        assert_eq!(key, key.to_lowercase());
    }

    #[test]
    fn plain_encoding_round_trips_display() {
        let digest = Digest::of(b"content");
        assert_eq!(KeyEncoder::Plain.encode(&digest), digest.to_string());
    }

    #[test]
    fn scoped_key_layout_is_digest_slash_space() {
        let digest = Digest::of(b"content");
        let key = scoped_key(KeyEncoder::Base32, &digest, "did:key:zSpace");
        assert!(key.ends_with("/did:key:zSpace"));
    }
}
