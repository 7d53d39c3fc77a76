// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Capability tokens: the signed invocations that gate every allocate,
//! accept, and retrieve operation.
//!
//! A [`Did`] names a principal by its Ed25519 public key. A [`Capability`]
//! grants one [`Ability`] over one [`Resource`] to one audience, optionally
//! through a chain of [`Delegation`]s from the resource owner down to the
//! invoking agent. An [`Invocation`] is a capability plus the caller's
//! signature over a specific argument set, which is what actually arrives on
//! the wire.

use std::fmt;

use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};

/// An inclusive byte range, `start..=end`, as carried in retrieval
/// invocations and `Range` header parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// `true` if this range fits within an object of the given total size.
    pub fn fits(&self, size: u64) -> bool {
        !self.is_empty() && self.end < size
    }
}

/// A principal identity: the raw Ed25519 verifying key, rendered as
/// `did:key:z...` wherever it needs to travel as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Did(pub VerifyingKey);

impl Did {
    pub fn to_key_string(&self) -> String {
        format!("did:key:z{}", base32::encode(base32::Alphabet::Rfc4648 { padding: false }, self.0.as_bytes()))
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_key_string())
    }
}

impl Serialize for Did {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_key_string())
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let encoded = s.strip_prefix("did:key:z").ok_or_else(|| {
            serde::de::Error::custom(format!("not a did:key: {s}"))
        })?;
        let bytes = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, encoded)
            .ok_or_else(|| serde::de::Error::custom("invalid base32 in did:key"))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("did:key is not 32 bytes"))?;
        let key = VerifyingKey::from_bytes(&arr).map_err(serde::de::Error::custom)?;
        Ok(Did(key))
    }
}

/// The set of abilities this node recognizes. Each maps one-to-one onto an
/// HTTP-visible operation; there is no wildcard ability, matching the
/// resource-scoped authorization model rather than a tool-pattern one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ability {
    /// Reserve space for an upcoming upload.
    Allocate,
    /// Finalize a previously allocated upload once bytes have landed.
    Accept,
    /// Read back a blob, in whole or by byte range.
    Retrieve,
}

/// The object this capability is scoped to: either the whole node/space, or
/// one piece identified by its digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Resource {
    /// The space (storage allocation) itself, identified by its owning DID.
    /// Used by `space/content/retrieve`, where the digest travels as a URL
    /// path parameter rather than inside the signed resource.
    Space { space: Did },
    /// A specific piece, addressed by its hex-encoded SHA2-256 digest,
    /// scoped to a Space. Used by `allocate`/`accept`, and by
    /// `space/content/retrieve` when the caveat set names a digest.
    Piece { space: Did, piece: String },
    /// The node's own identity. Used by `blob/retrieve`: no Space check,
    /// only Blob Object presence is required; a resource that doesn't
    /// equal the node's own DID yields `InvalidResource`.
    Node { node: Did },
}

impl Resource {
    /// The Space this resource is scoped to, where applicable. `None` for
    /// `Resource::Node`, which is not Space-scoped at all.
    pub fn space(&self) -> Option<&Did> {
        match self {
            Resource::Space { space } => Some(space),
            Resource::Piece { space, .. } => Some(space),
            Resource::Node { .. } => None,
        }
    }
}

/// One link in a delegation chain: `issuer` grants `ability` over `resource`
/// to `audience`, signed by `issuer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegation {
    pub issuer: Did,
    pub audience: Did,
    pub ability: Ability,
    pub resource: Resource,
    /// Unix seconds after which this delegation is no longer valid.
    pub expires_at: i64,
    #[serde(with = "signature_as_bytes")]
    pub signature: Signature,
}

/// A capability invocation as received on the wire: the ability, its
/// resource, the caller's signature over the whole envelope, and any
/// delegation chain proving the caller's audience was granted this ability
/// by the resource's owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub issuer: Did,
    pub ability: Ability,
    pub resource: Resource,
    /// Delegation chain from `resource`'s owner down to `issuer`, outermost
    /// first. Empty when `issuer` is the resource owner invoking directly.
    pub proofs: Vec<Delegation>,
    /// Arguments specific to the ability, e.g. claimed size for `Allocate`,
    /// byte range for `Retrieve`.
    pub arguments: InvocationArguments,
    #[serde(with = "signature_as_bytes")]
    pub signature: Signature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "ability", rename_all = "kebab-case")]
pub enum InvocationArguments {
    Allocate { claimed_size: u64 },
    Accept { digest_hex: String },
    Retrieve { range: Option<ByteRange> },
}

mod signature_as_bytes {
    use ed25519_dalek::Signature;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(sig: &Signature, serializer: S) -> Result<S::Ok, S::Error> {
        sig.to_bytes().to_vec().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Signature, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("signature is not 64 bytes"))?;
        Ok(Signature::from_bytes(&arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_len_is_inclusive() {
        let range = ByteRange::new(0, 9);
        assert_eq!(range.len(), 10);
    }

    #[test]
    fn byte_range_fits_rejects_out_of_bounds() {
        let range = ByteRange::new(0, 99);
        assert!(!range.fits(50));
        assert!(range.fits(100));
    }

    #[test]
    fn did_key_string_round_trips() {
        use ed25519_dalek::SigningKey;
        let sk = SigningKey::from_bytes(&[7u8; 32]);
        let did = Did(sk.verifying_key());
        let encoded = serde_json::to_string(&did).unwrap();
        let decoded: Did = serde_json::from_str(&encoded).unwrap();
        assert_eq!(did, decoded);
        assert!(encoded.contains("did:key:z"));
    }
}
