// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Allocation records: "space S reserved `size` bytes for `digest` until
//! `expires`". Created by the `allocate` handler, never mutated, never
//! deleted by the core.

use serde::{Deserialize, Serialize};

use crate::domain::capability::Did;
use crate::domain::digest::Digest;
use crate::domain::link::Link;

/// The digest/size pair every Allocation and Acceptance carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub digest: Digest,
    pub size: u64,
}

/// `space` has reserved `blob.size` bytes for `blob.digest` until `expires`,
/// authorized by the invocation named by `cause`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub space: Did,
    pub blob: BlobRef,
    /// Unix seconds. Advisory only — the core does not enforce this on
    /// `accept` or `retrieve`; a policy layer may choose to.
    pub expires: i64,
    pub cause: Link,
}

impl Allocation {
    pub fn is_expired(&self, now_unix: i64) -> bool {
        now_unix >= self.expires
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn test_did() -> Did {
        Did(SigningKey::from_bytes(&[1u8; 32]).verifying_key())
    }

    #[test]
    fn expiry_is_advisory_and_computed_correctly() {
        let digest = Digest::of(b"blob");
        let alloc = Allocation {
            space: test_did(),
            blob: BlobRef { digest, size: 10 },
            expires: 1000,
            cause: Link::from_digest(&Digest::of(b"invocation")),
        };
        assert!(!alloc.is_expired(999));
        assert!(alloc.is_expired(1000));
        assert!(alloc.is_expired(1001));
    }
}
