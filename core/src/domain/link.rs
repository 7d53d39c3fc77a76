// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Content identifiers: the CID wrapper used anywhere a piece needs to be
//! named on the wire or in a CAR file, as opposed to [`crate::domain::digest::Digest`]
//! which is the raw hash used for storage-key derivation and verification.

use std::fmt;
use std::str::FromStr;

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::digest::Digest;

/// Raw binary multicodec, used for pieces since the node stores opaque
/// blobs rather than structured IPLD nodes.
const RAW_CODEC: u64 = 0x55;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to parse CID: {0}")]
    Parse(#[from] cid::Error),
    #[error(transparent)]
    Digest(#[from] crate::domain::digest::DigestError),
}

/// A CIDv1, raw-codec link over a [`Digest`]. Two pieces with the same bytes
/// always produce the same `Link`, which is what makes storage keys and
/// dedup possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link(Cid);

impl Link {
    pub fn from_digest(digest: &Digest) -> Self {
        let mh = Code::Sha2_256.digest(digest.raw_bytes());
        Link(Cid::new_v1(RAW_CODEC, mh))
    }

    pub fn digest(&self) -> Result<Digest, LinkError> {
        Ok(Digest::from_multihash_bytes(&self.0.hash().to_bytes())?)
    }

    pub fn cid(&self) -> &Cid {
        &self.0
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Link {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Link(Cid::from_str(s)?))
    }
}

impl Serialize for Link {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_digest_same_link() {
        let d = Digest::of(b"content");
        assert_eq!(Link::from_digest(&d), Link::from_digest(&d));
    }

    #[test]
    fn link_round_trips_through_display() {
        let d = Digest::of(b"content");
        let link = Link::from_digest(&d);
        let parsed: Link = link.to_string().parse().unwrap();
        assert_eq!(link, parsed);
    }

    #[test]
    fn link_recovers_original_digest() {
        let d = Digest::of(b"content");
        let link = Link::from_digest(&d);
        assert_eq!(link.digest().unwrap(), d);
    }
}
