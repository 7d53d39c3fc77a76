// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! DAG-CBOR codec for typed-store values.
//!
//! Allocation, Acceptance, and Consolidation records use a fixed IPLD shape
//! and are encoded with `serde_ipld_dagcbor` so the bytes are valid DAG-CBOR
//! blocks (deterministic map-key ordering, canonical integer encoding) —
//! important because these bytes are occasionally re-wrapped as IPLD blocks
//! inside receipts and CAR archives, not just stored opaquely.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("dag-cbor encode failed: {0}")]
    Encode(String),
    #[error("dag-cbor decode failed: {0}")]
    Decode(String),
}

/// A value codec paired with a key prefix, as required by the typed-store
/// layer (`spec.md` §4.2).
pub trait Codec<T> {
    fn encode(value: &T) -> Result<Vec<u8>, CodecError>;
    fn decode(bytes: &[u8]) -> Result<T, CodecError>;
}

/// The default codec for record types: DAG-CBOR via `serde_ipld_dagcbor`.
pub struct DagCborCodec<T>(PhantomData<T>);

impl<T> Codec<T> for DagCborCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(value: &T) -> Result<Vec<u8>, CodecError> {
        serde_ipld_dagcbor::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<T, CodecError> {
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::allocation::{Allocation, BlobRef};
    use crate::domain::capability::Did;
    use crate::domain::digest::Digest;
    use crate::domain::link::Link;
    use ed25519_dalek::SigningKey;

    #[test]
    fn allocation_round_trips_through_dag_cbor() {
        let did = Did(SigningKey::from_bytes(&[9u8; 32]).verifying_key());
        let alloc = Allocation {
            space: did,
            blob: BlobRef {
                digest: Digest::of(b"blob"),
                size: 42,
            },
            expires: 1_700_000_000,
            cause: Link::from_digest(&Digest::of(b"invocation")),
        };
        let bytes = DagCborCodec::<Allocation>::encode(&alloc).unwrap();
        let decoded = DagCborCodec::<Allocation>::decode(&bytes).unwrap();
        assert_eq!(alloc, decoded);
    }
}
