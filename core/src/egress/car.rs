// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Minimal CAR v1 (Content-Addressable aRchive) reader/writer.
//!
//! No ready-made CAR crate is part of this workspace's dependency stack, so
//! the format is implemented directly against the primitives already
//! pulled in for content addressing: `unsigned-varint` for the
//! length-prefixed block framing, `cid` for header roots and block keys,
//! `serde_ipld_dagcbor` for the DAG-CBOR header section.
//!
//! Layout: a varint-length-prefixed DAG-CBOR header (`{version: 1, roots:
//! [CID, ...]}`), followed by zero or more varint-length-prefixed blocks,
//! each block being `cid_bytes || content_bytes` with the varint giving the
//! combined length.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Multicodec for CAR files themselves, used when computing the CID of a
/// rotated batch's raw bytes (`spec.md` §3/§4.10: `CID(multicodec=CAR,
/// sha256(batchBytes))`).
pub const CAR_MULTICODEC: u64 = 0x02_02;

#[derive(Debug, Error)]
pub enum CarError {
    #[error("truncated CAR stream")]
    Truncated,
    #[error("invalid varint length prefix: {0}")]
    Varint(String),
    #[error("invalid CID in block: {0}")]
    Cid(#[from] cid::Error),
    #[error("invalid DAG-CBOR header: {0}")]
    Header(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CarHeader {
    version: u64,
    roots: Vec<Cid>,
}

pub struct CarBlock {
    pub cid: Cid,
    pub bytes: Vec<u8>,
}

/// Encode a single CAR v1 file from a root set and an ordered block list.
pub fn encode(roots: &[Cid], blocks: &[CarBlock]) -> Result<Vec<u8>, CarError> {
    let header = CarHeader {
        version: 1,
        roots: roots.to_vec(),
    };
    let header_bytes =
        serde_ipld_dagcbor::to_vec(&header).map_err(|e| CarError::Header(e.to_string()))?;

    let mut out = Vec::new();
    write_varint_framed(&mut out, &header_bytes);

    for block in blocks {
        let cid_bytes = block.cid.to_bytes();
        let mut frame = Vec::with_capacity(cid_bytes.len() + block.bytes.len());
        frame.extend_from_slice(&cid_bytes);
        frame.extend_from_slice(&block.bytes);
        write_varint_framed(&mut out, &frame);
    }

    Ok(out)
}

/// Append one block to an already-encoded CAR file's raw bytes (used by the
/// egress journal's `Append`, which treats the current batch as a
/// streaming CAR rather than re-encoding it from scratch each time).
pub fn append_block(car_bytes: &mut Vec<u8>, block: &CarBlock) {
    let cid_bytes = block.cid.to_bytes();
    let mut frame = Vec::with_capacity(cid_bytes.len() + block.bytes.len());
    frame.extend_from_slice(&cid_bytes);
    frame.extend_from_slice(&block.bytes);
    write_varint_framed(car_bytes, &frame);
}

/// Build a fresh empty-bodied CAR file containing only the header, ready
/// for blocks to be appended with [`append_block`].
pub fn new_empty(roots: &[Cid]) -> Result<Vec<u8>, CarError> {
    encode(roots, &[])
}

pub fn decode(bytes: &[u8]) -> Result<(Vec<Cid>, Vec<CarBlock>), CarError> {
    let mut cursor = bytes;
    let header_bytes = read_varint_framed(&mut cursor)?;
    let header: CarHeader =
        serde_ipld_dagcbor::from_slice(&header_bytes).map_err(|e| CarError::Header(e.to_string()))?;

    let mut blocks = Vec::new();
    while !cursor.is_empty() {
        let frame = read_varint_framed(&mut cursor)?;
        let (cid, cid_len) = Cid::read_bytes(frame.as_slice())
            .map(|cid| {
                let len = cid.to_bytes().len();
                (cid, len)
            })
            .map_err(CarError::Cid)?;
        let content = frame[cid_len..].to_vec();
        blocks.push(CarBlock { cid, bytes: content });
    }

    Ok((header.roots, blocks))
}

/// The CID assigned to a rotated egress batch: CIDv1, multicodec=CAR,
/// multihash=SHA2-256 over the raw file bytes (`spec.md` §3 invariant 4).
pub fn cid_of_car_bytes(bytes: &[u8]) -> Cid {
    let mh = Code::Sha2_256.digest(bytes);
    Cid::new_v1(CAR_MULTICODEC, mh)
}

fn write_varint_framed(out: &mut Vec<u8>, payload: &[u8]) {
    let mut len_buf = unsigned_varint::encode::u64_buffer();
    let len_bytes = unsigned_varint::encode::u64(payload.len() as u64, &mut len_buf);
    out.extend_from_slice(len_bytes);
    out.extend_from_slice(payload);
}

fn read_varint_framed<'a>(cursor: &mut &'a [u8]) -> Result<Vec<u8>, CarError> {
    let (len, rest) =
        unsigned_varint::decode::u64(cursor).map_err(|e| CarError::Varint(e.to_string()))?;
    let len = len as usize;
    if rest.len() < len {
        return Err(CarError::Truncated);
    }
    let (frame, remaining) = rest.split_at(len);
    *cursor = remaining;
    Ok(frame.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::digest::Digest;
    use crate::domain::link::Link;

    fn block_for(content: &[u8]) -> CarBlock {
        let link = Link::from_digest(&Digest::of(content));
        CarBlock {
            cid: *link.cid(),
            bytes: content.to_vec(),
        }
    }

    #[test]
    fn round_trips_header_and_blocks() {
        let b1 = block_for(b"receipt one");
        let b2 = block_for(b"receipt two");
        let roots = vec![b1.cid];
        let encoded = encode(&roots, &[b1, b2]).unwrap();

        let (decoded_roots, decoded_blocks) = decode(&encoded).unwrap();
        assert_eq!(decoded_roots, roots);
        assert_eq!(decoded_blocks.len(), 2);
        assert_eq!(decoded_blocks[0].bytes, b"receipt one");
        assert_eq!(decoded_blocks[1].bytes, b"receipt two");
    }

    #[test]
    fn appended_blocks_are_readable() {
        let mut car = new_empty(&[]).unwrap();
        append_block(&mut car, &block_for(b"a"));
        append_block(&mut car, &block_for(b"b"));
        let (_, blocks) = decode(&car).unwrap();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn batch_cid_uses_car_multicodec() {
        let car = new_empty(&[]).unwrap();
        let cid = cid_of_car_bytes(&car);
        assert_eq!(cid.codec(), CAR_MULTICODEC);
    }

    #[test]
    fn same_bytes_produce_same_cid() {
        let car = encode(&[], &[block_for(b"x")]).unwrap();
        assert_eq!(cid_of_car_bytes(&car), cid_of_car_bytes(&car.clone()));
    }
}
