// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Receipts: signed records of an invocation's outcome.
//!
//! A receipt names the invocation it answers (`ran`), carries its own
//! content-addressed root, an IPLD block set, and an outcome — `Ok` or one
//! of a small closed set of receipt-visible error variants. Receipt error
//! variants are distinct from [`crate::domain::errors::CoreError`]: they are
//! the wire-facing subset the handler boundary maps *onto*, never the
//! internal kind itself.

use serde::{Deserialize, Serialize};

use crate::domain::capability::ByteRange;
use crate::domain::link::Link;

/// The closed set of error outcomes a receipt may carry. Every `CoreError`
/// the handler boundary sees is mapped into exactly one of these (or
/// into a transport-level 5xx that never reaches a receipt at all).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum ReceiptError {
    NotFoundError,
    RangeNotSatisfiableError { range: ByteRange, size: u64 },
    Unauthorized,
    InvalidResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum Outcome {
    Ok(serde_json::Value),
    Error(ReceiptError),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }
}

/// A single IPLD block as it would appear in the receipt's CAR archive:
/// a link and the raw DAG-CBOR bytes it resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpldBlock {
    pub cid: Link,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// Content-addressed root of this receipt's own encoding.
    pub root: Link,
    /// The invocation this receipt answers.
    pub ran: Link,
    pub out: Outcome,
    pub blocks: Vec<IpldBlock>,
}

impl Receipt {
    pub fn ok(root: Link, ran: Link, value: serde_json::Value, blocks: Vec<IpldBlock>) -> Self {
        Self {
            root,
            ran,
            out: Outcome::Ok(value),
            blocks,
        }
    }

    pub fn error(root: Link, ran: Link, error: ReceiptError, blocks: Vec<IpldBlock>) -> Self {
        Self {
            root,
            ran,
            out: Outcome::Error(error),
            blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::digest::Digest;

    #[test]
    fn ok_outcome_reports_is_ok() {
        let root = Link::from_digest(&Digest::of(b"root"));
        let ran = Link::from_digest(&Digest::of(b"ran"));
        let r = Receipt::ok(root, ran, serde_json::json!({"size": 10}), vec![]);
        assert!(r.out.is_ok());
    }

    #[test]
    fn error_outcome_round_trips_through_json() {
        let root = Link::from_digest(&Digest::of(b"root"));
        let ran = Link::from_digest(&Digest::of(b"ran"));
        let r = Receipt::error(root, ran, ReceiptError::NotFoundError, vec![]);
        let encoded = serde_json::to_string(&r).unwrap();
        let decoded: Receipt = serde_json::from_str(&encoded).unwrap();
        assert!(!decoded.out.is_ok());
    }
}
