//! The canonical output entity published downstream.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One named argument of a function call, mirroring the mapped operation's
/// logical signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionArgument {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: String,
    pub value: String,
}

impl FunctionArgument {
    pub fn new(name: &str, arg_type: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            arg_type: arg_type.to_string(),
            value: value.into(),
        }
    }
}

/// Canonical, operation-type-agnostic representation of one chain operation.
///
/// Constructed in one step and never mutated. Accounts are empty strings when
/// absent, never null, so downstream consumers get a uniform contract. The
/// metadata map is ordered so serialization is byte-stable. `hash` is derived
/// from (ledger, transaction hash, index) alone, so re-processing the same
/// operation yields a byte-identical record — the downstream idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub from: String,
    pub to: String,
    pub operation_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    pub value: String,
    pub lumens_transferred: String,
    pub metadata: BTreeMap<String, String>,
    pub arguments: Vec<FunctionArgument>,
    pub signature: String,
    pub ledger: u64,
    pub transaction_hash: String,
    pub timestamp: DateTime<Utc>,
    /// Nested sub-calls are not modeled; always 0.
    pub depth: u32,
    /// Position of the operation within its transaction.
    pub index: u32,
    /// Comma-joined effect-type names.
    pub effects: String,
    pub hash: String,
}

/// Deterministic content hash over (ledger sequence, transaction hash,
/// operation index).
pub fn content_hash(ledger: u64, transaction_hash: &str, index: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ledger.to_be_bytes());
    hasher.update(transaction_hash.as_bytes());
    hasher.update(index.to_be_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_reproducible() {
        let a = content_hash(12345, "deadbeef", 2);
        let b = content_hash(12345, "deadbeef", 2);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn content_hash_distinguishes_inputs() {
        let base = content_hash(12345, "deadbeef", 2);
        assert_ne!(base, content_hash(12345, "deadbeef", 3));
        assert_ne!(base, content_hash(12346, "deadbeef", 2));
        assert_ne!(base, content_hash(12345, "deadbeee", 2));
    }
}
