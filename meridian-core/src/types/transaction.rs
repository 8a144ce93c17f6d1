//! Transactions and their execution logs

use serde::{Deserialize, Serialize};

use crate::crypto::{canonical, sha256_hex};
use crate::error::CoreResult;

/// A user-submitted transaction, immutable once created.
///
/// `hash` commits to every field except `logs`; `logs` is attached
/// exactly once, after execution, and is covered by the block hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Anchor-chain block this transaction references.
    pub ref_anchor_block_number: u64,
    /// Submitter-assigned transaction id.
    pub transaction_id: String,
    /// Account that signed the transaction on the anchor chain.
    pub sender: String,
    /// Target contract, if any.
    pub contract: Option<String>,
    /// Requested action, if any.
    pub action: Option<String>,
    /// Action parameters as JSON text, if any.
    pub payload: Option<String>,
    /// SHA-256 over the lexical concatenation of the fields above.
    #[serde(default)]
    pub hash: String,
    /// Canonical JSON of `{errors?, events?}` recorded during execution.
    #[serde(default)]
    pub logs: String,
}

impl Transaction {
    /// Create a transaction and compute its hash.
    pub fn new(
        ref_anchor_block_number: u64,
        transaction_id: impl Into<String>,
        sender: impl Into<String>,
        contract: Option<String>,
        action: Option<String>,
        payload: Option<String>,
    ) -> Self {
        let mut tx = Self {
            ref_anchor_block_number,
            transaction_id: transaction_id.into(),
            sender: sender.into(),
            contract,
            action,
            payload,
            hash: String::new(),
            logs: String::new(),
        };
        tx.hash = tx.calculate_hash();
        tx
    }

    /// The synthetic genesis transaction carrying the chain id.
    ///
    /// It is never executed; it only pins the chain id into block 0.
    pub fn genesis(chain_id: &str) -> Self {
        let payload = serde_json::json!({ "chainId": chain_id });
        Self::new(
            0,
            "0",
            "null",
            None,
            None,
            Some(payload.to_string()),
        )
    }

    /// Recompute the transaction hash from its immutable fields.
    ///
    /// Absent `contract`/`action`/`payload` contribute the literal text
    /// `null`, matching the wire representation.
    pub fn calculate_hash(&self) -> String {
        let input = format!(
            "{}{}{}{}{}{}",
            self.ref_anchor_block_number,
            self.transaction_id,
            self.sender,
            null_or(&self.contract),
            null_or(&self.action),
            null_or(&self.payload),
        );
        sha256_hex(input)
    }

    /// Attach the execution logs. Called once, after execution.
    pub fn attach_logs(&mut self, logs: &TransactionLogs) -> CoreResult<()> {
        self.logs = canonical::to_canonical_json(logs)?;
        Ok(())
    }
}

fn null_or(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("null")
}

/// Structured execution output of a single transaction.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLogs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<ContractEvent>,
}

impl TransactionLogs {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.events.is_empty()
    }

    /// Fold another log set into this one, preserving order.
    pub fn absorb(&mut self, other: &TransactionLogs) {
        self.errors.extend(other.errors.iter().cloned());
        self.events.extend(other.events.iter().cloned());
    }
}

/// An event emitted by a contract via the sandbox `emit` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub event: String,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        let a = Transaction::new(
            1234,
            "tx-1",
            "alice",
            Some("tok".to_string()),
            Some("mint".to_string()),
            Some(r#"{"amount":"5"}"#.to_string()),
        );
        let b = a.clone();
        assert_eq!(a.hash, b.calculate_hash());
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn absent_fields_hash_as_null_text() {
        let tx = Transaction::new(7, "id", "bob", None, None, None);
        assert_eq!(tx.hash, crate::crypto::sha256_hex("7idbobnullnullnull"));
    }

    #[test]
    fn hash_changes_with_any_field() {
        let base = Transaction::new(1, "id", "bob", None, None, None);
        let other = Transaction::new(2, "id", "bob", None, None, None);
        assert_ne!(base.hash, other.hash);
    }

    #[test]
    fn logs_do_not_affect_hash() {
        let mut tx = Transaction::new(1, "id", "bob", None, None, None);
        let before = tx.hash.clone();
        tx.attach_logs(&TransactionLogs {
            errors: vec!["boom".to_string()],
            events: vec![],
        })
        .unwrap();
        assert_eq!(tx.calculate_hash(), before);
        assert_eq!(tx.logs, r#"{"errors":["boom"]}"#);
    }

    #[test]
    fn empty_logs_serialize_to_empty_object() {
        let mut tx = Transaction::new(1, "id", "bob", None, None, None);
        tx.attach_logs(&TransactionLogs::default()).unwrap();
        assert_eq!(tx.logs, "{}");
    }

    #[test]
    fn serde_uses_camel_case_field_names() {
        let tx = Transaction::new(1, "id", "bob", None, None, None);
        let json = serde_json::to_value(&tx).unwrap();
        assert!(json.get("refAnchorBlockNumber").is_some());
        assert!(json.get("transactionId").is_some());
    }

    #[test]
    fn genesis_transaction_carries_chain_id() {
        let tx = Transaction::genesis("testnet");
        assert_eq!(tx.sender, "null");
        assert!(tx.payload.as_deref().unwrap().contains("testnet"));
    }
}
