//! Blocks and their hashing rules

use serde::{Deserialize, Serialize};

use crate::constants::{GENESIS_PREVIOUS_HASH, GENESIS_TIMESTAMP};
use crate::crypto::{canonical, merkle, sha256_hex};
use crate::error::CoreResult;
use crate::types::Transaction;

/// A locally-produced sidechain block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Strictly increasing, previous + 1.
    pub block_number: u64,
    /// Anchor block of the first transaction, 0 for an empty block.
    pub ref_anchor_block_number: u64,
    /// Hash of the previous block; `"0"` for genesis.
    pub previous_hash: String,
    /// ISO-8601 production timestamp.
    pub timestamp: String,
    /// Executed transactions with logs attached.
    pub transactions: Vec<Transaction>,
    /// SHA-256 over `previous_hash ∥ timestamp ∥ canonical_json(transactions)`.
    #[serde(default)]
    pub hash: String,
    /// Merkle root over transaction hashes; empty string for no transactions.
    #[serde(default)]
    pub merkle_root: String,
}

impl Block {
    /// Assemble an unsealed block. `seal` must be called after all
    /// transactions have been executed and their logs attached.
    pub fn new(
        block_number: u64,
        previous_hash: impl Into<String>,
        timestamp: impl Into<String>,
        transactions: Vec<Transaction>,
    ) -> Self {
        let ref_anchor_block_number = transactions
            .first()
            .map(|tx| tx.ref_anchor_block_number)
            .unwrap_or(0);
        Self {
            block_number,
            ref_anchor_block_number,
            previous_hash: previous_hash.into(),
            timestamp: timestamp.into(),
            transactions,
            hash: String::new(),
            merkle_root: String::new(),
        }
    }

    /// The genesis block: number 0, a single synthetic transaction
    /// carrying the chain id, never executed.
    pub fn genesis(chain_id: &str) -> CoreResult<Self> {
        let mut block = Self::new(
            0,
            GENESIS_PREVIOUS_HASH,
            GENESIS_TIMESTAMP,
            vec![Transaction::genesis(chain_id)],
        );
        block.seal()?;
        Ok(block)
    }

    /// Compute the block hash from the current contents.
    pub fn calculate_hash(&self) -> CoreResult<String> {
        let transactions = canonical::to_canonical_json(&self.transactions)?;
        Ok(sha256_hex(format!(
            "{}{}{}",
            self.previous_hash, self.timestamp, transactions
        )))
    }

    /// Compute the Merkle root over the transaction hashes.
    pub fn calculate_merkle_root(&self) -> String {
        let leaves: Vec<&str> = self
            .transactions
            .iter()
            .map(|tx| tx.hash.as_str())
            .collect();
        merkle::merkle_root(&leaves)
    }

    /// Finalize `hash` and `merkle_root`. Must run after execution so the
    /// hash covers the transaction logs.
    pub fn seal(&mut self) -> CoreResult<()> {
        self.merkle_root = self.calculate_merkle_root();
        self.hash = self.calculate_hash()?;
        Ok(())
    }

    /// Verify this block's own commitments (not the chain link).
    pub fn verify_integrity(&self) -> CoreResult<bool> {
        Ok(self.merkle_root == self.calculate_merkle_root()
            && self.hash == self.calculate_hash()?)
    }
}
