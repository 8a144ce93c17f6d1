//! Witness set, schedule and round types
//!
//! These rows are produced by the on-chain `witnesses` contract; the
//! round coordinator only consumes them.

use serde::{Deserialize, Serialize};

/// A registered witness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessRecord {
    pub account: String,
    /// Registered peer address; handshakes from other addresses are rejected.
    pub ip: String,
    pub p2p_port: u16,
    /// Hex-encoded compressed public key used to verify round signatures.
    pub signing_key: String,
    pub enabled: bool,
}

/// One row of the verification schedule: `witness` verifies `round`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub round: u64,
    pub witness: String,
}

/// Global round parameters maintained by the `witnesses` contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessParams {
    /// Round currently being verified.
    pub round: u64,
    /// Last block of the current round.
    pub last_block_round: u64,
    /// Last block already covered by an anchored round.
    pub last_verified_block_number: u64,
    /// Witness expected to propose the current round.
    pub current_witness: String,
}

/// An in-flight round proposition held by the proposing witness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundProposition {
    pub round: u64,
    pub round_hash: String,
    /// `(witness account, signature hex)` pairs, proposer first.
    pub signatures: Vec<(String, String)>,
}

impl RoundProposition {
    pub fn new(round: u64, round_hash: String) -> Self {
        Self {
            round,
            round_hash,
            signatures: Vec::new(),
        }
    }

    /// Append a signature unless the account already signed.
    pub fn add_signature(&mut self, account: String, signature: String) -> bool {
        if self.signatures.iter().any(|(a, _)| a == &account) {
            return false;
        }
        self.signatures.push((account, signature));
        true
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_signatures_are_ignored() {
        let mut prop = RoundProposition::new(3, "aa".repeat(32));
        assert!(prop.add_signature("w1".to_string(), "s1".to_string()));
        assert!(!prop.add_signature("w1".to_string(), "s2".to_string()));
        assert_eq!(prop.signature_count(), 1);
    }

    #[test]
    fn proposition_serializes_signatures_as_pairs() {
        let mut prop = RoundProposition::new(3, "ab".repeat(32));
        prop.add_signature("w1".to_string(), "s1".to_string());
        let json = serde_json::to_value(&prop).unwrap();
        assert_eq!(json["signatures"][0][0], "w1");
        assert_eq!(json["signatures"][0][1], "s1");
        assert_eq!(json["roundHash"], "ab".repeat(32));
    }
}
