//! Node configuration
//!
//! A JSON config file plus two environment variables. The env pair
//! (`ACCOUNT`, `ACTIVE_SIGNING_KEY`) is what makes a node a witness;
//! without it the round coordinator stays disabled.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_VM_TIMEOUT_MS;
use crate::error::CoreResult;

/// Node configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    /// Chain identifier, mixed into the genesis block and the anchor
    /// custom-JSON id.
    pub chain_id: String,
    /// Directory holding the database file.
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir`.
    pub database_file: String,
    /// Autosave interval in milliseconds; 0 disables autosave.
    pub autosave_interval: u64,
    /// Per-invocation sandbox budget in milliseconds.
    pub vm_timeout_ms: u64,
    /// Port the witness peer server listens on.
    pub p2p_port: u16,
    /// Anchor RPC endpoints, tried in round-robin order.
    pub stream_nodes: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: "testnet".to_string(),
            data_dir: PathBuf::from("./data"),
            database_file: "database.db".to_string(),
            autosave_interval: 600_000,
            vm_timeout_ms: DEFAULT_VM_TIMEOUT_MS,
            p2p_port: 5001,
            stream_nodes: vec!["https://api.steemit.com".to_string()],
        }
    }
}

impl NodeConfig {
    /// Load the configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Full path of the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

/// Witness identity taken from the environment.
#[derive(Debug, Clone)]
pub struct WitnessIdentity {
    pub account: String,
    pub signing_key_hex: String,
}

impl WitnessIdentity {
    /// Read `ACCOUNT` and `ACTIVE_SIGNING_KEY`; both must be present and
    /// non-empty for the node to participate as a witness.
    pub fn from_env() -> Option<Self> {
        let account = std::env::var("ACCOUNT").ok()?;
        let signing_key_hex = std::env::var("ACTIVE_SIGNING_KEY").ok()?;
        if account.is_empty() || signing_key_hex.is_empty() {
            return None;
        }
        Some(Self {
            account,
            signing_key_hex,
        })
    }
}
