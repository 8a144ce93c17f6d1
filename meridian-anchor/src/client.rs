//! Custom-JSON envelope and the client seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use meridian_core::constants::CUSTOM_JSON_ID_PREFIX;

use crate::error::{AnchorError, AnchorResult};

/// The custom-JSON operation posted on the anchor chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomJsonOperation {
    pub required_auths: Vec<String>,
    pub required_posting_auths: Vec<String>,
    /// `ssc-<chainId>`; anchor-side indexers filter on it.
    pub id: String,
    /// Stringified `{contractName, contractAction, contractPayload}`.
    pub json: String,
}

impl CustomJsonOperation {
    /// Build the envelope for one sidechain contract action.
    pub fn new(
        account: &str,
        chain_id: &str,
        contract_name: &str,
        contract_action: &str,
        contract_payload: Value,
    ) -> AnchorResult<Self> {
        let payload = serde_json::json!({
            "contractName": contract_name,
            "contractAction": contract_action,
            "contractPayload": contract_payload,
        });
        Ok(Self {
            required_auths: vec![account.to_string()],
            required_posting_auths: Vec::new(),
            id: format!("{CUSTOM_JSON_ID_PREFIX}{chain_id}"),
            json: serde_json::to_string(&payload)?,
        })
    }

    /// The `contractAction` inside the envelope, if parsable.
    pub fn contract_action(&self) -> Option<String> {
        let payload: Value = serde_json::from_str(&self.json).ok()?;
        payload
            .get("contractAction")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Seam between the round coordinator and the anchor chain.
#[async_trait]
pub trait AnchorClient: Send + Sync {
    async fn broadcast_custom_json(&self, operation: &CustomJsonOperation) -> AnchorResult<()>;
}

/// Recording client for tests: every accepted operation is kept, and a
/// configurable number of leading calls fail with a transport error.
#[derive(Default)]
pub struct MockAnchorClient {
    accepted: Mutex<Vec<CustomJsonOperation>>,
    failures_left: AtomicU32,
}

impl MockAnchorClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` broadcasts before accepting any.
    pub fn fail_next(n: u32) -> Self {
        Self {
            accepted: Mutex::new(Vec::new()),
            failures_left: AtomicU32::new(n),
        }
    }

    pub fn accepted(&self) -> Vec<CustomJsonOperation> {
        self.accepted.lock().expect("mock lock poisoned").clone()
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl AnchorClient for MockAnchorClient {
    async fn broadcast_custom_json(&self, operation: &CustomJsonOperation) -> AnchorResult<()> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AnchorError::Transport("injected failure".to_string()));
        }
        self.accepted
            .lock()
            .expect("mock lock poisoned")
            .push(operation.clone());
        Ok(())
    }
}
