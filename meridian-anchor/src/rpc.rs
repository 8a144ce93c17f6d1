//! HTTP JSON-RPC anchor client
//!
//! Endpoints are tried in round-robin order: a failing endpoint is
//! rotated to the back of the queue so the next attempt lands on the
//! next node.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::client::{AnchorClient, CustomJsonOperation};
use crate::error::{AnchorError, AnchorResult};

/// JSON-RPC client over a rotating endpoint queue.
pub struct RpcAnchorClient {
    endpoints: Mutex<Vec<String>>,
    http: reqwest::Client,
}

impl RpcAnchorClient {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints: Mutex::new(endpoints),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// The endpoint the next request will use.
    pub fn current_endpoint(&self) -> AnchorResult<String> {
        self.endpoints
            .lock()
            .expect("endpoint lock poisoned")
            .first()
            .cloned()
            .ok_or(AnchorError::NoEndpoints)
    }

    /// Move the current endpoint to the back of the queue.
    pub fn rotate_endpoint(&self) {
        let mut endpoints = self.endpoints.lock().expect("endpoint lock poisoned");
        if endpoints.len() > 1 {
            let first = endpoints.remove(0);
            endpoints.push(first);
        }
    }
}

#[async_trait]
impl AnchorClient for RpcAnchorClient {
    async fn broadcast_custom_json(&self, operation: &CustomJsonOperation) -> AnchorResult<()> {
        let endpoint = self.current_endpoint()?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "broadcast_custom_json",
            "params": [operation],
        });

        let response = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %endpoint, error = %e, "anchor endpoint unreachable");
                self.rotate_endpoint();
                AnchorError::Transport(e.to_string())
            })?;

        if !response.status().is_success() {
            self.rotate_endpoint();
            return Err(AnchorError::Transport(format!(
                "{endpoint} returned {}",
                response.status()
            )));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| AnchorError::Transport(e.to_string()))?;
        if let Some(error) = reply.get("error") {
            return Err(AnchorError::Rpc(error.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_rotate_round_robin() {
        let client = RpcAnchorClient::new(vec![
            "https://a".to_string(),
            "https://b".to_string(),
            "https://c".to_string(),
        ]);

        assert_eq!(client.current_endpoint().unwrap(), "https://a");
        client.rotate_endpoint();
        assert_eq!(client.current_endpoint().unwrap(), "https://b");
        client.rotate_endpoint();
        client.rotate_endpoint();
        assert_eq!(client.current_endpoint().unwrap(), "https://a");
    }

    #[test]
    fn single_endpoint_never_rotates_away() {
        let client = RpcAnchorClient::new(vec!["https://only".to_string()]);
        client.rotate_endpoint();
        assert_eq!(client.current_endpoint().unwrap(), "https://only");
    }

    #[test]
    fn empty_endpoint_list_is_an_error() {
        let client = RpcAnchorClient::new(Vec::new());
        assert!(matches!(
            client.current_endpoint(),
            Err(AnchorError::NoEndpoints)
        ));
    }
}
