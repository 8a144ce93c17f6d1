//! Serialized anchor submission
//!
//! A single flight lock guarantees at most one custom JSON is in flight
//! at any moment. Transport failures are retried after a fixed delay up
//! to a bounded number of attempts; the caller decides what a final
//! failure means for its round state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use meridian_core::constants::ANCHOR_RETRY_DELAY_MS;

use crate::client::{AnchorClient, CustomJsonOperation};
use crate::error::AnchorResult;

/// Serializes and retries custom-JSON submissions.
pub struct AnchorSubmitter {
    client: Arc<dyn AnchorClient>,
    in_flight: Mutex<()>,
    max_attempts: u32,
}

impl AnchorSubmitter {
    pub fn new(client: Arc<dyn AnchorClient>) -> Self {
        Self {
            client,
            in_flight: Mutex::new(()),
            max_attempts: 3,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Submit one operation, holding the flight lock for the whole
    /// retry sequence.
    pub async fn submit(&self, operation: &CustomJsonOperation) -> AnchorResult<()> {
        let _flight = self.in_flight.lock().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.broadcast_custom_json(operation).await {
                Ok(()) => {
                    info!(id = %operation.id, attempt, "custom json anchored");
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!(id = %operation.id, attempt, error = %e, "anchor submission failed, retrying");
                    tokio::time::sleep(Duration::from_millis(ANCHOR_RETRY_DELAY_MS)).await;
                }
                Err(e) => {
                    warn!(id = %operation.id, attempt, error = %e, "anchor submission abandoned");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockAnchorClient;
    use serde_json::Value;

    fn operation() -> CustomJsonOperation {
        CustomJsonOperation::new("w1", "testnet", "witnesses", "proposeRound", Value::Null)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn retries_after_transport_failure() {
        let mock = Arc::new(MockAnchorClient::fail_next(1));
        let submitter = AnchorSubmitter::new(mock.clone());

        submitter.submit(&operation()).await.unwrap();
        assert_eq!(mock.accepted_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let mock = Arc::new(MockAnchorClient::fail_next(10));
        let submitter = AnchorSubmitter::new(mock.clone()).with_max_attempts(2);

        assert!(submitter.submit(&operation()).await.is_err());
        assert_eq!(mock.accepted_count(), 0);
    }

    #[tokio::test]
    async fn submissions_are_serialized() {
        let mock = Arc::new(MockAnchorClient::new());
        let submitter = Arc::new(AnchorSubmitter::new(mock.clone()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let submitter = submitter.clone();
            handles.push(tokio::spawn(async move {
                submitter.submit(&operation()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(mock.accepted_count(), 4);
    }
}
