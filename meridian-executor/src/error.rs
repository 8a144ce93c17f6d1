//! Error types for the executor
//!
//! Contract-level failures never surface here: they are recorded as
//! strings on the transaction logs. This enum covers host-side faults
//! only.

use thiserror::Error;

/// Executor errors
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Store error: {0}")]
    Store(#[from] meridian_store::StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt contract record: {0}")]
    CorruptContract(String),
}

/// Result type alias for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;
