//! Error types for the ledger

use thiserror::Error;

/// Ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Core error: {0}")]
    Core(#[from] meridian_core::CoreError),

    #[error("Store error: {0}")]
    Store(#[from] meridian_store::StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt block record: {0}")]
    CorruptBlock(String),

    /// Replay produced a different hash than the stored chain. Fatal:
    /// the node must not keep running on non-reproducible state.
    #[error("Determinism violation at block {block_number}: expected {expected}, got {actual}")]
    Determinism {
        block_number: u64,
        expected: String,
        actual: String,
    },
}

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
