//! Error types for anchor submission

use thiserror::Error;

/// Anchor client errors
#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("No anchor endpoints configured")]
    NoEndpoints,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for anchor operations
pub type AnchorResult<T> = Result<T, AnchorError>;
