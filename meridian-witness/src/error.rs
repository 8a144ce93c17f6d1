//! Error types for the witness protocol

use thiserror::Error;

use crate::message::SocketId;

/// Witness protocol errors
#[derive(Error, Debug)]
pub enum WitnessError {
    #[error("Core error: {0}")]
    Core(#[from] meridian_core::CoreError),

    #[error("Store error: {0}")]
    Store(#[from] meridian_store::StoreError),

    #[error("Anchor error: {0}")]
    Anchor(#[from] meridian_anchor::AnchorError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not connected: socket {0}")]
    NotConnected(SocketId),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Missing block {0} while hashing a round")]
    MissingBlock(u64),
}

/// Result type alias for witness operations
pub type WitnessResult<T> = Result<T, WitnessError>;
