//! Meridian Core - sidechain data model and primitives
//!
//! This crate provides the shared building blocks of the Meridian sidechain:
//! - Block and transaction types with their hashing rules
//! - Merkle commitment over transaction hashes
//! - Canonical JSON serialization used by every digest and signature
//! - secp256k1 recoverable signatures in the anchor chain's 130-hex format
//! - Node configuration and protocol constants

pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod types;

pub use config::{NodeConfig, WitnessIdentity};
pub use constants::*;
pub use error::{CoreError, CoreResult};
pub use types::*;
