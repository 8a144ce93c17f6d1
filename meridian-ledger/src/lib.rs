//! Meridian Ledger - the append-only chain
//!
//! Owns the chain collection: block numbering, production, persistence,
//! replay and validation. Transactions flow in through a pending queue
//! and are executed through the contract runtime while a block is being
//! produced.

pub mod blockchain;
pub mod error;

pub use blockchain::{spawn_autosave, Blockchain};
pub use error::{LedgerError, LedgerResult};
