//! Meridian Store - embedded JSON document store
//!
//! A small in-process document store: named collections of JSON
//! documents with equality queries, auto-assigned `_id`s and whole-file
//! persistence. The chain, the contract registry and every
//! contract-owned table live here.
//!
//! The store is deliberately synchronous; callers that need async
//! serialization wrap it (the ledger holds the production lock).

pub mod database;
pub mod error;

pub use database::Database;
pub use error::{StoreError, StoreResult};
