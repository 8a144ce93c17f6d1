//! Meridian Anchor - parent-chain submission
//!
//! Rounds are finalized by posting a custom-JSON operation on the
//! anchor chain. This crate fixes the payload envelope, provides the
//! `AnchorClient` seam (HTTP implementation plus a recording mock for
//! tests) and serializes submissions so at most one operation is ever
//! in flight.

pub mod client;
pub mod error;
pub mod rpc;
pub mod submitter;

pub use client::{AnchorClient, CustomJsonOperation, MockAnchorClient};
pub use error::{AnchorError, AnchorResult};
pub use rpc::RpcAnchorClient;
pub use submitter::AnchorSubmitter;
