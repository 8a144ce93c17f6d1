//! Meridian Witness - round agreement
//!
//! A per-witness state machine that folds a run of finalized blocks into
//! a round hash, collects a quorum of witness signatures over it through
//! a challenge-authenticated peer protocol, and anchors the signed round
//! on the parent chain.

pub mod coordinator;
pub mod error;
pub mod message;
pub mod tcp;
pub mod transport;

pub use coordinator::Coordinator;
pub use error::{WitnessError, WitnessResult};
pub use message::{PeerEvent, PeerMessage, SocketId};
pub use transport::{MemoryHub, PeerTransport};
