//! Meridian Executor - deterministic contract runtime
//!
//! Runs untrusted contract code inside an isolated Rhai engine with a
//! capability-only host API (`db`, `currency`, `emit`, `assert`,
//! `debug`, `execute_smart_contract`), an operation-fuel limit and a
//! wall-clock deadline. Everything a contract can observe comes from the
//! transaction or the document store, so a replay reproduces the exact
//! same logs and table mutations.

pub mod currency;
pub mod error;
pub mod executor;
pub mod sandbox;
pub mod tables;
pub mod template;

pub use error::{ExecutorError, ExecutorResult};
pub use executor::SmartContracts;
