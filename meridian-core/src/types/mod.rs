//! Sidechain data model

pub mod block;
pub mod contract;
pub mod transaction;
pub mod witness;

pub use block::Block;
pub use contract::{is_valid_contract_name, is_valid_table_name, Contract};
pub use transaction::{ContractEvent, Transaction, TransactionLogs};
pub use witness::{RoundProposition, ScheduleEntry, WitnessParams, WitnessRecord};
