//! Protocol constants
//!
//! All protocol-defined limits, collection names and default values live
//! here so the other crates agree on them.

// ============================================================================
// Collections
// ============================================================================

/// Collection holding the block chain; the genesis block is always row 0.
pub const CHAIN_COLLECTION: &str = "chain";

/// Collection holding deployed contract records.
pub const CONTRACTS_COLLECTION: &str = "contracts";

/// Name of the built-in contract that owns the witness set.
pub const WITNESSES_CONTRACT: &str = "witnesses";

/// Registered witnesses (account, ip, signing key).
pub const WITNESSES_TABLE: &str = "witnesses_witnesses";

/// Per-round verification schedule rows `{round, witness}`.
pub const SCHEDULES_TABLE: &str = "witnesses_schedules";

/// Global round parameters row.
pub const PARAMS_TABLE: &str = "witnesses_params";

// ============================================================================
// Chain
// ============================================================================

/// `previousHash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Fixed genesis timestamp; replay depends on it never changing.
pub const GENESIS_TIMESTAMP: &str = "2000-01-01T00:00:00";

/// Transactions addressed to this contract name are routed to deployment.
pub const DEPLOY_CONTRACT: &str = "contract";

/// Deployment action name.
pub const DEPLOY_ACTION: &str = "deploy";

/// One-shot contract initialization action, reachable only at deploy time.
pub const CONTRACT_INIT_ACTION: &str = "createSSC";

// ============================================================================
// Executor
// ============================================================================

/// Default per-invocation sandbox budget in milliseconds.
pub const DEFAULT_VM_TIMEOUT_MS: u64 = 10_000;

/// Operation fuel per invocation; the deterministic primary limit.
pub const VM_MAX_OPERATIONS: u64 = 5_000_000;

/// Maximum inter-contract call depth.
pub const MAX_CONTRACT_CALL_DEPTH: usize = 4;

// ============================================================================
// Rounds
// ============================================================================

/// Number of witnesses scheduled per round.
pub const NB_ROUND_WITNESSES: usize = 4;

/// Signatures required before a round may be anchored.
pub const ROUND_QUORUM: usize = 3;

/// Ticks a proposition may wait for quorum before it is discarded.
pub const MAX_ROUND_WAITING_PERIODS: u32 = 20;

/// Coordinator tick interval.
pub const ROUND_TICK_INTERVAL_MS: u64 = 3_000;

/// Delay before an anchor submission is retried after a transport failure.
pub const ANCHOR_RETRY_DELAY_MS: u64 = 1_000;

// ============================================================================
// Wire formats
// ============================================================================

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Length of a hex-encoded recoverable signature (65 bytes).
pub const SIGNATURE_HEX_LEN: usize = 130;

/// Length of a handshake challenge token.
pub const AUTH_TOKEN_LEN: usize = 32;

/// Account name length bounds.
pub const ACCOUNT_MIN_LEN: usize = 3;
pub const ACCOUNT_MAX_LEN: usize = 16;

/// Prefix of the anchor custom-JSON id; the chain id is appended.
pub const CUSTOM_JSON_ID_PREFIX: &str = "ssc-";
