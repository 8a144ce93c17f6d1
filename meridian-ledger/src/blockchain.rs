//! Chain management
//!
//! Producing, saving, loading and replaying are mutually exclusive; one
//! async mutex serializes them, so a producer that arrives during a save
//! simply waits. Block production is never interrupted mid-block.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use meridian_core::constants::{CHAIN_COLLECTION, CONTRACTS_COLLECTION};
use meridian_core::types::{Block, Contract, Transaction};
use meridian_executor::SmartContracts;
use meridian_store::Database;

use crate::error::{LedgerError, LedgerResult};

/// The append-only chain of locally-produced blocks.
pub struct Blockchain {
    chain_id: String,
    database_path: PathBuf,
    db: Arc<Database>,
    executor: SmartContracts,
    pending: StdMutex<VecDeque<Transaction>>,
    /// Serializes producing, saving, loading and replaying.
    guard: Mutex<()>,
}

impl Blockchain {
    pub fn new(
        chain_id: impl Into<String>,
        database_path: PathBuf,
        db: Arc<Database>,
        executor: SmartContracts,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            database_path,
            db,
            executor,
            pending: StdMutex::new(VecDeque::new()),
            guard: Mutex::new(()),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn database(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// Load the database file if present, then make sure the chain
    /// starts with the genesis block.
    pub async fn init(&self) -> LedgerResult<()> {
        let _guard = self.guard.lock().await;

        if self.database_path.exists() {
            self.db.load(&self.database_path)?;
            info!(path = %self.database_path.display(), blocks = self.db.count(CHAIN_COLLECTION), "database loaded");
        }
        self.bootstrap_collections()?;
        Ok(())
    }

    fn bootstrap_collections(&self) -> LedgerResult<()> {
        self.db.create_collection(CHAIN_COLLECTION);
        self.db.create_collection(CONTRACTS_COLLECTION);
        if self.db.count(CHAIN_COLLECTION) == 0 {
            let genesis = Block::genesis(&self.chain_id)?;
            self.db
                .insert(CHAIN_COLLECTION, serde_json::to_value(&genesis)?)?;
            info!(hash = %genesis.hash, "genesis block created");
        }
        Ok(())
    }

    /// Queue a transaction for the next block. No validation beyond
    /// field typing happens here.
    pub fn submit(&self, tx: Transaction) {
        self.pending.lock().expect("pending lock poisoned").push_back(tx);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending lock poisoned").len()
    }

    /// Produce a block from all currently pending transactions.
    ///
    /// Returns `None` when nothing is pending; the round protocol does
    /// not need empty blocks.
    pub async fn produce_block(&self, timestamp: DateTime<Utc>) -> LedgerResult<Option<Block>> {
        let _guard = self.guard.lock().await;

        let drained: Vec<Transaction> = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            pending.drain(..).collect()
        };
        if drained.is_empty() {
            return Ok(None);
        }

        let block = self.produce_block_inner(format_timestamp(timestamp), drained)?;
        Ok(Some(block))
    }

    /// Execute the transactions, seal the block and append it. Callers
    /// hold the production guard.
    fn produce_block_inner(
        &self,
        timestamp: String,
        mut transactions: Vec<Transaction>,
    ) -> LedgerResult<Block> {
        for tx in &mut transactions {
            let logs = self.executor.process_transaction(tx);
            tx.attach_logs(&logs)?;
        }

        let previous = self
            .latest_block()?
            .ok_or_else(|| LedgerError::CorruptBlock("chain has no genesis block".to_string()))?;

        let mut block = Block::new(
            previous.block_number + 1,
            previous.hash,
            timestamp,
            transactions,
        );
        block.seal()?;

        self.db
            .insert(CHAIN_COLLECTION, serde_json::to_value(&block)?)?;
        info!(
            block_number = block.block_number,
            transactions = block.transactions.len(),
            hash = %block.hash,
            "block produced"
        );
        Ok(block)
    }

    /// Read a block by number.
    pub fn block(&self, block_number: u64) -> LedgerResult<Option<Block>> {
        self.db
            .find_one(CHAIN_COLLECTION, &json!({ "blockNumber": block_number }))
            .map(block_from_value)
            .transpose()
    }

    /// Read the most recently produced block.
    pub fn latest_block(&self) -> LedgerResult<Option<Block>> {
        self.db.last(CHAIN_COLLECTION).map(block_from_value).transpose()
    }

    pub fn block_count(&self) -> usize {
        self.db.count(CHAIN_COLLECTION)
    }

    /// Persist the database to disk.
    pub async fn save(&self) -> LedgerResult<()> {
        let _guard = self.guard.lock().await;
        self.db.save(&self.database_path)?;
        Ok(())
    }

    /// Reload the database from disk, bootstrapping if the file vanished.
    pub async fn load(&self) -> LedgerResult<()> {
        let _guard = self.guard.lock().await;
        if self.database_path.exists() {
            self.db.load(&self.database_path)?;
        }
        self.bootstrap_collections()?;
        Ok(())
    }

    /// Rebuild the whole state by re-executing the stored chain on an
    /// empty database. Every recomputed block hash must equal the stored
    /// one; a divergence is fatal.
    pub async fn replay(&self) -> LedgerResult<u64> {
        let _guard = self.guard.lock().await;

        let stored: Vec<Block> = self
            .db
            .all(CHAIN_COLLECTION)
            .into_iter()
            .map(block_from_value)
            .collect::<LedgerResult<_>>()?;
        if stored.is_empty() {
            self.bootstrap_collections()?;
            return Ok(0);
        }

        info!(blocks = stored.len(), "replaying chain");
        self.db.wipe();
        self.bootstrap_collections()?;

        let genesis = self
            .latest_block()?
            .ok_or_else(|| LedgerError::CorruptBlock("no genesis after bootstrap".to_string()))?;
        if genesis.hash != stored[0].hash {
            return Err(LedgerError::Determinism {
                block_number: 0,
                expected: stored[0].hash.clone(),
                actual: genesis.hash,
            });
        }

        let mut replayed = 0;
        for original in stored.into_iter().skip(1) {
            let transactions = original
                .transactions
                .iter()
                .map(|tx| {
                    Transaction::new(
                        tx.ref_anchor_block_number,
                        tx.transaction_id.clone(),
                        tx.sender.clone(),
                        tx.contract.clone(),
                        tx.action.clone(),
                        tx.payload.clone(),
                    )
                })
                .collect();

            let produced = self.produce_block_inner(original.timestamp.clone(), transactions)?;
            if produced.hash != original.hash || produced.merkle_root != original.merkle_root {
                return Err(LedgerError::Determinism {
                    block_number: original.block_number,
                    expected: original.hash,
                    actual: produced.hash,
                });
            }
            replayed += 1;
        }

        info!(blocks = replayed, "replay complete");
        Ok(replayed)
    }

    /// Verify every block's commitments and the previous-hash links.
    pub async fn is_chain_valid(&self) -> LedgerResult<bool> {
        let _guard = self.guard.lock().await;

        let blocks: Vec<Block> = self
            .db
            .all(CHAIN_COLLECTION)
            .into_iter()
            .map(block_from_value)
            .collect::<LedgerResult<_>>()?;

        for window in blocks.windows(2) {
            let (previous, current) = (&window[0], &window[1]);
            if current.previous_hash != previous.hash
                || current.block_number != previous.block_number + 1
                || !current.verify_integrity()?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Query surface exposed over the node's message bus
    // ------------------------------------------------------------------

    pub fn get_block_info(&self, block_number: u64) -> LedgerResult<Option<Block>> {
        self.block(block_number)
    }

    pub fn get_latest_block_info(&self) -> LedgerResult<Option<Block>> {
        self.latest_block()
    }

    pub fn find_in_table(&self, contract: &str, table: &str, query: &Value) -> Vec<Value> {
        self.db.find(&format!("{contract}_{table}"), query)
    }

    pub fn find_one_in_table(&self, contract: &str, table: &str, query: &Value) -> Option<Value> {
        self.db.find_one(&format!("{contract}_{table}"), query)
    }

    pub fn get_contract(&self, name: &str) -> LedgerResult<Option<Contract>> {
        Ok(self.executor.contract_by_name(name).map_err(|e| {
            LedgerError::CorruptBlock(e.to_string())
        })?)
    }
}

/// Background autosave loop. Returns `None` when disabled.
pub fn spawn_autosave(chain: Arc<Blockchain>, interval_ms: u64) -> Option<JoinHandle<()>> {
    if interval_ms == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        interval.tick().await; // the first tick completes immediately
        loop {
            interval.tick().await;
            if let Err(e) = chain.save().await {
                warn!(error = %e, "autosave failed");
            }
        }
    }))
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn block_from_value(mut value: Value) -> LedgerResult<Block> {
    if let Value::Object(map) = &mut value {
        map.remove("_id");
    }
    serde_json::from_value(value).map_err(|e| LedgerError::CorruptBlock(e.to_string()))
}
