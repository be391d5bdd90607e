//! The `EventStore` seam between the realtime service and durable storage.

use async_trait::async_trait;
use thiserror::Error;

use chainsync_core::interval::IntervalCorruption;
use chainsync_core::types::{Block, ContractCall, Log, Transaction};
use chainsync_core::CachedInterval;

/// Errors from the storage layer.
///
/// Database errors are transient (a retried write is safe because every
/// operation is atomic and conflict-tolerant); interval corruption is not.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    IntervalCorruption(#[from] IntervalCorruption),

    #[error("corrupt row: {field} = {value:?}")]
    CorruptRow { field: &'static str, value: String },
}

/// Parameters for [`EventStore::get_logs`].
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub contract_address: String,
    /// Exclusive lower bound on block timestamp.
    pub from_block_timestamp: i64,
    /// Inclusive upper bound on block timestamp.
    pub to_block_timestamp: i64,
    /// Restrict to these topic0 values (event signature hashes).
    pub event_sig_hashes: Option<Vec<String>>,
}

/// Durable storage for blocks, transactions, logs, per-filter cached
/// intervals, and contract-call memo entries.
///
/// All multi-row operations are transactional: a partial write is never
/// observable, and primary-key conflicts on blocks/transactions/logs are
/// benign.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert one full block, the transactions referenced by its matched
    /// logs, and the matched logs themselves; then backfill
    /// `block_timestamp` on any pre-existing log rows with this block's
    /// hash.
    async fn insert_realtime_block(
        &self,
        chain_id: u64,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
    ) -> Result<(), StoreError>;

    /// Apply the interval-merge write for each log filter key, in a single
    /// transaction. Reapplying an already-covered range is a no-op.
    async fn insert_log_filter_cached_ranges(
        &self,
        log_filter_keys: &[String],
        start_block: u64,
        end_block: u64,
        end_block_timestamp: i64,
    ) -> Result<(), StoreError>;

    /// Delete all logs, transactions, and blocks at or above
    /// `from_block_number`. Cached intervals lag behind finality and are
    /// never touched here.
    async fn delete_realtime_data(
        &self,
        chain_id: u64,
        from_block_number: u64,
    ) -> Result<(), StoreError>;

    /// Stored intervals for one contract, ordered by start block.
    async fn get_cached_intervals(
        &self,
        contract_address: &str,
    ) -> Result<Vec<CachedInterval>, StoreError>;

    async fn get_block(&self, hash: &str) -> Result<Option<Block>, StoreError>;

    async fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>, StoreError>;

    /// Logs for one contract within a timestamp window, ordered by
    /// `log_sort_key`.
    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, StoreError>;

    async fn upsert_contract_call(&self, call: &ContractCall) -> Result<(), StoreError>;

    async fn get_contract_call(&self, key: &str) -> Result<Option<ContractCall>, StoreError>;
}
