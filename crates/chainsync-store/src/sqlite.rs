//! SQLite event store backend.
//!
//! Single-file persistence via `sqlx` with WAL mode. Every multi-row
//! operation runs inside an explicit transaction; blocks, transactions,
//! and logs use conflict-ignoring inserts so re-delivery is benign, while
//! the cached-interval write enforces the merge invariant and fails hard
//! on corruption.

use async_trait::async_trait;
use primitive_types::U256;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainsync_core::interval::merge_intervals;
use chainsync_core::types::{Block, ContractCall, Log, Transaction};
use chainsync_core::CachedInterval;

use crate::store::{EventStore, LogQuery, StoreError};

/// SQLite-backed [`EventStore`].
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./cache.db"`) or a full SQLite
    /// URL (`"sqlite:./cache.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blocks (
                hash               TEXT PRIMARY KEY,
                number             INTEGER NOT NULL,
                timestamp          INTEGER NOT NULL,
                gas_limit          TEXT    NOT NULL,
                gas_used           TEXT    NOT NULL,
                base_fee_per_gas   TEXT,
                miner              TEXT    NOT NULL,
                extra_data         TEXT    NOT NULL,
                size               INTEGER NOT NULL,
                parent_hash        TEXT    NOT NULL,
                state_root         TEXT    NOT NULL,
                transactions_root  TEXT    NOT NULL,
                receipts_root      TEXT    NOT NULL,
                logs_bloom         TEXT    NOT NULL,
                total_difficulty   TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transactions (
                hash                      TEXT PRIMARY KEY,
                nonce                     INTEGER NOT NULL,
                \"from\"                  TEXT    NOT NULL,
                \"to\"                    TEXT,
                value                     TEXT    NOT NULL,
                input                     TEXT    NOT NULL,
                gas                       TEXT    NOT NULL,
                gas_price                 TEXT    NOT NULL,
                max_fee_per_gas           TEXT,
                max_priority_fee_per_gas  TEXT,
                block_hash                TEXT    NOT NULL,
                block_number              INTEGER NOT NULL,
                transaction_index         INTEGER NOT NULL,
                chain_id                  INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS logs (
                log_id             TEXT PRIMARY KEY,
                log_sort_key       INTEGER NOT NULL,
                address            TEXT    NOT NULL,
                data               TEXT    NOT NULL,
                topic0             TEXT,
                topic1             TEXT,
                topic2             TEXT,
                topic3             TEXT,
                block_hash         TEXT    NOT NULL,
                block_number       INTEGER NOT NULL,
                block_timestamp    INTEGER,
                log_index          INTEGER NOT NULL,
                transaction_hash   TEXT    NOT NULL,
                transaction_index  INTEGER NOT NULL,
                removed            INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_logs_block_timestamp ON logs (block_timestamp);",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_logs_topic0 ON logs (topic0);")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cached_intervals (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                contract_address     TEXT    NOT NULL,
                start_block          INTEGER NOT NULL,
                end_block            INTEGER NOT NULL,
                end_block_timestamp  INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cached_intervals_contract
             ON cached_intervals (contract_address);",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contract_calls (
                key     TEXT PRIMARY KEY,
                result  TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn insert_realtime_block(
        &self,
        chain_id: u64,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT OR IGNORE INTO blocks
             (hash, number, timestamp, gas_limit, gas_used, base_fee_per_gas, miner,
              extra_data, size, parent_hash, state_root, transactions_root,
              receipts_root, logs_bloom, total_difficulty)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&block.hash)
        .bind(block.number as i64)
        .bind(block.timestamp)
        .bind(block.gas_limit.to_string())
        .bind(block.gas_used.to_string())
        .bind(block.base_fee_per_gas.map(|v| v.to_string()))
        .bind(&block.miner)
        .bind(&block.extra_data)
        .bind(block.size)
        .bind(&block.parent_hash)
        .bind(&block.state_root)
        .bind(&block.transactions_root)
        .bind(&block.receipts_root)
        .bind(&block.logs_bloom)
        .bind(block.total_difficulty.to_string())
        .execute(&mut *tx)
        .await?;

        for transaction in transactions {
            sqlx::query(
                "INSERT OR IGNORE INTO transactions
                 (hash, nonce, \"from\", \"to\", value, input, gas, gas_price,
                  max_fee_per_gas, max_priority_fee_per_gas, block_hash,
                  block_number, transaction_index, chain_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&transaction.hash)
            .bind(transaction.nonce as i64)
            .bind(&transaction.from)
            .bind(&transaction.to)
            .bind(transaction.value.to_string())
            .bind(&transaction.input)
            .bind(transaction.gas.to_string())
            .bind(transaction.gas_price.to_string())
            .bind(transaction.max_fee_per_gas.map(|v| v.to_string()))
            .bind(transaction.max_priority_fee_per_gas.map(|v| v.to_string()))
            .bind(&transaction.block_hash)
            .bind(transaction.block_number as i64)
            .bind(transaction.transaction_index as i64)
            .bind(chain_id as i64)
            .execute(&mut *tx)
            .await?;
        }

        for log in logs {
            sqlx::query(
                "INSERT OR IGNORE INTO logs
                 (log_id, log_sort_key, address, data, topic0, topic1, topic2, topic3,
                  block_hash, block_number, block_timestamp, log_index,
                  transaction_hash, transaction_index, removed)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&log.log_id)
            .bind(log.log_sort_key)
            .bind(&log.address)
            .bind(&log.data)
            .bind(&log.topic0)
            .bind(&log.topic1)
            .bind(&log.topic2)
            .bind(&log.topic3)
            .bind(&log.block_hash)
            .bind(log.block_number as i64)
            .bind(log.block_timestamp)
            .bind(log.log_index as i64)
            .bind(&log.transaction_hash)
            .bind(log.transaction_index as i64)
            .bind(log.removed)
            .execute(&mut *tx)
            .await?;
        }

        // Rows written before this block was known carry a NULL timestamp.
        sqlx::query("UPDATE logs SET block_timestamp = ? WHERE block_hash = ?")
            .bind(block.timestamp)
            .bind(&block.hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(block = block.number, logs = logs.len(), "realtime block stored");
        Ok(())
    }

    async fn insert_log_filter_cached_ranges(
        &self,
        log_filter_keys: &[String],
        start_block: u64,
        end_block: u64,
        end_block_timestamp: i64,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for key in log_filter_keys {
            let rows = sqlx::query(
                "SELECT contract_address, start_block, end_block, end_block_timestamp
                 FROM cached_intervals WHERE contract_address = ?",
            )
            .bind(key)
            .fetch_all(&mut *tx)
            .await?;

            let mut intervals: Vec<CachedInterval> = rows.iter().map(row_to_interval).collect();
            intervals.push(CachedInterval {
                contract_address: key.clone(),
                start_block,
                end_block,
                end_block_timestamp,
            });
            let merged = merge_intervals(intervals)?;

            sqlx::query("DELETE FROM cached_intervals WHERE contract_address = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;

            for interval in merged {
                sqlx::query(
                    "INSERT INTO cached_intervals
                     (contract_address, start_block, end_block, end_block_timestamp)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&interval.contract_address)
                .bind(interval.start_block as i64)
                .bind(interval.end_block as i64)
                .bind(interval.end_block_timestamp)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        debug!(
            keys = log_filter_keys.len(),
            start_block, end_block, "cached ranges merged"
        );
        Ok(())
    }

    async fn delete_realtime_data(
        &self,
        chain_id: u64,
        from_block_number: u64,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM logs WHERE block_number >= ?")
            .bind(from_block_number as i64)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM transactions WHERE chain_id = ? AND block_number >= ?")
            .bind(chain_id as i64)
            .bind(from_block_number as i64)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM blocks WHERE number >= ?")
            .bind(from_block_number as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(chain_id, from_block_number, "realtime data rolled back");
        Ok(())
    }

    async fn get_cached_intervals(
        &self,
        contract_address: &str,
    ) -> Result<Vec<CachedInterval>, StoreError> {
        let rows = sqlx::query(
            "SELECT contract_address, start_block, end_block, end_block_timestamp
             FROM cached_intervals WHERE contract_address = ? ORDER BY start_block",
        )
        .bind(contract_address)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_interval).collect())
    }

    async fn get_block(&self, hash: &str) -> Result<Option<Block>, StoreError> {
        let row = sqlx::query("SELECT * FROM blocks WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_block).transpose()
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query("SELECT * FROM transactions WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, StoreError> {
        let mut sql = String::from(
            "SELECT * FROM logs
             WHERE address = ? COLLATE NOCASE
               AND block_timestamp > ? AND block_timestamp <= ?",
        );
        let sig_hashes = query
            .event_sig_hashes
            .as_deref()
            .filter(|hashes| !hashes.is_empty());
        if let Some(hashes) = sig_hashes {
            sql.push_str(" AND topic0 IN (");
            sql.push_str(&vec!["?"; hashes.len()].join(", "));
            sql.push(')');
        }
        sql.push_str(" ORDER BY log_sort_key");

        let mut q = sqlx::query(&sql)
            .bind(&query.contract_address)
            .bind(query.from_block_timestamp)
            .bind(query.to_block_timestamp);
        if let Some(hashes) = sig_hashes {
            for hash in hashes {
                q = q.bind(hash);
            }
        }

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_log).collect())
    }

    async fn upsert_contract_call(&self, call: &ContractCall) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO contract_calls (key, result) VALUES (?, ?)")
            .bind(&call.key)
            .bind(&call.result)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_contract_call(&self, key: &str) -> Result<Option<ContractCall>, StoreError> {
        let row = sqlx::query("SELECT key, result FROM contract_calls WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| ContractCall {
            key: r.get("key"),
            result: r.get("result"),
        }))
    }
}

// ─── Row decoding ─────────────────────────────────────────────────────────────

fn u256_column(row: &SqliteRow, column: &'static str) -> Result<U256, StoreError> {
    let raw: String = row.get(column);
    U256::from_dec_str(&raw).map_err(|_| StoreError::CorruptRow {
        field: column,
        value: raw,
    })
}

fn opt_u256_column(row: &SqliteRow, column: &'static str) -> Result<Option<U256>, StoreError> {
    let raw: Option<String> = row.get(column);
    raw.map(|value| {
        U256::from_dec_str(&value).map_err(|_| StoreError::CorruptRow {
            field: column,
            value,
        })
    })
    .transpose()
}

fn row_to_block(row: &SqliteRow) -> Result<Block, StoreError> {
    Ok(Block {
        hash: row.get("hash"),
        number: row.get::<i64, _>("number") as u64,
        timestamp: row.get("timestamp"),
        gas_limit: u256_column(row, "gas_limit")?,
        gas_used: u256_column(row, "gas_used")?,
        base_fee_per_gas: opt_u256_column(row, "base_fee_per_gas")?,
        miner: row.get("miner"),
        extra_data: row.get("extra_data"),
        size: row.get("size"),
        parent_hash: row.get("parent_hash"),
        state_root: row.get("state_root"),
        transactions_root: row.get("transactions_root"),
        receipts_root: row.get("receipts_root"),
        logs_bloom: row.get("logs_bloom"),
        total_difficulty: u256_column(row, "total_difficulty")?,
    })
}

fn row_to_transaction(row: &SqliteRow) -> Result<Transaction, StoreError> {
    Ok(Transaction {
        hash: row.get("hash"),
        nonce: row.get::<i64, _>("nonce") as u64,
        from: row.get("from"),
        to: row.get("to"),
        value: u256_column(row, "value")?,
        input: row.get("input"),
        gas: u256_column(row, "gas")?,
        gas_price: u256_column(row, "gas_price")?,
        max_fee_per_gas: opt_u256_column(row, "max_fee_per_gas")?,
        max_priority_fee_per_gas: opt_u256_column(row, "max_priority_fee_per_gas")?,
        block_hash: row.get("block_hash"),
        block_number: row.get::<i64, _>("block_number") as u64,
        transaction_index: row.get::<i64, _>("transaction_index") as u32,
        chain_id: row.get::<i64, _>("chain_id") as u64,
    })
}

fn row_to_log(row: &SqliteRow) -> Log {
    Log {
        log_id: row.get("log_id"),
        log_sort_key: row.get("log_sort_key"),
        address: row.get("address"),
        data: row.get("data"),
        topic0: row.get("topic0"),
        topic1: row.get("topic1"),
        topic2: row.get("topic2"),
        topic3: row.get("topic3"),
        block_hash: row.get("block_hash"),
        block_number: row.get::<i64, _>("block_number") as u64,
        block_timestamp: row.get("block_timestamp"),
        log_index: row.get::<i64, _>("log_index") as u32,
        transaction_hash: row.get("transaction_hash"),
        transaction_index: row.get::<i64, _>("transaction_index") as u32,
        removed: row.get("removed"),
    }
}

fn row_to_interval(row: &SqliteRow) -> CachedInterval {
    CachedInterval {
        contract_address: row.get("contract_address"),
        start_block: row.get::<i64, _>("start_block") as u64,
        end_block: row.get::<i64, _>("end_block") as u64,
        end_block_timestamp: row.get("end_block_timestamp"),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
