//! Shared data model for the realtime sync pipeline.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

// ─── BlockHeader ──────────────────────────────────────────────────────────────

/// A minimal block header — what the realtime service keeps in memory for
/// the unfinalized suffix of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block hash (`0x…`).
    pub hash: String,
    /// Block number.
    pub number: u64,
    /// Parent block hash (`0x…`).
    pub parent_hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
    /// 2048-bit logs bloom, hex-encoded (`0x…`).
    pub logs_bloom: String,
}

impl BlockHeader {
    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &BlockHeader) -> bool {
        self.number == parent.number + 1 && self.parent_hash == parent.hash
    }
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// A full block as persisted to the event store when it carries at least
/// one matched log.
///
/// Quantities that can exceed `2^63 - 1` are held as [`U256`] and persisted
/// as decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    pub number: u64,
    pub timestamp: i64,
    pub gas_limit: U256,
    pub gas_used: U256,
    /// Absent on pre-London blocks; stored as SQL NULL.
    pub base_fee_per_gas: Option<U256>,
    pub miner: String,
    pub extra_data: String,
    pub size: i64,
    pub parent_hash: String,
    pub state_root: String,
    pub transactions_root: String,
    pub receipts_root: String,
    pub logs_bloom: String,
    pub total_difficulty: U256,
}

impl Block {
    /// The light form kept on the local chain.
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            hash: self.hash.clone(),
            number: self.number,
            parent_hash: self.parent_hash.clone(),
            timestamp: self.timestamp,
            logs_bloom: self.logs_bloom.clone(),
        }
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A transaction row — persisted only when referenced by a matched log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub nonce: u64,
    pub from: String,
    /// `None` for contract-creation transactions; stored as SQL NULL.
    pub to: Option<String>,
    pub value: U256,
    pub input: String,
    pub gas: U256,
    pub gas_price: U256,
    /// `None` on pre-EIP-1559 transactions; stored as SQL NULL.
    pub max_fee_per_gas: Option<U256>,
    /// `None` on pre-EIP-1559 transactions; stored as SQL NULL.
    pub max_priority_fee_per_gas: Option<U256>,
    pub block_hash: String,
    pub block_number: u64,
    pub transaction_index: u32,
    /// Stamped from network configuration on the write path.
    pub chain_id: u64,
}

// ─── Log ──────────────────────────────────────────────────────────────────────

/// An event log row. Primary key is [`Log::log_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// `"{block_hash}-{log_index}"`.
    pub log_id: String,
    /// `block_number * 100_000 + log_index` — a stable total order across
    /// blocks.
    pub log_sort_key: i64,
    pub address: String,
    pub data: String,
    pub topic0: Option<String>,
    pub topic1: Option<String>,
    pub topic2: Option<String>,
    pub topic3: Option<String>,
    pub block_hash: String,
    pub block_number: u64,
    /// `None` until the enclosing block has been observed.
    pub block_timestamp: Option<i64>,
    pub log_index: u32,
    pub transaction_hash: String,
    pub transaction_index: u32,
    pub removed: bool,
}

impl Log {
    /// The topic at `position` (0–3), if present.
    pub fn topic(&self, position: usize) -> Option<&str> {
        match position {
            0 => self.topic0.as_deref(),
            1 => self.topic1.as_deref(),
            2 => self.topic2.as_deref(),
            3 => self.topic3.as_deref(),
            _ => None,
        }
    }
}

// ─── ContractCall ─────────────────────────────────────────────────────────────

/// Opaque memoization entry for a read-only contract call performed by a
/// downstream handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub key: String,
    pub result: String,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
