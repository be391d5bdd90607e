//! Typed `eth_*` response models and their conversions into store rows.
//!
//! Quantities arrive hex-encoded; `number`, `timestamp`, and the various
//! indexes decode to native integers, while opaque fields (hashes, bloom,
//! topics, calldata) stay hex strings. Fields that can exceed `2^63 - 1`
//! decode to [`U256`].

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use chainsync_core::types::{Block, BlockHeader, Log, Transaction};

use crate::error::RpcError;

/// Parse a `0x`-prefixed hex quantity into a `u64`.
pub fn parse_hex_u64(field: &'static str, raw: &str) -> Result<u64, RpcError> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).map_err(|_| RpcError::InvalidQuantity {
        field,
        value: raw.to_string(),
    })
}

/// Parse a `0x`-prefixed hex quantity into a [`U256`], losslessly.
pub fn parse_hex_u256(field: &'static str, raw: &str) -> Result<U256, RpcError> {
    U256::from_str_radix(raw.trim_start_matches("0x"), 16).map_err(|_| {
        RpcError::InvalidQuantity {
            field,
            value: raw.to_string(),
        }
    })
}

fn parse_opt_u256(field: &'static str, raw: Option<&String>) -> Result<Option<U256>, RpcError> {
    raw.map(|value| parse_hex_u256(field, value)).transpose()
}

// ─── RpcBlock ─────────────────────────────────────────────────────────────────

/// Transaction list of a block response: full objects when the block was
/// requested with transactions, hashes otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockTransactions {
    Full(Vec<RpcTransaction>),
    Hashes(Vec<String>),
}

impl Default for BlockTransactions {
    fn default() -> Self {
        Self::Hashes(Vec::new())
    }
}

/// A block as returned by `eth_getBlockByNumber` / `eth_getBlockByHash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub hash: String,
    pub number: String,
    pub parent_hash: String,
    pub timestamp: String,
    pub logs_bloom: String,
    pub gas_limit: String,
    pub gas_used: String,
    #[serde(default)]
    pub base_fee_per_gas: Option<String>,
    pub miner: String,
    pub extra_data: String,
    pub size: String,
    pub state_root: String,
    pub transactions_root: String,
    pub receipts_root: String,
    #[serde(default)]
    pub total_difficulty: Option<String>,
    #[serde(default)]
    pub transactions: BlockTransactions,
}

impl RpcBlock {
    /// The block number, decoded.
    pub fn number(&self) -> Result<u64, RpcError> {
        parse_hex_u64("number", &self.number)
    }

    /// The light form kept on the local chain.
    pub fn to_header(&self) -> Result<BlockHeader, RpcError> {
        Ok(BlockHeader {
            hash: self.hash.clone(),
            number: self.number()?,
            parent_hash: self.parent_hash.clone(),
            timestamp: parse_hex_u64("timestamp", &self.timestamp)? as i64,
            logs_bloom: self.logs_bloom.clone(),
        })
    }

    /// The full store row.
    pub fn to_block(&self) -> Result<Block, RpcError> {
        Ok(Block {
            hash: self.hash.clone(),
            number: self.number()?,
            timestamp: parse_hex_u64("timestamp", &self.timestamp)? as i64,
            gas_limit: parse_hex_u256("gasLimit", &self.gas_limit)?,
            gas_used: parse_hex_u256("gasUsed", &self.gas_used)?,
            base_fee_per_gas: parse_opt_u256("baseFeePerGas", self.base_fee_per_gas.as_ref())?,
            miner: self.miner.clone(),
            extra_data: self.extra_data.clone(),
            size: parse_hex_u64("size", &self.size)? as i64,
            parent_hash: self.parent_hash.clone(),
            state_root: self.state_root.clone(),
            transactions_root: self.transactions_root.clone(),
            receipts_root: self.receipts_root.clone(),
            logs_bloom: self.logs_bloom.clone(),
            // Post-merge endpoints may omit totalDifficulty.
            total_difficulty: parse_opt_u256(
                "totalDifficulty",
                self.total_difficulty.as_ref(),
            )?
            .unwrap_or_else(U256::zero),
        })
    }

    /// Full transaction objects, or an empty slice if the block was
    /// fetched without transactions.
    pub fn full_transactions(&self) -> &[RpcTransaction] {
        match &self.transactions {
            BlockTransactions::Full(transactions) => transactions,
            BlockTransactions::Hashes(_) => &[],
        }
    }
}

// ─── RpcTransaction ───────────────────────────────────────────────────────────

/// A transaction as embedded in a full block response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: String,
    pub nonce: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
    pub input: String,
    pub gas: String,
    #[serde(default)]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub max_fee_per_gas: Option<String>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<String>,
    pub block_hash: String,
    pub block_number: String,
    pub transaction_index: String,
}

impl RpcTransaction {
    /// Convert into a store row, stamping the configured chain id.
    pub fn to_transaction(&self, chain_id: u64) -> Result<Transaction, RpcError> {
        Ok(Transaction {
            hash: self.hash.clone(),
            nonce: parse_hex_u64("nonce", &self.nonce)?,
            from: self.from.clone(),
            to: self.to.clone(),
            value: parse_hex_u256("value", &self.value)?,
            input: self.input.clone(),
            gas: parse_hex_u256("gas", &self.gas)?,
            // Nodes report the effective gas price for EIP-1559
            // transactions; fall back to the fee cap if it is missing.
            gas_price: parse_opt_u256("gasPrice", self.gas_price.as_ref())?
                .or(parse_opt_u256("maxFeePerGas", self.max_fee_per_gas.as_ref())?)
                .unwrap_or_else(U256::zero),
            max_fee_per_gas: parse_opt_u256("maxFeePerGas", self.max_fee_per_gas.as_ref())?,
            max_priority_fee_per_gas: parse_opt_u256(
                "maxPriorityFeePerGas",
                self.max_priority_fee_per_gas.as_ref(),
            )?,
            block_hash: self.block_hash.clone(),
            block_number: parse_hex_u64("blockNumber", &self.block_number)?,
            transaction_index: parse_hex_u64("transactionIndex", &self.transaction_index)? as u32,
            chain_id,
        })
    }
}

// ─── RpcLog ───────────────────────────────────────────────────────────────────

/// A log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_hash: String,
    pub block_number: String,
    pub transaction_hash: String,
    pub transaction_index: String,
    pub log_index: String,
    #[serde(default)]
    pub removed: bool,
}

impl RpcLog {
    /// Convert into a store row. `block_timestamp` is injected when the
    /// enclosing block is already known.
    pub fn to_log(&self, block_timestamp: Option<i64>) -> Result<Log, RpcError> {
        let block_number = parse_hex_u64("blockNumber", &self.block_number)?;
        let log_index = parse_hex_u64("logIndex", &self.log_index)? as u32;
        let topic = |i: usize| self.topics.get(i).cloned();
        Ok(Log {
            log_id: format!("{}-{}", self.block_hash, log_index),
            log_sort_key: block_number as i64 * 100_000 + log_index as i64,
            address: self.address.clone(),
            data: self.data.clone(),
            topic0: topic(0),
            topic1: topic(1),
            topic2: topic(2),
            topic3: topic(3),
            block_hash: self.block_hash.clone(),
            block_number,
            block_timestamp,
            log_index,
            transaction_hash: self.transaction_hash.clone(),
            transaction_index: parse_hex_u64("transactionIndex", &self.transaction_index)? as u32,
            removed: self.removed,
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
