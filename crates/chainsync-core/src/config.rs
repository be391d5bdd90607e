//! Runtime configuration for a sync instance.

use serde::{Deserialize, Serialize};

use crate::filter::LogFilterSpec;

/// Per-network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Chain id stamped onto persisted rows.
    pub chain_id: u64,
    /// Head polling cadence in milliseconds.
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    /// Depth beyond which a block is treated as final.
    /// Typical values: 12 (Ethereum PoS), 64 (Ethereum safe), 1 (fast chains).
    #[serde(default = "default_finality_block_count")]
    pub finality_block_count: u64,
}

fn default_polling_interval_ms() -> u64 {
    1_000
}

fn default_finality_block_count() -> u64 {
    12
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            polling_interval_ms: default_polling_interval_ms(),
            finality_block_count: default_finality_block_count(),
        }
    }
}

/// One log filter plus the key its cached intervals are stored under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFilterConfig {
    pub key: String,
    pub filter: LogFilterSpec,
}

impl LogFilterConfig {
    pub fn new(key: impl Into<String>, filter: LogFilterSpec) -> Self {
        Self {
            key: key.into(),
            filter,
        }
    }
}
