//! Exact log filtering against configured address and topic patterns.

use serde::{Deserialize, Serialize};

use crate::types::Log;

/// Which logs a sync instance cares about: one contract address plus up to
/// four topic constraints.
///
/// A `None` topic position matches anything; a `Some` position matches if
/// the log's topic at that position is in the allowed set. Hex comparisons
/// are case-insensitive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogFilterSpec {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<Option<Vec<String>>>,
    /// Stop indexing past this block (`None` = live forever).
    #[serde(default)]
    pub end_block: Option<u64>,
}

impl LogFilterSpec {
    /// Create a filter for a single contract address.
    pub fn address(addr: impl Into<String>) -> Self {
        Self {
            address: addr.into(),
            ..Default::default()
        }
    }

    /// Constrain topic0 (the event signature hash) to the given values.
    pub fn topic0(self, allowed: Vec<String>) -> Self {
        self.topic(0, allowed)
    }

    /// Constrain topic1 to the given values.
    pub fn topic1(self, allowed: Vec<String>) -> Self {
        self.topic(1, allowed)
    }

    /// Constrain topic2 to the given values.
    pub fn topic2(self, allowed: Vec<String>) -> Self {
        self.topic(2, allowed)
    }

    /// Constrain topic3 to the given values.
    pub fn topic3(self, allowed: Vec<String>) -> Self {
        self.topic(3, allowed)
    }

    /// Set the end block.
    pub fn end_block(mut self, block: u64) -> Self {
        self.end_block = Some(block);
        self
    }

    fn topic(mut self, position: usize, allowed: Vec<String>) -> Self {
        while self.topics.len() <= position {
            self.topics.push(None);
        }
        self.topics[position] = Some(allowed);
        self
    }

    /// Returns `true` if `log` matches this filter.
    pub fn matches(&self, log: &Log) -> bool {
        if !self.address.is_empty() && !log.address.eq_ignore_ascii_case(&self.address) {
            return false;
        }
        for (position, allowed) in self.topics.iter().enumerate() {
            let Some(allowed) = allowed else { continue };
            if allowed.is_empty() {
                continue;
            }
            match log.topic(position) {
                Some(value) => {
                    if !allowed.iter().any(|t| t.eq_ignore_ascii_case(value)) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}

/// Keep the logs matched by any of `filters`, preserving input order.
pub fn filter_logs(logs: Vec<Log>, filters: &[LogFilterSpec]) -> Vec<Log> {
    logs.into_iter()
        .filter(|log| filters.iter().any(|f| f.matches(log)))
        .collect()
}
