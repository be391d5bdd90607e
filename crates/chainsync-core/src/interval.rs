//! Cached interval bookkeeping — contiguous, fully-indexed block ranges
//! persisted per log filter.
//!
//! For any one contract address the stored set is pairwise non-overlapping
//! and non-adjacent: intervals `[a,b]` and `[c,d]` with
//! `max(a,c) <= min(b,d) + 1` must be merged into `[min(a,c), max(b,d)]`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A contiguous, fully-indexed block range for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedInterval {
    pub contract_address: String,
    pub start_block: u64,
    pub end_block: u64,
    /// Timestamp of the block at `end_block`.
    pub end_block_timestamp: i64,
}

impl CachedInterval {
    /// Returns `true` if `self` and `other` overlap or are adjacent.
    pub fn merges_with(&self, other: &CachedInterval) -> bool {
        self.start_block.max(other.start_block) <= self.end_block.min(other.end_block) + 1
    }
}

/// The merged set would have an endpoint no contributing interval ends at,
/// which means the stored timestamps can no longer be trusted.
#[derive(Debug, Error)]
#[error("no contributing interval ends at merged endpoint {end_block} for {contract_address}")]
pub struct IntervalCorruption {
    pub contract_address: String,
    pub end_block: u64,
}

/// Merge a set of intervals for one contract into the minimal
/// non-overlapping, non-adjacent set.
///
/// The surviving `end_block_timestamp` of each merged interval is taken
/// from the contributor whose `end_block` equals the merged end.
pub fn merge_intervals(
    mut intervals: Vec<CachedInterval>,
) -> Result<Vec<CachedInterval>, IntervalCorruption> {
    intervals.sort_by_key(|i| (i.start_block, i.end_block));

    let mut merged = Vec::new();
    let mut group: Vec<CachedInterval> = Vec::new();
    let mut group_end: u64 = 0;
    for interval in intervals {
        if !group.is_empty() && interval.start_block > group_end + 1 {
            merged.push(collapse(std::mem::take(&mut group))?);
        }
        group_end = if group.is_empty() {
            interval.end_block
        } else {
            group_end.max(interval.end_block)
        };
        group.push(interval);
    }
    if !group.is_empty() {
        merged.push(collapse(group)?);
    }
    Ok(merged)
}

/// Collapse one group of overlapping/adjacent intervals into a single one.
fn collapse(group: Vec<CachedInterval>) -> Result<CachedInterval, IntervalCorruption> {
    let contract_address = group
        .first()
        .map(|i| i.contract_address.clone())
        .unwrap_or_default();
    let start_block = group.iter().map(|i| i.start_block).min().unwrap_or(0);
    let end_block = group.iter().map(|i| i.end_block).max().unwrap_or(0);
    let source = group
        .iter()
        .find(|i| i.end_block == end_block)
        .ok_or(IntervalCorruption {
            contract_address: contract_address.clone(),
            end_block,
        })?;
    Ok(CachedInterval {
        contract_address,
        start_block,
        end_block,
        end_block_timestamp: source.end_block_timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(start: u64, end: u64, timestamp: i64) -> CachedInterval {
        CachedInterval {
            contract_address: "0xc".into(),
            start_block: start,
            end_block: end,
            end_block_timestamp: timestamp,
        }
    }

    #[test]
    fn overlapping_and_adjacent_merge() {
        // [10,20] + [20,35] + [30,40] collapse to [10,40]
        let merged = merge_intervals(vec![
            interval(10, 20, 200),
            interval(30, 40, 400),
            interval(20, 35, 350),
        ])
        .unwrap();
        assert_eq!(merged, vec![interval(10, 40, 400)]);

        // then [41,50] is adjacent to [10,40]
        let merged = merge_intervals(vec![interval(10, 40, 400), interval(41, 50, 500)]).unwrap();
        assert_eq!(merged, vec![interval(10, 50, 500)]);
    }

    #[test]
    fn disjoint_intervals_are_preserved() {
        let merged =
            merge_intervals(vec![interval(30, 40, 400), interval(10, 20, 200)]).unwrap();
        assert_eq!(merged, vec![interval(10, 20, 200), interval(30, 40, 400)]);
    }

    #[test]
    fn merge_is_order_independent() {
        let a = merge_intervals(vec![
            interval(10, 20, 200),
            interval(15, 30, 300),
            interval(50, 60, 600),
        ])
        .unwrap();
        let b = merge_intervals(vec![
            interval(50, 60, 600),
            interval(15, 30, 300),
            interval(10, 20, 200),
        ])
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reapplying_covered_range_is_noop() {
        let existing = vec![interval(10, 50, 500)];
        let merged = merge_intervals(
            existing
                .iter()
                .cloned()
                .chain(std::iter::once(interval(20, 30, 300)))
                .collect(),
        )
        .unwrap();
        assert_eq!(merged, existing);
    }

    #[test]
    fn contained_interval_keeps_outer_timestamp() {
        let merged =
            merge_intervals(vec![interval(10, 50, 500), interval(40, 50, 999)]).unwrap();
        // both end at 50; the timestamp must come from an interval ending at 50
        assert_eq!(merged[0].start_block, 10);
        assert_eq!(merged[0].end_block, 50);
    }

    #[test]
    fn merges_with_adjacency_rule() {
        assert!(interval(10, 20, 0).merges_with(&interval(21, 30, 0)));
        assert!(!interval(10, 20, 0).merges_with(&interval(22, 30, 0)));
        assert!(interval(10, 20, 0).merges_with(&interval(15, 30, 0)));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(merge_intervals(vec![]).unwrap().is_empty());
    }
}
