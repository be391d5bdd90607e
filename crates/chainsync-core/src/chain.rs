//! The local chain — an in-memory view of the unfinalized suffix of the
//! canonical chain.
//!
//! Invariants maintained here:
//! - block numbers are strictly increasing;
//! - every consecutive pair is linked by `parent_hash`;
//! - the first element sits at the finality checkpoint.
//!
//! Entries are appended on new-head observations, truncated from the back
//! on reorg reconciliation, and pruned from the front on finality
//! advancement.

use std::collections::VecDeque;

use thiserror::Error;

use crate::types::BlockHeader;

/// Returned when an appended block does not link to the current head.
#[derive(Debug, Error)]
#[error("block {number} ({hash}) does not extend the local chain head")]
pub struct BrokenLink {
    pub number: u64,
    pub hash: String,
}

/// Ordered sequence of light blocks from the finalized block to the head.
#[derive(Debug, Default)]
pub struct LocalChain {
    blocks: VecDeque<BlockHeader>,
}

impl LocalChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the chain to a single block (the finality checkpoint).
    pub fn seed(&mut self, block: BlockHeader) {
        self.blocks.clear();
        self.blocks.push_back(block);
    }

    /// The most recent block, if any.
    pub fn head(&self) -> Option<&BlockHeader> {
        self.blocks.back()
    }

    /// The oldest retained block (the finality checkpoint).
    pub fn first(&self) -> Option<&BlockHeader> {
        self.blocks.front()
    }

    /// Returns `true` if a block with this hash is on the local chain.
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.by_hash(hash).is_some()
    }

    /// Look up a block by hash.
    pub fn by_hash(&self, hash: &str) -> Option<&BlockHeader> {
        self.blocks.iter().find(|b| b.hash == hash)
    }

    /// Look up a block by number.
    pub fn at_number(&self, number: u64) -> Option<&BlockHeader> {
        self.blocks.iter().find(|b| b.number == number)
    }

    /// Append a block to the head.
    ///
    /// The block must directly extend the current head (or the chain must
    /// be empty). A mismatch means the caller misclassified the block.
    pub fn try_append(&mut self, block: BlockHeader) -> Result<(), BrokenLink> {
        if let Some(head) = self.blocks.back() {
            if !block.extends(head) {
                return Err(BrokenLink {
                    number: block.number,
                    hash: block.hash,
                });
            }
        }
        self.blocks.push_back(block);
        Ok(())
    }

    /// Drop all blocks with a number greater than `number` (reorg path).
    pub fn truncate_to(&mut self, number: u64) {
        while let Some(back) = self.blocks.back() {
            if back.number > number {
                self.blocks.pop_back();
            } else {
                break;
            }
        }
    }

    /// Drop all blocks with a number less than `number` (finality path).
    pub fn prune_below(&mut self, number: u64) {
        while let Some(front) = self.blocks.front() {
            if front.number < number {
                self.blocks.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of retained blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no blocks are retained.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterate blocks oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &BlockHeader> {
        self.blocks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64, hash: &str, parent: &str) -> BlockHeader {
        BlockHeader {
            hash: hash.into(),
            number,
            parent_hash: parent.into(),
            timestamp: (number * 12) as i64,
            logs_bloom: "0x".into(),
        }
    }

    fn linked_chain(from: u64, to: u64) -> LocalChain {
        let mut chain = LocalChain::new();
        chain.seed(header(from, &format!("0x{from}"), &format!("0x{}", from - 1)));
        for n in from + 1..=to {
            chain
                .try_append(header(n, &format!("0x{n}"), &format!("0x{}", n - 1)))
                .unwrap();
        }
        chain
    }

    #[test]
    fn append_linked_blocks() {
        let chain = linked_chain(100, 105);
        assert_eq!(chain.len(), 6);
        assert_eq!(chain.head().unwrap().number, 105);
        assert_eq!(chain.first().unwrap().number, 100);
    }

    #[test]
    fn append_rejects_broken_link() {
        let mut chain = linked_chain(100, 101);
        let err = chain.try_append(header(102, "0x102", "0xsomething-else"));
        assert!(err.is_err());
        assert_eq!(chain.head().unwrap().number, 101);
    }

    #[test]
    fn seed_resets_chain() {
        let mut chain = linked_chain(100, 105);
        chain.seed(header(200, "0x200", "0x199"));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.first().unwrap().number, 200);
    }

    #[test]
    fn truncate_drops_newer_blocks() {
        let mut chain = linked_chain(100, 110);
        chain.truncate_to(105);
        assert_eq!(chain.head().unwrap().number, 105);
        assert_eq!(chain.len(), 6);
    }

    #[test]
    fn prune_drops_older_blocks() {
        let mut chain = linked_chain(100, 110);
        chain.prune_below(107);
        assert_eq!(chain.first().unwrap().number, 107);
        assert_eq!(chain.head().unwrap().number, 110);
    }

    #[test]
    fn lookup_by_hash_and_number() {
        let chain = linked_chain(100, 103);
        assert!(chain.contains_hash("0x102"));
        assert!(!chain.contains_hash("0x999"));
        assert_eq!(chain.by_hash("0x101").unwrap().number, 101);
        assert_eq!(chain.at_number(103).unwrap().hash, "0x103");
    }
}
