//! Backing store behind main memory.
//!
//! Holds the contents of every block that has ever been written back. Blocks that were
//! never written read as zero, so arbitrarily large address spaces cost nothing up front.

use std::collections::BTreeMap;

/// Sparse block-granular storage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackingStore {
    blocks: BTreeMap<u64, Vec<u64>>,
}

impl BackingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a block, zero-filled if never written.
    ///
    /// # Arguments
    ///
    /// * `block` - Block-aligned address.
    /// * `words` - Words per block.
    pub fn read(&self, block: u64, words: usize) -> Vec<u64> {
        self.blocks
            .get(&block)
            .cloned()
            .unwrap_or_else(|| vec![0; words])
    }

    /// Writes a whole block.
    pub fn write(&mut self, block: u64, data: Vec<u64>) {
        let _ = self.blocks.insert(block, data);
    }

    /// Reads one word without timing, used by inspection and oracles.
    pub fn peek_word(&self, block: u64, word: usize) -> u64 {
        self.blocks
            .get(&block)
            .and_then(|d| d.get(word).copied())
            .unwrap_or(0)
    }

    /// Number of blocks ever written.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if nothing was ever written.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterates stored blocks in address order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u64])> + '_ {
        self.blocks.iter().map(|(&b, d)| (b, d.as_slice()))
    }
}
