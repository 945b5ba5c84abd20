//! Address geometry.
//!
//! Caches, directories and main memory all index blocks the same way: a byte address is
//! aligned down to its block, the block number selects a set, and the offset within the
//! block selects a data word. `Geometry` captures that decomposition for one module.

use super::constants::WORD_BYTES;

/// Simulated clock cycle.
pub type Cycle = u64;

/// Block/set/word decomposition for one set-associative structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    /// Block size in bytes (power of two).
    pub block_size: u64,
    /// Number of sets (power of two).
    pub num_sets: usize,
    /// Associativity.
    pub num_ways: usize,
    block_shift: u32,
}

impl Geometry {
    /// Creates a geometry from already validated parameters.
    ///
    /// # Arguments
    ///
    /// * `block_size` - Block size in bytes; must be a power of two.
    /// * `num_sets` - Number of sets; must be a power of two.
    /// * `num_ways` - Ways per set.
    pub const fn new(block_size: u64, num_sets: usize, num_ways: usize) -> Self {
        Self {
            block_size,
            num_sets,
            num_ways,
            block_shift: block_size.trailing_zeros(),
        }
    }

    /// Aligns a byte address down to the start of its block.
    #[inline]
    pub const fn block_of(&self, addr: u64) -> u64 {
        addr & !(self.block_size - 1)
    }

    /// Returns the set index an address maps to.
    #[inline]
    pub const fn set_of(&self, addr: u64) -> usize {
        ((addr >> self.block_shift) as usize) & (self.num_sets - 1)
    }

    /// Returns the index of the word containing `addr` within its block.
    #[inline]
    pub const fn word_of(&self, addr: u64) -> usize {
        ((addr & (self.block_size - 1)) / WORD_BYTES) as usize
    }

    /// Number of data words per block.
    #[inline]
    pub const fn words_per_block(&self) -> usize {
        (self.block_size / WORD_BYTES) as usize
    }

    /// Total number of block frames.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.num_sets * self.num_ways
    }
}
