//! Least Recently Used (LRU) Replacement Policy.
//!
//! This policy evicts the block that has not been accessed for the longest time.
//! It maintains a usage stack for each set. When a way is accessed or filled, it is
//! moved to the top (Most Recently Used position). The bottom of the stack represents
//! the Least Recently Used way.
//!
//! # Performance
//!
//! - **Time Complexity:**
//!   - `touch()`: O(W) where W is the number of ways (associativity)
//!   - `victim()`: O(1)
//! - **Space Complexity:** O(S × W) where S is the number of sets

use super::ReplacementPolicy;

/// LRU Policy state.
#[derive(Debug)]
pub struct LruPolicy {
    /// A vector of usage stacks (one per set).
    /// Index 0 is MRU, last index is LRU.
    usage: Vec<Vec<usize>>,
}

impl LruPolicy {
    /// Creates a new LRU policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets.
    /// * `ways` - The associativity (number of ways).
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            usage: (0..sets).map(|_| (0..ways).collect()).collect(),
        }
    }
}

impl ReplacementPolicy for LruPolicy {
    /// Moves the accessed `way` to the MRU position, shifting the others down.
    fn touch(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        if let Some(pos) = stack.iter().position(|&x| x == way) {
            let _ = stack.remove(pos);
        }
        stack.insert(0, way);
    }

    /// Returns the way at the bottom of the usage stack (LRU position).
    fn victim(&mut self, set: usize) -> usize {
        self.usage[set].last().copied().unwrap_or(0)
    }
}
