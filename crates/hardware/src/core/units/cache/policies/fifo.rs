//! First-In, First-Out (FIFO) Replacement Policy.
//!
//! This policy evicts the block that was installed earliest in a set, regardless of how
//! recently it was accessed. Each set keeps a fill-order queue; hits do not reorder it.

use std::collections::VecDeque;

use super::ReplacementPolicy;

/// FIFO Policy state.
#[derive(Debug)]
pub struct FifoPolicy {
    /// Fill order per set; the front is the oldest way.
    order: Vec<VecDeque<usize>>,
}

impl FifoPolicy {
    /// Creates a new FIFO policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets.
    /// * `ways` - The associativity (number of ways).
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            order: (0..sets).map(|_| (0..ways).collect()).collect(),
        }
    }
}

impl ReplacementPolicy for FifoPolicy {
    /// Accesses do not change insertion order.
    fn touch(&mut self, _set: usize, _way: usize) {}

    /// Moves the filled way to the back of the queue (youngest).
    fn fill(&mut self, set: usize, way: usize) {
        let queue = &mut self.order[set];
        if let Some(pos) = queue.iter().position(|&w| w == way) {
            let _ = queue.remove(pos);
        }
        queue.push_back(way);
    }

    /// Returns the oldest way of the set.
    fn victim(&mut self, set: usize) -> usize {
        self.order[set].front().copied().unwrap_or(0)
    }
}
