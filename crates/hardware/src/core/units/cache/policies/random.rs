//! Random Replacement Policy.
//!
//! This policy evicts a pseudo-random way from the set. The generator is seeded from the
//! simulation seed, so victim choices repeat exactly across runs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::ReplacementPolicy;

/// Random Policy state.
#[derive(Debug)]
pub struct RandomPolicy {
    /// Number of ways.
    ways: usize,
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    /// Creates a new Random policy instance.
    ///
    /// # Arguments
    ///
    /// * `ways` - The associativity (number of ways).
    /// * `seed` - Generator seed.
    pub fn new(ways: usize, seed: u64) -> Self {
        Self {
            ways,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl ReplacementPolicy for RandomPolicy {
    /// Access patterns do not affect the state.
    fn touch(&mut self, _set: usize, _way: usize) {}

    fn victim(&mut self, _set: usize) -> usize {
        self.rng.gen_range(0..self.ways)
    }
}
