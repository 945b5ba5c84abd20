//! Cache Replacement Policies.
//!
//! Implements the algorithms for selecting victim blocks in set-associative structures.
//!
//! # Policies
//!
//! - `Fifo`: First-In, First-Out.
//! - `Lru`: Least Recently Used.
//! - `Random`: Seeded pseudo-random selection.

/// First-In, First-Out replacement policy.
pub mod fifo;

/// Least Recently Used replacement policy.
pub mod lru;

/// Random replacement policy.
pub mod random;

pub use fifo::FifoPolicy;
pub use lru::LruPolicy;
pub use random::RandomPolicy;

use std::fmt;

use crate::config::ReplacementPolicy as PolicyType;

/// Trait for cache replacement policies.
///
/// Defines the interface for updating usage state and selecting victim ways.
pub trait ReplacementPolicy: fmt::Debug + Send + Sync {
    /// Updates the policy state when a way is accessed.
    ///
    /// # Arguments
    ///
    /// * `set` - The set index.
    /// * `way` - The way index within the set that was accessed.
    fn touch(&mut self, set: usize, way: usize);

    /// Updates the policy state when a new block is installed in a way.
    ///
    /// Defaults to `touch`; insertion-ordered policies override it.
    fn fill(&mut self, set: usize, way: usize) {
        self.touch(set, way);
    }

    /// Selects a victim way to evict from a specific set.
    ///
    /// # Arguments
    ///
    /// * `set` - The set index.
    ///
    /// # Returns
    ///
    /// The index of the way to evict.
    fn victim(&mut self, set: usize) -> usize;
}

/// Builds the policy selected in the configuration.
///
/// # Arguments
///
/// * `kind` - Configured policy.
/// * `sets` - Number of sets.
/// * `ways` - Associativity.
/// * `seed` - Seed for randomized policies.
pub fn build(
    kind: PolicyType,
    sets: usize,
    ways: usize,
    seed: u64,
) -> Box<dyn ReplacementPolicy + Send + Sync> {
    match kind {
        PolicyType::Lru => Box::new(LruPolicy::new(sets, ways)),
        PolicyType::Fifo => Box::new(FifoPolicy::new(sets, ways)),
        PolicyType::Random => Box::new(RandomPolicy::new(ways, seed)),
    }
}
