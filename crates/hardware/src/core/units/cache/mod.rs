//! Set-Associative Tag Array.
//!
//! This module implements the storage side of a cache level: a grid of block frames
//! indexed by `(set, way)`, each holding a tag, a coherence state and the block's data
//! words. Victim selection is delegated to a configurable replacement policy.
//! Coherence decisions live in the memory system; the tag array only stores and finds.

/// Cache replacement policy implementations (FIFO, LRU, Random).
pub mod policies;

use serde::{Deserialize, Serialize};

use self::policies::ReplacementPolicy;
use crate::common::addr::Geometry;
use crate::config::ReplacementPolicy as PolicyType;

/// NMOESI state of a cached block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlockState {
    /// No valid copy.
    #[default]
    Invalid,
    /// Modified by a non-coherent store; written back like dirty data.
    NonCoherent,
    /// Dirty and the only copy.
    Modified,
    /// Dirty, possibly shared; this copy must be written back.
    Owned,
    /// Clean and the only copy.
    Exclusive,
    /// Clean, possibly shared.
    Shared,
}

impl BlockState {
    /// Returns true for every state except `Invalid`.
    #[inline]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Returns true if the copy differs from the level below.
    #[inline]
    pub const fn is_dirty(self) -> bool {
        matches!(self, Self::Modified | Self::Owned | Self::NonCoherent)
    }

    /// Returns true for the states granting exclusive rights (M, E).
    #[inline]
    pub const fn is_exclusive(self) -> bool {
        matches!(self, Self::Modified | Self::Exclusive)
    }

    /// One-letter name used in diagnostics.
    pub const fn letter(self) -> char {
        match self {
            Self::Invalid => 'I',
            Self::NonCoherent => 'N',
            Self::Modified => 'M',
            Self::Owned => 'O',
            Self::Exclusive => 'E',
            Self::Shared => 'S',
        }
    }
}

/// Position of a block frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot {
    /// Set index.
    pub set: usize,
    /// Way index.
    pub way: usize,
}

/// One block frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheBlock {
    /// Block-aligned address of the resident block.
    pub tag: u64,
    /// Coherence state of the resident block.
    pub state: BlockState,
    /// Block being brought into this frame while the resident one is evicted.
    pub transient: Option<u64>,
    /// The resident block has been sent down by an eviction that is not yet acknowledged.
    /// Its copy is already invalid; the frame stays locked until the acknowledgement.
    pub evicting: bool,
    /// Data words.
    pub data: Vec<u64>,
}

/// Set-associative array of block frames with a replacement policy.
#[derive(Debug)]
pub struct TagArray {
    geometry: Geometry,
    blocks: Vec<CacheBlock>,
    policy: Box<dyn ReplacementPolicy + Send + Sync>,
}

impl TagArray {
    /// Creates an empty tag array.
    ///
    /// # Arguments
    ///
    /// * `geometry` - Block size, sets and ways.
    /// * `policy` - Replacement policy to build.
    /// * `seed` - Seed for randomized policies.
    ///
    /// # Returns
    ///
    /// A tag array with every frame `Invalid` and zeroed data.
    pub fn new(geometry: Geometry, policy: PolicyType, seed: u64) -> Self {
        let empty = CacheBlock {
            tag: 0,
            state: BlockState::Invalid,
            transient: None,
            evicting: false,
            data: vec![0; geometry.words_per_block()],
        };
        Self {
            geometry,
            blocks: vec![empty; geometry.capacity()],
            policy: policies::build(policy, geometry.num_sets, geometry.num_ways, seed),
        }
    }

    /// Geometry of the array.
    #[inline]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    const fn index(&self, slot: Slot) -> usize {
        slot.set * self.geometry.num_ways + slot.way
    }

    /// Returns the frame at `slot`.
    #[inline]
    pub fn block(&self, slot: Slot) -> &CacheBlock {
        &self.blocks[self.index(slot)]
    }

    /// Returns the frame at `slot` mutably.
    #[inline]
    pub fn block_mut(&mut self, slot: Slot) -> &mut CacheBlock {
        let i = self.index(slot);
        &mut self.blocks[i]
    }

    /// Finds the frame holding a valid copy of `block`.
    pub fn find(&self, block: u64) -> Option<Slot> {
        let set = self.geometry.set_of(block);
        (0..self.geometry.num_ways)
            .map(|way| Slot { set, way })
            .find(|&s| {
                let b = self.block(s);
                b.state.is_valid() && b.tag == block
            })
    }

    /// Finds the frame that `block` is currently being brought into.
    pub fn find_transient(&self, block: u64) -> Option<Slot> {
        let set = self.geometry.set_of(block);
        (0..self.geometry.num_ways)
            .map(|way| Slot { set, way })
            .find(|&s| self.block(s).transient == Some(block))
    }

    /// Finds the frame `block` is being evicted from.
    pub fn find_evicting(&self, block: u64) -> Option<Slot> {
        let set = self.geometry.set_of(block);
        (0..self.geometry.num_ways)
            .map(|way| Slot { set, way })
            .find(|&s| {
                let b = self.block(s);
                b.evicting && b.tag == block
            })
    }

    /// Returns the state of `block` in `slot`, or `Invalid` if another block is resident.
    pub fn state_in(&self, slot: Slot, block: u64) -> BlockState {
        let b = self.block(slot);
        if b.tag == block { b.state } else { BlockState::Invalid }
    }

    /// Chooses the frame to receive `block`.
    ///
    /// A free frame (invalid, not reserved, not busy) is preferred; otherwise the
    /// replacement policy decides, even if its choice is busy.
    ///
    /// # Arguments
    ///
    /// * `block` - Block-aligned address being allocated.
    /// * `busy` - Reports frames that are locked by an in-flight transaction.
    pub fn choose_victim(&mut self, block: u64, busy: impl Fn(Slot) -> bool) -> Slot {
        let set = self.geometry.set_of(block);
        let free = (0..self.geometry.num_ways)
            .map(|way| Slot { set, way })
            .find(|&s| {
                let b = self.block(s);
                !b.state.is_valid() && b.transient.is_none() && !busy(s)
            });
        free.unwrap_or_else(|| Slot {
            set,
            way: self.policy.victim(set),
        })
    }

    /// Records an access to `slot` with the replacement policy.
    #[inline]
    pub fn touch(&mut self, slot: Slot) {
        self.policy.touch(slot.set, slot.way);
    }

    /// Records a fill of `slot` with the replacement policy.
    #[inline]
    pub fn fill(&mut self, slot: Slot) {
        self.policy.fill(slot.set, slot.way);
    }

    /// Iterates every frame with its position.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &CacheBlock)> + '_ {
        let ways = self.geometry.num_ways;
        self.blocks.iter().enumerate().map(move |(i, b)| {
            (
                Slot {
                    set: i / ways,
                    way: i % ways,
                },
                b,
            )
        })
    }
}
