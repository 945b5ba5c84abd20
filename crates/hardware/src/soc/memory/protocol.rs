//! Coherence protocol contract.
//!
//! The memory system drives requests, locks and messages; the protocol decides how block
//! states change at each step. Keeping the transition table behind a trait lets a
//! configuration bind the protocol once, and lets the table be tested on its own.

use std::fmt;

use crate::common::data::AccessKind;
use crate::core::units::cache::BlockState;

use BlockState::{Exclusive, Invalid, Modified, NonCoherent, Owned, Shared};

/// Operation carried by a request between levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReqOp {
    /// Obtain a readable copy.
    Read,
    /// Obtain exclusive rights (and data, unless the requester already holds it).
    Write,
}

/// State transitions of a directory-based coherence protocol.
pub trait CoherenceProtocol: fmt::Debug + Send + Sync {
    /// Short protocol name.
    fn name(&self) -> &'static str;

    /// Returns true if a top-level access of `kind` completes locally in `state`.
    fn satisfies(&self, state: BlockState, kind: AccessKind) -> bool;

    /// State after a top-level access that was satisfied locally.
    fn after_access(&self, state: BlockState, kind: AccessKind) -> BlockState;

    /// State after a fill from the lower level.
    ///
    /// # Arguments
    ///
    /// * `prev` - State before the fill (`Invalid` when the block was absent).
    /// * `op` - Operation that was requested.
    /// * `exclusive` - Whether the lower level granted exclusive rights.
    fn after_fill(&self, prev: BlockState, op: ReqOp, exclusive: bool) -> BlockState;

    /// State after a down-up read, plus whether the returned data is dirty.
    ///
    /// `upper_dirty` reports that a level above returned dirty data on the way.
    fn after_downgrade(&self, state: BlockState, upper_dirty: bool) -> (BlockState, bool);

    /// State after dirty data from an invalidated upper copy was merged.
    ///
    /// A shared copy can only receive dirty data from a non-coherent store above it.
    fn after_absorb(&self, state: BlockState) -> BlockState;

    /// State after receiving written-back data from above, or `None` if the write-back is
    /// impossible in `state`.
    fn after_writeback(&self, state: BlockState, non_coherent: bool) -> Option<BlockState>;

    /// State kept by a module that flushed its dirty data but keeps a copy.
    fn after_flush(&self, state: BlockState) -> BlockState;
}

/// The NMOESI protocol.
#[derive(Clone, Copy, Debug, Default)]
pub struct Nmoesi;

impl CoherenceProtocol for Nmoesi {
    fn name(&self) -> &'static str {
        "NMOESI"
    }

    fn satisfies(&self, state: BlockState, kind: AccessKind) -> bool {
        match kind {
            AccessKind::Load | AccessKind::NcStore => state.is_valid(),
            AccessKind::Store => state.is_exclusive(),
            AccessKind::Invalidate => !state.is_valid(),
            AccessKind::WriteBack => !state.is_dirty(),
        }
    }

    fn after_access(&self, state: BlockState, kind: AccessKind) -> BlockState {
        match (kind, state) {
            (AccessKind::Store, _) => Modified,
            (AccessKind::NcStore, Modified | Exclusive) => Modified,
            (AccessKind::NcStore, Owned | Shared | NonCoherent) => NonCoherent,
            _ => state,
        }
    }

    fn after_fill(&self, prev: BlockState, op: ReqOp, exclusive: bool) -> BlockState {
        match (op, exclusive) {
            (ReqOp::Read, true) => Exclusive,
            (ReqOp::Read, false) => Shared,
            (ReqOp::Write, _) => match prev {
                Owned | NonCoherent | Modified => Modified,
                _ => Exclusive,
            },
        }
    }

    fn after_downgrade(&self, state: BlockState, upper_dirty: bool) -> (BlockState, bool) {
        let dirty = upper_dirty || state.is_dirty();
        (if dirty { Owned } else { Shared }, dirty)
    }

    fn after_absorb(&self, state: BlockState) -> BlockState {
        match state {
            Exclusive => Modified,
            Shared => NonCoherent,
            other => other,
        }
    }

    fn after_writeback(&self, state: BlockState, non_coherent: bool) -> Option<BlockState> {
        match (state, non_coherent) {
            (Modified | Exclusive, _) => Some(Modified),
            (Owned, _) => Some(Owned),
            (Shared | NonCoherent, true) => Some(NonCoherent),
            (Shared | NonCoherent, false) | (Invalid, _) => None,
        }
    }

    fn after_flush(&self, state: BlockState) -> BlockState {
        match state {
            Modified => Exclusive,
            Owned | NonCoherent => Shared,
            other => other,
        }
    }
}
