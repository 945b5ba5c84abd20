//! Directory.
//!
//! One entry per block frame records which upper-level modules hold a copy (sharers) and
//! which of them owns it (holds it in M, E or O). Each frame also carries a lock: a
//! transaction holds it from lookup until it replies, and transactions that must wait
//! queue behind it in arrival order.

use std::collections::{BTreeSet, VecDeque};

use crate::common::data::ModuleId;
use crate::core::units::cache::Slot;

use super::frame::FrameId;

/// Sharers and owner of one block frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirEntry {
    /// Upper-level module holding the block in M, E or O.
    pub owner: Option<ModuleId>,
    /// Upper-level modules holding any valid copy.
    pub sharers: BTreeSet<ModuleId>,
}

impl DirEntry {
    /// Adds a sharer.
    pub fn add_sharer(&mut self, module: ModuleId) {
        let _ = self.sharers.insert(module);
    }

    /// Removes a module from the sharers, and as owner if it was one.
    pub fn remove(&mut self, module: ModuleId) {
        let _ = self.sharers.remove(&module);
        if self.owner == Some(module) {
            self.owner = None;
        }
    }

    /// Makes `module` the single sharer and the owner.
    pub fn grant_exclusive(&mut self, module: ModuleId) {
        self.sharers.clear();
        let _ = self.sharers.insert(module);
        self.owner = Some(module);
    }

    /// Returns true if a module other than `module` holds a copy.
    pub fn has_other_sharer(&self, module: ModuleId) -> bool {
        self.sharers.iter().any(|&s| s != module)
    }

    /// Forgets every sharer.
    pub fn clear(&mut self) {
        self.sharers.clear();
        self.owner = None;
    }
}

#[derive(Clone, Debug, Default)]
struct FrameLock {
    holder: Option<FrameId>,
    waiters: VecDeque<FrameId>,
}

/// Directory entries and locks for every frame of one module.
#[derive(Debug)]
pub struct Directory {
    ways: usize,
    entries: Vec<DirEntry>,
    locks: Vec<FrameLock>,
}

impl Directory {
    /// Creates an empty directory.
    ///
    /// # Arguments
    ///
    /// * `sets` - Number of sets.
    /// * `ways` - Associativity.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            ways,
            entries: vec![DirEntry::default(); sets * ways],
            locks: vec![FrameLock::default(); sets * ways],
        }
    }

    #[inline]
    const fn index(&self, slot: Slot) -> usize {
        slot.set * self.ways + slot.way
    }

    /// Entry of the frame at `slot`.
    pub fn entry(&self, slot: Slot) -> &DirEntry {
        &self.entries[self.index(slot)]
    }

    /// Mutable entry of the frame at `slot`.
    pub fn entry_mut(&mut self, slot: Slot) -> &mut DirEntry {
        let i = self.index(slot);
        &mut self.entries[i]
    }

    /// Returns true if a transaction holds the frame.
    pub fn is_locked(&self, slot: Slot) -> bool {
        self.locks[self.index(slot)].holder.is_some()
    }

    /// Transaction holding the frame.
    pub fn holder(&self, slot: Slot) -> Option<FrameId> {
        self.locks[self.index(slot)].holder
    }

    /// Attempts to lock the frame for `frame`.
    ///
    /// # Returns
    ///
    /// True if the lock was free (or already held by `frame`).
    pub fn try_lock(&mut self, slot: Slot, frame: FrameId) -> bool {
        let i = self.index(slot);
        let lock = &mut self.locks[i];
        match lock.holder {
            None => {
                lock.holder = Some(frame);
                true
            }
            Some(h) => h == frame,
        }
    }

    /// Queues `frame` to be woken when the frame lock is released.
    pub fn wait(&mut self, slot: Slot, frame: FrameId) {
        let i = self.index(slot);
        self.locks[i].waiters.push_back(frame);
    }

    /// Releases the lock.
    ///
    /// # Returns
    ///
    /// Every waiting transaction, in arrival order. They must all look up again; the first
    /// to run takes the lock.
    pub fn unlock(&mut self, slot: Slot) -> Vec<FrameId> {
        let i = self.index(slot);
        let lock = &mut self.locks[i];
        lock.holder = None;
        lock.waiters.drain(..).collect()
    }

    /// Returns true if no frame is locked.
    pub fn is_idle(&self) -> bool {
        self.locks.iter().all(|l| l.holder.is_none() && l.waiters.is_empty())
    }
}
