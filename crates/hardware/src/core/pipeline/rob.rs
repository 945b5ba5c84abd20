//! Reorder Buffer (ROB) for in-order commit.
//!
//! The ROB is a circular buffer that tracks in-flight instructions from dispatch
//! through commit. It provides:
//! 1. **Allocation:** Assigns unique tags to instructions entering the backend.
//! 2. **Completion:** Marks instructions as done when their latency elapses or their
//!    memory completion arrives.
//! 3. **In-order Commit:** Retires instructions from the head in program order.
//! 4. **Flush:** Squashes speculative entries younger than a recovery point and hands
//!    them back for refetch.

use crate::common::addr::Cycle;
use crate::common::data::AccessToken;
use crate::core::instruction::Instruction;

/// Unique tag identifying an in-flight instruction in the ROB.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RobTag(pub u32);

/// Lifecycle state of an ROB entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RobState {
    /// Dispatched, waiting in the issue queue.
    #[default]
    Waiting,
    /// Issued; executing or waiting for memory.
    Issued,
    /// Result available, waiting to commit.
    Completed,
}

/// A single entry in the Reorder Buffer.
#[derive(Clone, Debug, Default)]
pub struct RobEntry {
    /// Unique tag for this entry.
    pub tag: RobTag,
    /// The instruction.
    pub inst: Option<Instruction>,
    /// Current lifecycle state.
    pub state: RobState,
    /// Cycle at which a non-memory instruction finishes executing.
    pub ready_at: Cycle,
    /// Token of the outstanding memory access, once admitted.
    pub token: Option<AccessToken>,
    /// Earliest cycle at which a rejected memory access may be re-issued.
    pub retry_at: Cycle,
    /// Loaded or stored word.
    pub value: u64,
    /// Whether this entry is valid (occupied).
    pub valid: bool,
}

/// Reorder Buffer: circular buffer for in-order commit.
#[derive(Debug)]
pub struct Rob {
    /// Fixed-size entry array.
    entries: Vec<RobEntry>,
    /// Index of the oldest entry (commit point).
    head: usize,
    /// Index where the next entry will be allocated.
    tail: usize,
    /// Number of valid entries.
    count: usize,
    /// Monotonically increasing tag counter.
    next_tag: u32,
}

impl Rob {
    /// Creates a new ROB with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity.max(1), RobEntry::default);
        Self {
            entries,
            head: 0,
            tail: 0,
            count: 0,
            next_tag: 1,
        }
    }

    /// Returns the ROB capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of occupied entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the ROB is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true if the ROB is full.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == self.entries.len()
    }

    /// Allocates a new ROB entry. Returns `None` if the ROB is full.
    pub fn allocate(&mut self, inst: Instruction) -> Option<RobTag> {
        if self.is_full() {
            return None;
        }

        let tag = RobTag(self.next_tag);
        self.next_tag = self.next_tag.wrapping_add(1);
        if self.next_tag == 0 {
            self.next_tag = 1; // skip 0
        }

        self.entries[self.tail] = RobEntry {
            tag,
            inst: Some(inst),
            valid: true,
            ..RobEntry::default()
        };

        self.tail = (self.tail + 1) % self.entries.len();
        self.count += 1;
        Some(tag)
    }

    /// Marks an entry as Completed with its value.
    pub fn complete(&mut self, tag: RobTag, value: u64) {
        if let Some(entry) = self.find_entry_mut(tag) {
            entry.state = RobState::Completed;
            entry.value = value;
        }
    }

    /// Returns a reference to the head entry (oldest), if the ROB is non-empty.
    pub fn peek_head(&self) -> Option<&RobEntry> {
        if self.count == 0 {
            None
        } else {
            Some(&self.entries[self.head])
        }
    }

    /// Commits (retires) the head entry if it has completed.
    /// Returns `None` if the ROB is empty or the head is still in flight.
    pub fn commit_head(&mut self) -> Option<RobEntry> {
        if self.count == 0 || self.entries[self.head].state != RobState::Completed {
            return None;
        }

        let committed = std::mem::take(&mut self.entries[self.head]);
        self.head = (self.head + 1) % self.entries.len();
        self.count -= 1;
        Some(committed)
    }

    /// Flushes all entries allocated *after* the given tag (exclusive) and returns them
    /// oldest first. The entry with `tag` itself is kept.
    pub fn flush_after(&mut self, tag: RobTag) -> Vec<RobEntry> {
        let Some(pos) = self.position(tag) else {
            return Vec::new();
        };

        let keep = pos + 1;
        let mut flushed = Vec::with_capacity(self.count - keep);
        for i in keep..self.count {
            let idx = (self.head + i) % self.entries.len();
            flushed.push(std::mem::take(&mut self.entries[idx]));
        }
        self.tail = (self.head + keep) % self.entries.len();
        self.count = keep;
        flushed
    }

    /// Offset of `tag` from the head, in program order.
    pub fn position(&self, tag: RobTag) -> Option<usize> {
        (0..self.count).find(|&i| {
            let e = &self.entries[(self.head + i) % self.entries.len()];
            e.valid && e.tag == tag
        })
    }

    /// Finds a mutable reference to the entry with the given tag.
    pub fn find_entry_mut(&mut self, tag: RobTag) -> Option<&mut RobEntry> {
        let i = self.position(tag)?;
        let idx = (self.head + i) % self.entries.len();
        Some(&mut self.entries[idx])
    }

    /// Finds a reference to the entry with the given tag.
    pub fn find_entry(&self, tag: RobTag) -> Option<&RobEntry> {
        let i = self.position(tag)?;
        Some(&self.entries[(self.head + i) % self.entries.len()])
    }

    /// Iterates over all valid entries from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &RobEntry> + '_ {
        (0..self.count).map(move |i| &self.entries[(self.head + i) % self.entries.len()])
    }
}
