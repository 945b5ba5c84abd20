//! Transaction frames.
//!
//! Every multi-step protocol transaction (a top-level access, a request received from
//! another level, an eviction received from above) is a `Frame` in an arena. A frame
//! records which step it is waiting in and the data it has gathered so far; the events
//! that resume it carry only its `FrameId`.

use crate::common::addr::Cycle;
use crate::common::data::{AccessKind, AccessToken, ModuleId, Requester};
use crate::core::units::cache::Slot;

use super::message::{Direction, Reply};
use super::protocol::ReqOp;

/// Stable handle of a frame. The generation makes handles of freed frames stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId {
    index: u32,
    generation: u32,
}

impl FrameId {
    /// Builds a handle from its parts.
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Top-level access details.
#[derive(Clone, Debug)]
pub(crate) struct AccessInfo {
    pub token: AccessToken,
    pub kind: AccessKind,
    pub requester: Requester,
    pub addr: u64,
    pub value: u64,
    pub hit: bool,
}

/// What the frame is doing.
#[derive(Clone, Debug)]
pub(crate) enum Role {
    /// A top-level access admitted at an entry module.
    Access(AccessInfo),
    /// A request received from another level.
    Request {
        op: ReqOp,
        dir: Direction,
        from: ModuleId,
        parent: FrameId,
        has_valid: bool,
    },
    /// An eviction or flush received from an upper level.
    EvictReceive {
        from: ModuleId,
        parent: FrameId,
        data: Option<Vec<u64>>,
        non_coherent: bool,
        keep: bool,
        retain_owner: bool,
    },
}

/// Where the frame resumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Find and lock the frame's block.
    Lookup,
    /// Tag/data latency elapsed; decide what to do.
    Action,
    /// Waiting for upper copies of a victim to be invalidated.
    EvictUppers,
    /// Waiting for the lower level to acknowledge an eviction.
    EvictLow,
    /// Waiting for the lower level to supply the block or rights.
    Fetch,
    /// Waiting for down-up replies about the requested block.
    Coherence,
}

/// Victim eviction in progress.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Eviction {
    pub block: u64,
    pub keep: bool,
    pub dirty: bool,
}

/// One in-flight transaction.
#[derive(Debug)]
pub(crate) struct Frame {
    pub id: FrameId,
    pub module: ModuleId,
    pub block: u64,
    pub role: Role,
    pub step: Step,
    pub slot: Option<Slot>,
    pub port_reserved: bool,
    pub pending: u32,
    pub nacked: bool,
    pub fresh: Option<Vec<u64>>,
    pub upper_dirty: bool,
    pub fetch: Option<(ReqOp, bool)>,
    pub evict: Option<Eviction>,
    pub reply: Option<(ModuleId, Reply)>,
    pub retries: u32,
    pub issued: Cycle,
    pub squashed: bool,
}

impl Frame {
    pub fn new(id: FrameId, module: ModuleId, block: u64, role: Role, issued: Cycle) -> Self {
        Self {
            id,
            module,
            block,
            role,
            step: Step::Lookup,
            slot: None,
            port_reserved: false,
            pending: 0,
            nacked: false,
            fresh: None,
            upper_dirty: false,
            fetch: None,
            evict: None,
            reply: None,
            retries: 0,
            issued,
            squashed: false,
        }
    }

    /// Clears everything gathered since the frame last looked up its block.
    pub fn reset(&mut self) {
        self.step = Step::Lookup;
        self.slot = None;
        self.port_reserved = false;
        self.pending = 0;
        self.nacked = false;
        self.fresh = None;
        self.upper_dirty = false;
        self.fetch = None;
        self.evict = None;
        self.reply = None;
    }
}

#[derive(Debug, Default)]
struct ArenaSlot {
    generation: u32,
    occupied: bool,
    frame: Option<Frame>,
}

/// Arena of frames addressed by generation-checked handles.
///
/// A frame is checked out with `take` while a handler works on it and put back with
/// `restore`, so handlers can mutate the rest of the memory system freely.
#[derive(Debug, Default)]
pub(crate) struct FrameArena {
    slots: Vec<ArenaSlot>,
    free: Vec<u32>,
    live: usize,
}

impl FrameArena {
    pub fn alloc(&mut self, make: impl FnOnce(FrameId) -> Frame) -> FrameId {
        let index = self.free.pop().unwrap_or_else(|| {
            self.slots.push(ArenaSlot::default());
            (self.slots.len() - 1) as u32
        });
        let slot = &mut self.slots[index as usize];
        let id = FrameId {
            index,
            generation: slot.generation,
        };
        slot.occupied = true;
        slot.frame = Some(make(id));
        self.live += 1;
        id
    }

    #[cfg(test)]
    fn slot(&self, id: FrameId) -> Option<&ArenaSlot> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.occupied && s.generation == id.generation)
    }

    fn slot_mut(&mut self, id: FrameId) -> Option<&mut ArenaSlot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.occupied && s.generation == id.generation)
    }

    pub fn take(&mut self, id: FrameId) -> Option<Frame> {
        self.slot_mut(id).and_then(|s| s.frame.take())
    }

    pub fn restore(&mut self, frame: Frame) {
        if let Some(s) = self.slot_mut(frame.id) {
            s.frame = Some(frame);
        }
    }

    pub fn release(&mut self, id: FrameId) {
        if let Some(s) = self.slot_mut(id) {
            s.occupied = false;
            s.frame = None;
            s.generation = s.generation.wrapping_add(1);
            self.free.push(id.index);
            self.live -= 1;
        }
    }

    #[cfg(test)]
    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.slot(id).and_then(|s| s.frame.as_ref())
    }

    pub fn get_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.slot_mut(id).and_then(|s| s.frame.as_mut())
    }

    pub const fn len(&self) -> usize {
        self.live
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.slots.iter().filter_map(|s| s.frame.as_ref())
    }
}
