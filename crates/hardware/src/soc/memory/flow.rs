//! Protocol step handlers.
//!
//! A frame runs one step per resumption. A step that needs another module sends a message
//! and returns `Flow::Wait`; the reply resumes the frame in the step that consumes it. A
//! frame that has answered its requester (or delivered its completion) returns
//! `Flow::Done` and is released.
//!
//! Up-down requests wait on locked frames, down-up requests nack them. Invalidations are
//! multicast and their acknowledgements coalesced by count; one nack among them fails the
//! whole transaction once every reply is in.

use tracing::{debug, trace};

use crate::common::data::{AccessKind, Completion, ModuleId};
use crate::common::error::SimError;
use crate::core::units::cache::{BlockState, Slot};
use crate::sim::SimEvent;

use super::frame::{Eviction, Frame, Role, Step};
use super::message::{Direction, Message, Reply};
use super::protocol::ReqOp;
use super::{MemorySystem, Queue, place};

/// What a step left the frame doing.
pub(crate) enum Flow {
    /// Parked until an event or reply resumes it.
    Wait,
    /// Finished; the frame is released.
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Access(AccessKind),
    /// Operation and whether the requester already holds valid data.
    UpDown(ReqOp, bool),
    DownUp(ReqOp),
    Evict,
}

fn mode(f: &Frame) -> Mode {
    match &f.role {
        Role::Access(info) => Mode::Access(info.kind),
        Role::Request {
            op,
            dir: Direction::UpDown,
            has_valid,
            ..
        } => Mode::UpDown(*op, *has_valid),
        Role::Request { op, .. } => Mode::DownUp(*op),
        Role::EvictReceive { .. } => Mode::Evict,
    }
}

fn requester(f: &Frame) -> Option<ModuleId> {
    match &f.role {
        Role::Request { from, .. } | Role::EvictReceive { from, .. } => Some(*from),
        Role::Access(_) => None,
    }
}

impl MemorySystem {
    /// Runs the frame's current step and parks or releases it.
    pub(crate) fn run_frame(&mut self, q: &mut Queue, mut f: Frame) -> Result<(), SimError> {
        let flow = match f.step {
            Step::Lookup => self.lookup(q, &mut f)?,
            Step::Action => self.action(q, &mut f)?,
            Step::EvictUppers => self.on_upper_evicted(q, &mut f)?,
            Step::EvictLow => self.on_evict_ack(q, &mut f)?,
            Step::Fetch => self.on_fetch_reply(q, &mut f)?,
            Step::Coherence => self.on_coherence_reply(q, &mut f)?,
        };
        match flow {
            Flow::Wait => self.frames.restore(f),
            Flow::Done => self.frames.release(f.id),
        }
        Ok(())
    }

    fn slot(&self, q: &Queue, f: &Frame) -> Result<Slot, SimError> {
        f.slot.ok_or_else(|| {
            self.violation(q.now(), f.module, f.block, format!("{:?} step without a frame", f.step))
        })
    }

    fn requester(&self, q: &Queue, f: &Frame) -> Result<ModuleId, SimError> {
        requester(f).ok_or_else(|| {
            self.violation(q.now(), f.module, f.block, "top-level access used as a request".into())
        })
    }

    fn take_reply(&self, q: &Queue, f: &mut Frame) -> Result<(ModuleId, Reply), SimError> {
        match f.reply.take() {
            Some(r) => Ok(r),
            None => Err(self.violation(
                q.now(),
                f.module,
                f.block,
                format!("{:?} step resumed without a reply", f.step),
            )),
        }
    }

    fn state(&self, f: &Frame, slot: Slot) -> BlockState {
        self.modules[f.module.0].cache.state_in(slot, f.block)
    }

    /// Finds and locks the frame's block, then waits out the tag latency.
    fn lookup(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let now = q.now();
        let mode = mode(f);
        let block = f.block;
        let m = &mut self.modules[f.module.0];
        if !f.port_reserved {
            let start = m.reserve_port(now);
            f.port_reserved = true;
            if start > now {
                let _ = q.schedule_after(start - now, SimEvent::Frame(f.id));
                return Ok(Flow::Wait);
            }
        }

        let slot = match mode {
            Mode::Access(kind) => match place(m, block, kind) {
                Ok(Some(slot)) => slot,
                Ok(None) => {
                    f.step = Step::Action;
                    let _ = q.schedule_after(m.latency, SimEvent::Frame(f.id));
                    return Ok(Flow::Wait);
                }
                Err(why) => {
                    debug!(module = %m.name, block, ?why, cycle = now, "retried access still blocked");
                    return self.fail(q, f);
                }
            },
            Mode::DownUp(_) => {
                let found = m
                    .cache
                    .find(block)
                    .or_else(|| m.cache.find_transient(block))
                    .or_else(|| m.cache.find_evicting(block));
                let Some(slot) = found else {
                    return self.answer(q, f, Reply::ack(false));
                };
                if !m.dir.try_lock(slot, f.id) {
                    m.stats.nacks += 1;
                    trace!(module = %m.name, block, cycle = now, "down-up request hit a locked frame");
                    return self.answer(q, f, Reply::nack());
                }
                slot
            }
            Mode::Evict => {
                let Some(slot) = m.cache.find(block) else {
                    return Err(self.violation(
                        now,
                        f.module,
                        block,
                        "eviction of a block that is not present".into(),
                    ));
                };
                if !m.dir.try_lock(slot, f.id) {
                    m.dir.wait(slot, f.id);
                    return Ok(Flow::Wait);
                }
                slot
            }
            Mode::UpDown(..) => {
                // A frame already filling or evicting this block is waited on, never duplicated.
                let found = m
                    .cache
                    .find(block)
                    .or_else(|| m.cache.find_transient(block))
                    .or_else(|| m.cache.find_evicting(block));
                let slot = match found {
                    Some(slot) => slot,
                    None => {
                        let dir = &m.dir;
                        m.cache.choose_victim(block, |s| dir.is_locked(s))
                    }
                };
                if !m.dir.try_lock(slot, f.id) {
                    m.dir.wait(slot, f.id);
                    return Ok(Flow::Wait);
                }
                slot
            }
        };

        let _ = m.dir.try_lock(slot, f.id);
        if !m.cache.state_in(slot, block).is_valid() {
            m.cache.block_mut(slot).transient = Some(block);
        }
        f.slot = Some(slot);
        f.step = Step::Action;
        trace!(module = %m.name, block, ?mode, cycle = now, "frame locked");
        let _ = q.schedule_after(m.latency, SimEvent::Frame(f.id));
        Ok(Flow::Wait)
    }

    /// Decides what the transaction needs once the tag latency has elapsed.
    fn action(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        match mode(f) {
            Mode::Access(kind) => self.access_action(q, f, kind),
            Mode::UpDown(op, _) => {
                let slot = self.slot(q, f)?;
                let st = self.state(f, slot);
                match op {
                    ReqOp::Read if st.is_valid() => self.read_coherence(q, f),
                    ReqOp::Read => self.begin_miss(q, f, ReqOp::Read, false),
                    ReqOp::Write if st.is_exclusive() => self.write_coherence(q, f),
                    ReqOp::Write if st.is_valid() => {
                        f.fetch = Some((ReqOp::Write, true));
                        self.fetch(q, f)
                    }
                    ReqOp::Write => self.begin_miss(q, f, ReqOp::Write, false),
                }
            }
            Mode::DownUp(op) => {
                let slot = self.slot(q, f)?;
                if !self.state(f, slot).is_valid() {
                    return self.answer(q, f, Reply::ack(false));
                }
                let entry = self.modules[f.module.0].dir.entry(slot);
                let owner = entry.owner;
                let sharers: Vec<ModuleId> = entry.sharers.iter().copied().collect();
                match (op, owner) {
                    (ReqOp::Read, Some(owner)) => {
                        self.request_uppers(q, f, &[owner], ReqOp::Read, f.block, Step::Coherence)
                    }
                    (ReqOp::Read, None) => self.finish_downgrade(q, f),
                    (ReqOp::Write, _) if sharers.is_empty() => self.finish_invalidate(q, f),
                    (ReqOp::Write, _) => {
                        self.request_uppers(q, f, &sharers, ReqOp::Write, f.block, Step::Coherence)
                    }
                }
            }
            Mode::Evict => self.absorb_eviction(q, f),
        }
    }

    fn access_action(&mut self, q: &mut Queue, f: &mut Frame, kind: AccessKind) -> Result<Flow, SimError> {
        let Some(slot) = f.slot else {
            return self.complete_access(q, f);
        };
        let st = self.state(f, slot);
        match kind {
            AccessKind::Load | AccessKind::NcStore if st.is_valid() => self.complete_access(q, f),
            AccessKind::Load | AccessKind::NcStore => self.begin_miss(q, f, ReqOp::Read, false),
            AccessKind::Store if st.is_exclusive() => self.complete_access(q, f),
            AccessKind::Store if st.is_valid() => {
                f.fetch = Some((ReqOp::Write, true));
                self.fetch(q, f)
            }
            AccessKind::Store => self.begin_miss(q, f, ReqOp::Write, false),
            AccessKind::Invalidate if st.is_valid() => self.start_eviction(q, f, f.block, false),
            AccessKind::WriteBack if st.is_dirty() => self.start_eviction(q, f, f.block, true),
            AccessKind::Invalidate | AccessKind::WriteBack => self.complete_access(q, f),
        }
    }

    /// Sends a down-up request to every target and waits for all replies.
    fn request_uppers(
        &mut self,
        q: &mut Queue,
        f: &mut Frame,
        targets: &[ModuleId],
        op: ReqOp,
        block: u64,
        step: Step,
    ) -> Result<Flow, SimError> {
        for &to in targets {
            let msg = Message::Request {
                op,
                dir: Direction::DownUp,
                block,
                parent: f.id,
                has_valid: false,
            };
            self.send(q, f.module, to, msg)?;
        }
        f.pending = targets.len() as u32;
        f.nacked = false;
        f.step = step;
        Ok(Flow::Wait)
    }

    /// Makes room for the frame's block if another one is resident, then fetches it.
    fn begin_miss(&mut self, q: &mut Queue, f: &mut Frame, op: ReqOp, has_valid: bool) -> Result<Flow, SimError> {
        f.fetch = Some((op, has_valid));
        let slot = self.slot(q, f)?;
        let resident = self.modules[f.module.0].cache.block(slot);
        if resident.state.is_valid() && resident.tag != f.block {
            let victim = resident.tag;
            return self.start_eviction(q, f, victim, false);
        }
        self.fetch(q, f)
    }

    fn start_eviction(&mut self, q: &mut Queue, f: &mut Frame, block: u64, keep: bool) -> Result<Flow, SimError> {
        let slot = self.slot(q, f)?;
        f.evict = Some(Eviction {
            block,
            keep,
            dirty: false,
        });
        if keep {
            return self.evict_send(q, f);
        }
        let m = &mut self.modules[f.module.0];
        m.stats.evictions += 1;
        let uppers: Vec<ModuleId> = m.dir.entry(slot).sharers.iter().copied().collect();
        trace!(module = %m.name, block, uppers = uppers.len(), cycle = q.now(), "evicting");
        if uppers.is_empty() {
            self.evict_send(q, f)
        } else {
            self.request_uppers(q, f, &uppers, ReqOp::Write, block, Step::EvictUppers)
        }
    }

    /// Collects one invalidation acknowledgement for a victim's upper copies.
    ///
    /// Dirty data returned from above is merged into the victim's frame, which becomes
    /// dirty itself, so the data survives if the eviction is abandoned and retried.
    fn on_upper_evicted(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let (src, reply) = self.take_reply(q, f)?;
        let slot = self.slot(q, f)?;
        f.pending = f.pending.saturating_sub(1);
        let m = &mut self.modules[f.module.0];
        if reply.ok {
            m.dir.entry_mut(slot).remove(src);
            if reply.dirty {
                if let Some(data) = reply.data {
                    let b = m.cache.block_mut(slot);
                    b.data = data;
                    b.state = self.protocol.after_absorb(b.state);
                }
                if let Some(ev) = &mut f.evict {
                    ev.dirty = true;
                }
            }
        } else {
            f.nacked = true;
        }
        if f.pending > 0 {
            return Ok(Flow::Wait);
        }
        if f.nacked {
            return self.fail(q, f);
        }
        self.evict_send(q, f)
    }

    /// Writes the victim back (or notifies the directory below of a clean eviction).
    ///
    /// A victim that is not kept is invalidated as the message leaves: the level below
    /// forgets this copy when the message arrives, possibly before the acknowledgement
    /// returns. The frame stays locked and marked as evicting until then.
    fn evict_send(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let slot = self.slot(q, f)?;
        let Some(ev) = f.evict else {
            return Err(self.violation(q.now(), f.module, f.block, "no eviction in progress".into()));
        };
        let m = &mut self.modules[f.module.0];
        let st = m.cache.state_in(slot, ev.block);
        let dirty = st.is_dirty() || ev.dirty;
        let non_coherent = dirty && matches!(st, BlockState::Shared | BlockState::NonCoherent);
        let retain_owner = ev.keep && self.protocol.after_flush(st).is_exclusive();
        let data = dirty.then(|| m.cache.block(slot).data.clone());
        if dirty {
            m.stats.writebacks += 1;
        }
        if !ev.keep && st.is_valid() {
            let b = m.cache.block_mut(slot);
            b.state = BlockState::Invalid;
            b.evicting = true;
        }
        f.step = Step::EvictLow;
        match m.low {
            None => {
                let latency = m.memory_latency(ev.block);
                if let Some(data) = data {
                    self.backing.write(ev.block, data);
                }
                f.reply = Some((f.module, Reply::ack(true)));
                let _ = q.schedule_after(latency, SimEvent::Frame(f.id));
            }
            Some(low) => {
                let msg = Message::Evict {
                    block: ev.block,
                    parent: f.id,
                    data,
                    non_coherent,
                    keep: ev.keep,
                    retain_owner,
                };
                self.send(q, f.module, low, msg)?;
            }
        }
        Ok(Flow::Wait)
    }

    fn on_evict_ack(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let (_, reply) = self.take_reply(q, f)?;
        let slot = self.slot(q, f)?;
        let Some(ev) = f.evict.take() else {
            return Err(self.violation(q.now(), f.module, f.block, "eviction ack without eviction".into()));
        };
        if !reply.ok {
            return self.fail(q, f);
        }
        let m = &mut self.modules[f.module.0];
        let b = m.cache.block_mut(slot);
        b.evicting = false;
        if b.tag == ev.block {
            if ev.keep {
                b.state = self.protocol.after_flush(b.state);
            } else {
                b.state = BlockState::Invalid;
                m.dir.entry_mut(slot).clear();
            }
        }
        trace!(module = %m.name, block = ev.block, keep = ev.keep, cycle = q.now(), "eviction done");
        if f.fetch.is_some() {
            self.fetch(q, f)
        } else {
            self.proceed(q, f)
        }
    }

    /// Requests the block (or exclusive rights) from the level below.
    fn fetch(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let Some((op, has_valid)) = f.fetch else {
            return Err(self.violation(q.now(), f.module, f.block, "fetch without a request".into()));
        };
        f.step = Step::Fetch;
        let m = &mut self.modules[f.module.0];
        match m.low {
            None => {
                let words = m.geometry().words_per_block();
                let data = (!has_valid).then(|| self.backing.read(f.block, words));
                let latency = m.memory_latency(f.block);
                f.reply = Some((
                    f.module,
                    Reply {
                        ok: true,
                        present: true,
                        data,
                        dirty: false,
                        exclusive: true,
                    },
                ));
                let _ = q.schedule_after(latency, SimEvent::Frame(f.id));
            }
            Some(low) => {
                let msg = Message::Request {
                    op,
                    dir: Direction::UpDown,
                    block: f.block,
                    parent: f.id,
                    has_valid,
                };
                self.send(q, f.module, low, msg)?;
            }
        }
        Ok(Flow::Wait)
    }

    fn on_fetch_reply(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let now = q.now();
        let (_, reply) = self.take_reply(q, f)?;
        if !reply.ok {
            return self.fail(q, f);
        }
        let slot = self.slot(q, f)?;
        let Some((op, _)) = f.fetch.take() else {
            return Err(self.violation(now, f.module, f.block, "fill without a request".into()));
        };
        let prev = self.state(f, slot);
        let m = &mut self.modules[f.module.0];
        let b = m.cache.block_mut(slot);
        match reply.data {
            Some(data) => b.data = data,
            None if prev.is_valid() => {}
            None => return Err(self.violation(now, f.module, f.block, "fill without data".into())),
        }
        b.tag = f.block;
        b.transient = None;
        b.state = self.protocol.after_fill(prev, op, reply.exclusive);
        let state = b.state;
        if !prev.is_valid() {
            m.dir.entry_mut(slot).clear();
        }
        m.cache.fill(slot);
        trace!(module = %m.name, block = f.block, state = %state.letter(), cycle = now, "filled");
        self.proceed(q, f)
    }

    /// Continues a transaction once its frame holds the block with the needed rights.
    fn proceed(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        match mode(f) {
            Mode::Access(_) => self.complete_access(q, f),
            Mode::UpDown(ReqOp::Read, _) => self.read_coherence(q, f),
            Mode::UpDown(ReqOp::Write, _) => self.write_coherence(q, f),
            other => Err(self.violation(
                q.now(),
                f.module,
                f.block,
                format!("{other:?} cannot continue after a fill"),
            )),
        }
    }

    /// Serves an up-down read, first downgrading the current owner if there is one.
    fn read_coherence(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let slot = self.slot(q, f)?;
        let from = self.requester(q, f)?;
        let owner = self.modules[f.module.0].dir.entry(slot).owner;
        match owner {
            Some(owner) if owner == from => Err(self.violation(
                q.now(),
                f.module,
                f.block,
                format!("owner {from} requested its own block"),
            )),
            Some(owner) => self.request_uppers(q, f, &[owner], ReqOp::Read, f.block, Step::Coherence),
            None => self.reply_read(q, f),
        }
    }

    /// Serves an up-down write by invalidating every other sharer.
    fn write_coherence(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let slot = self.slot(q, f)?;
        let from = self.requester(q, f)?;
        let others: Vec<ModuleId> = self.modules[f.module.0]
            .dir
            .entry(slot)
            .sharers
            .iter()
            .copied()
            .filter(|&s| s != from)
            .collect();
        if others.is_empty() {
            self.reply_write(q, f)
        } else {
            self.request_uppers(q, f, &others, ReqOp::Write, f.block, Step::Coherence)
        }
    }

    /// Collects one down-up reply about the frame's own block.
    fn on_coherence_reply(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let (src, reply) = self.take_reply(q, f)?;
        let slot = self.slot(q, f)?;
        f.pending = f.pending.saturating_sub(1);
        let mode = mode(f);
        let m = &mut self.modules[f.module.0];
        if reply.ok {
            let entry = m.dir.entry_mut(slot);
            match mode {
                Mode::UpDown(ReqOp::Read, _) | Mode::DownUp(ReqOp::Read) => {
                    if !reply.present {
                        entry.remove(src);
                    } else if !reply.dirty && entry.owner == Some(src) {
                        entry.owner = None;
                    }
                    f.upper_dirty |= reply.dirty;
                    if reply.data.is_some() {
                        f.fresh = reply.data;
                    }
                }
                Mode::UpDown(ReqOp::Write, _) => {
                    entry.remove(src);
                    if reply.dirty {
                        if let Some(data) = reply.data {
                            let b = m.cache.block_mut(slot);
                            b.data = data;
                            b.state = self.protocol.after_absorb(b.state);
                        }
                    }
                }
                Mode::DownUp(ReqOp::Write) => {
                    entry.remove(src);
                    if reply.dirty {
                        f.upper_dirty = true;
                        if reply.data.is_some() {
                            f.fresh = reply.data;
                        }
                    }
                }
                Mode::Access(_) | Mode::Evict => {}
            }
        } else {
            f.nacked = true;
        }

        if f.pending > 0 {
            return Ok(Flow::Wait);
        }
        if f.nacked {
            return self.fail(q, f);
        }
        match mode {
            Mode::UpDown(ReqOp::Read, _) => self.reply_read(q, f),
            Mode::UpDown(ReqOp::Write, _) => self.reply_write(q, f),
            Mode::DownUp(ReqOp::Read) => self.finish_downgrade(q, f),
            Mode::DownUp(ReqOp::Write) => self.finish_invalidate(q, f),
            other => Err(self.violation(
                q.now(),
                f.module,
                f.block,
                format!("{other:?} received a coherence reply"),
            )),
        }
    }

    fn reply_read(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let slot = self.slot(q, f)?;
        let from = self.requester(q, f)?;
        let state = self.state(f, slot);
        let m = &mut self.modules[f.module.0];
        let data = f
            .fresh
            .take()
            .unwrap_or_else(|| m.cache.block(slot).data.clone());
        let entry = m.dir.entry_mut(slot);
        let exclusive = state.is_exclusive() && !entry.has_other_sharer(from);
        entry.add_sharer(from);
        if exclusive {
            entry.owner = Some(from);
        }
        m.cache.touch(slot);
        trace!(module = %m.name, block = f.block, to = %from, exclusive, cycle = q.now(), "read served");
        let reply = Reply {
            ok: true,
            present: true,
            data: Some(data),
            dirty: false,
            exclusive,
        };
        self.answer(q, f, reply)
    }

    fn reply_write(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let slot = self.slot(q, f)?;
        let from = self.requester(q, f)?;
        let has_valid = matches!(mode(f), Mode::UpDown(_, true));
        let m = &mut self.modules[f.module.0];
        let data = (!has_valid).then(|| m.cache.block(slot).data.clone());
        m.dir.entry_mut(slot).grant_exclusive(from);
        m.cache.touch(slot);
        trace!(module = %m.name, block = f.block, to = %from, cycle = q.now(), "ownership granted");
        let reply = Reply {
            ok: true,
            present: true,
            data,
            dirty: false,
            exclusive: true,
        };
        self.answer(q, f, reply)
    }

    /// Answers a down-up read: keep a shared copy and return the newest data.
    fn finish_downgrade(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let slot = self.slot(q, f)?;
        let st = self.state(f, slot);
        let (state, dirty) = self.protocol.after_downgrade(st, f.upper_dirty);
        let b = self.modules[f.module.0].cache.block_mut(slot);
        let data = f.fresh.take().unwrap_or_else(|| b.data.clone());
        b.state = state;
        trace!(module = f.module.0, block = f.block, from = %st.letter(), to = %state.letter(), "downgraded");
        let reply = Reply {
            ok: true,
            present: true,
            data: Some(data),
            dirty,
            exclusive: false,
        };
        self.answer(q, f, reply)
    }

    /// Answers a down-up write: drop the copy, returning dirty data.
    fn finish_invalidate(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let slot = self.slot(q, f)?;
        let st = self.state(f, slot);
        let dirty = st.is_dirty() || f.upper_dirty;
        let m = &mut self.modules[f.module.0];
        let b = m.cache.block_mut(slot);
        let data = if dirty {
            Some(f.fresh.take().unwrap_or_else(|| b.data.clone()))
        } else {
            None
        };
        b.state = BlockState::Invalid;
        m.dir.entry_mut(slot).clear();
        m.stats.invalidations += 1;
        trace!(module = %m.name, block = f.block, dirty, cycle = q.now(), "invalidated");
        let reply = Reply {
            ok: true,
            present: true,
            data,
            dirty,
            exclusive: false,
        };
        self.answer(q, f, reply)
    }

    /// Applies an eviction or flush received from an upper level.
    fn absorb_eviction(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let slot = self.slot(q, f)?;
        let (module, block) = (f.module, f.block);
        let (from, data, non_coherent, keep, retain_owner) = match &mut f.role {
            Role::EvictReceive {
                from,
                data,
                non_coherent,
                keep,
                retain_owner,
                ..
            } => (*from, data.take(), *non_coherent, *keep, *retain_owner),
            _ => {
                return Err(self.violation(q.now(), module, block, "not an eviction".into()));
            }
        };
        let st = self.state(f, slot);
        if let Some(data) = data {
            let Some(state) = self.protocol.after_writeback(st, non_coherent) else {
                return Err(self.violation(
                    q.now(),
                    module,
                    block,
                    format!("write-back from {from} into a {} copy", st.letter()),
                ));
            };
            let b = self.modules[module.0].cache.block_mut(slot);
            b.state = state;
            b.data = data;
        }
        let entry = self.modules[module.0].dir.entry_mut(slot);
        if !keep {
            entry.remove(from);
        } else if !retain_owner && entry.owner == Some(from) {
            entry.owner = None;
        }
        self.answer(q, f, Reply::ack(true))
    }

    /// Unlocks the frame's block and sends `reply` to the requester.
    fn answer(&mut self, q: &mut Queue, f: &mut Frame, reply: Reply) -> Result<Flow, SimError> {
        let (to, parent) = match &f.role {
            Role::Request { from, parent, .. } | Role::EvictReceive { from, parent, .. } => {
                (*from, *parent)
            }
            Role::Access(_) => {
                return Err(self.violation(q.now(), f.module, f.block, "access frames do not answer".into()));
            }
        };
        if let Some(slot) = f.slot.take() {
            self.release_slot(q, f.module, slot, f.id, f.block);
        }
        self.send(q, f.module, to, Message::Reply { frame: parent, reply })?;
        Ok(Flow::Done)
    }

    /// Abandons the current attempt: accesses back off and retry, requests nack.
    fn fail(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let now = q.now();
        if let Some(slot) = f.slot.take() {
            self.release_slot(q, f.module, slot, f.id, f.block);
        }
        match mode(f) {
            Mode::Access(_) => {
                f.reset();
                f.retries += 1;
                let addr = match &f.role {
                    Role::Access(info) => info.addr,
                    _ => f.block,
                };
                let max_retries = self.max_retries();
                let m = &mut self.modules[f.module.0];
                m.stats.retries += 1;
                if f.retries > max_retries {
                    return Err(SimError::RetryLimit {
                        cycle: now,
                        module: m.name.clone(),
                        addr,
                        retries: max_retries,
                    });
                }
                let base = m.retry_latency;
                let delay = self.backoff(base);
                debug!(module = f.module.0, addr, retries = f.retries, delay, cycle = now, "access nacked; retrying");
                let _ = q.schedule_after(delay, SimEvent::Frame(f.id));
                Ok(Flow::Wait)
            }
            Mode::UpDown(..) | Mode::DownUp(_) => {
                self.modules[f.module.0].stats.nacks += 1;
                f.fresh = None;
                self.answer(q, f, Reply::nack())
            }
            Mode::Evict => Err(self.violation(now, f.module, f.block, "eviction cannot fail".into())),
        }
    }

    /// Applies a top-level access to its block and schedules the completion.
    fn complete_access(&mut self, q: &mut Queue, f: &mut Frame) -> Result<Flow, SimError> {
        let now = q.now();
        let info = match &f.role {
            Role::Access(info) => info.clone(),
            _ => {
                return Err(self.violation(now, f.module, f.block, "completing a non-access".into()));
            }
        };
        let value = match f.slot.take() {
            Some(slot) => {
                let m = &mut self.modules[f.module.0];
                let word = m.geometry().word_of(info.addr);
                let st = m.cache.state_in(slot, f.block);
                let needs_copy = matches!(
                    info.kind,
                    AccessKind::Load | AccessKind::Store | AccessKind::NcStore
                );
                if needs_copy && !self.protocol.satisfies(st, info.kind) {
                    return Err(self.violation(
                        now,
                        f.module,
                        f.block,
                        format!("{:?} completing on a {} copy", info.kind, st.letter()),
                    ));
                }
                let b = m.cache.block_mut(slot);
                let value = match info.kind {
                    AccessKind::Load => b.data.get(word).copied().unwrap_or(0),
                    AccessKind::Store | AccessKind::NcStore => {
                        if let Some(w) = b.data.get_mut(word) {
                            *w = info.value;
                        }
                        info.value
                    }
                    AccessKind::Invalidate | AccessKind::WriteBack => 0,
                };
                if st.is_valid() {
                    b.state = self.protocol.after_access(st, info.kind);
                    m.cache.touch(slot);
                }
                self.release_slot(q, f.module, slot, f.id, f.block);
                value
            }
            None => 0,
        };

        let m = &mut self.modules[f.module.0];
        m.end_access(f.block);
        let completed = now + 1;
        m.stats.completed += 1;
        m.stats.total_latency += completed - f.issued;
        let completion = Completion {
            token: info.token,
            requester: info.requester,
            module: f.module,
            kind: info.kind,
            addr: info.addr,
            value,
            hit: info.hit,
            issued: f.issued,
            completed,
        };
        if f.squashed {
            debug!(token = info.token.0, cycle = now, "completion of a squashed access dropped");
        } else {
            self.deliver(q, completion);
        }
        Ok(Flow::Done)
    }
}
