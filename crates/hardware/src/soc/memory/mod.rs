//! Coherent Memory System.
//!
//! This module implements the directory-based NMOESI memory hierarchy. It provides:
//! 1. **Modules:** Cache levels and main memory, each with a tag array, a directory over the
//!    modules directly above it, ports and MSHRs (`module`, `directory`).
//! 2. **Transactions:** Every multi-step protocol exchange is a frame in an arena, resumed
//!    by events that carry only its handle (`frame`, `flow`).
//! 3. **Messages:** Requests, evictions and replies travel through the interconnect as
//!    packets (`message`).
//! 4. **Protocol:** The state transition table is bound once behind `CoherenceProtocol`.
//! 5. **Main Memory:** A sparse backing store with controller latency (`store`, `controller`).
//! 6. **Checking:** An optional coherence checker run after every event (`invariants`).

/// Memory controller implementations for access latency modeling.
pub mod controller;
/// Per-frame sharer/owner tracking and frame locks.
pub mod directory;
/// Protocol step handlers.
mod flow;
/// Transaction frames and their arena.
pub mod frame;
/// Coherence invariant checker.
mod invariants;
/// Packets exchanged between modules.
pub mod message;
/// One cache level or main memory.
pub mod module;
/// Coherence protocol contract and the NMOESI table.
pub mod protocol;
/// Sparse main-memory contents.
pub mod store;

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use crate::common::addr::Cycle;
use crate::common::data::{AccessKind, AccessOutcome, AccessToken, Completion, ModuleId, Requester};
use crate::common::error::SimError;
use crate::core::units::cache::{BlockState, Slot};
use crate::sim::event::{EventHandle, EventQueue};
use crate::sim::SimEvent;
use crate::soc::interconnect::Network;

use self::frame::{AccessInfo, Frame, FrameArena, FrameId, Role, Step};
use self::message::{Message, Packet};
use self::module::{Module, Rejection};
use self::protocol::CoherenceProtocol;
use self::store::BackingStore;

/// Event queue carrying simulation events.
pub type Queue = EventQueue<SimEvent>;

/// All memory modules, the network between them and main-memory contents.
#[derive(Debug)]
pub struct MemorySystem {
    pub(crate) modules: Vec<Module>,
    pub(crate) frames: FrameArena,
    pub(crate) network: Network,
    pub(crate) backing: BackingStore,
    protocol: Box<dyn CoherenceProtocol>,
    rng: ChaCha8Rng,
    next_token: u64,
    pending: BTreeMap<AccessToken, EventHandle>,
    max_retries: u32,
}

impl MemorySystem {
    /// Assembles a memory system from built parts.
    ///
    /// # Arguments
    ///
    /// * `modules` - Modules with hierarchy links already set.
    /// * `network` - Interconnect with one end node per module.
    /// * `protocol` - Coherence protocol bound for the whole run.
    /// * `seed` - Seed for retry backoff jitter.
    /// * `max_retries` - Retries after which an access is reported as starved.
    pub(crate) fn new(
        modules: Vec<Module>,
        network: Network,
        protocol: Box<dyn CoherenceProtocol>,
        seed: u64,
        max_retries: u32,
    ) -> Self {
        Self {
            modules,
            frames: FrameArena::default(),
            network,
            backing: BackingStore::new(),
            protocol,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_token: 0,
            pending: BTreeMap::new(),
            max_retries,
        }
    }

    /// All modules, indexed by `ModuleId`.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Module by handle.
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0)
    }

    /// Looks a module up by name.
    pub fn find(&self, name: &str) -> Option<ModuleId> {
        self.modules.iter().position(|m| m.name == name).map(ModuleId)
    }

    /// Interconnect.
    pub const fn network(&self) -> &Network {
        &self.network
    }

    /// Main-memory contents.
    pub const fn backing(&self) -> &BackingStore {
        &self.backing
    }

    /// Bound coherence protocol.
    pub fn protocol(&self) -> &dyn CoherenceProtocol {
        self.protocol.as_ref()
    }

    /// Transactions in flight.
    pub const fn live_frames(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if no transaction is in flight and no completion is undelivered.
    pub fn is_quiescent(&self) -> bool {
        self.frames.len() == 0
            && self.pending.is_empty()
            && self.modules.iter().all(Module::is_quiescent)
    }

    /// Issues a top-level access at an entry module.
    ///
    /// # Arguments
    ///
    /// * `q` - Event queue; the access schedules its own continuation.
    /// * `module` - Entry module receiving the access.
    /// * `kind` - What the access does.
    /// * `addr` - Byte address.
    /// * `value` - Word to store (ignored by non-writing kinds).
    /// * `requester` - Recipient of the completion.
    ///
    /// # Returns
    ///
    /// `Hit` or `MissService` with the token the completion will carry, or `Retry` when the
    /// module cannot take the access this cycle.
    ///
    /// # Errors
    ///
    /// Returns `SimError::InvalidRequest` for unknown modules and modules with upper levels.
    pub fn access(
        &mut self,
        q: &mut Queue,
        module: ModuleId,
        kind: AccessKind,
        addr: u64,
        value: u64,
        requester: Requester,
    ) -> Result<AccessOutcome, SimError> {
        let now = q.now();
        let m = self
            .modules
            .get_mut(module.0)
            .ok_or_else(|| SimError::InvalidRequest(format!("no module {module}")))?;
        if !m.is_entry() {
            return Err(SimError::InvalidRequest(format!(
                "module '{}' has upper levels and accepts no direct accesses",
                m.name
            )));
        }

        let block = m.geometry().block_of(addr);
        let placement = m.admission(block, now).and_then(|()| place(m, block, kind));
        let slot = match placement {
            Ok(slot) => slot,
            Err(why) => {
                m.stats.rejections += 1;
                debug!(module = %m.name, addr, ?kind, ?why, cycle = now, "access rejected");
                return Ok(AccessOutcome::Retry);
            }
        };

        let state = slot.map_or(BlockState::Invalid, |s| m.cache.state_in(s, block));
        let hit = self.protocol.satisfies(state, kind);
        let token = AccessToken(self.next_token);
        self.next_token += 1;

        let info = AccessInfo {
            token,
            kind,
            requester,
            addr,
            value,
            hit,
        };
        let id = self.frames.alloc(|id| {
            let mut f = Frame::new(id, module, block, Role::Access(info), now);
            f.slot = slot;
            f.port_reserved = true;
            f.step = Step::Action;
            f
        });

        if let Some(s) = slot {
            let _ = m.dir.try_lock(s, id);
            if !state.is_valid() {
                m.cache.block_mut(s).transient = Some(block);
            }
        }
        let _ = m.reserve_port(now);
        m.begin_access(block, id);

        m.stats.accesses += 1;
        match kind {
            AccessKind::Load => m.stats.reads += 1,
            AccessKind::Store => m.stats.writes += 1,
            AccessKind::NcStore => m.stats.nc_writes += 1,
            AccessKind::Invalidate | AccessKind::WriteBack => {}
        }
        if hit {
            m.stats.hits += 1;
        } else {
            m.stats.misses += 1;
        }
        trace!(module = %m.name, addr, ?kind, hit, token = token.0, cycle = now, "access admitted");

        let _ = q.schedule_after(m.latency, SimEvent::Frame(id));
        Ok(if hit {
            AccessOutcome::Hit(token)
        } else {
            AccessOutcome::MissService(token)
        })
    }

    /// Drops the completion of an access whose requester no longer wants it.
    ///
    /// A completion already scheduled is cancelled; an access still in flight finishes its
    /// protocol work but delivers nothing.
    ///
    /// # Returns
    ///
    /// False if the completion was already delivered or the token is unknown.
    pub fn cancel_completion(&mut self, q: &mut Queue, token: AccessToken) -> bool {
        if let Some(handle) = self.pending.remove(&token) {
            return q.cancel(handle);
        }
        let live = self.frames.iter().find_map(|f| match &f.role {
            Role::Access(info) if info.token == token && !f.squashed => Some(f.id),
            _ => None,
        });
        match live.and_then(|id| self.frames.get_mut(id)) {
            Some(f) => {
                f.squashed = true;
                true
            }
            None => false,
        }
    }

    /// Records that a completion event was dispatched.
    pub(crate) fn delivered(&mut self, token: AccessToken) {
        let _ = self.pending.remove(&token);
    }

    /// Resumes a transaction.
    ///
    /// Events for frames that no longer exist are ignored.
    pub(crate) fn resume(&mut self, q: &mut Queue, id: FrameId) -> Result<(), SimError> {
        match self.frames.take(id) {
            Some(f) => self.run_frame(q, f),
            None => Ok(()),
        }
    }

    /// Delivers a packet that arrived at its destination.
    pub(crate) fn receive(&mut self, q: &mut Queue, packet: Packet) -> Result<(), SimError> {
        let now = q.now();
        let Packet { src, dst, msg, .. } = packet;
        trace!(from = %src, to = %dst, ?msg, cycle = now, "packet arrived");
        match msg {
            Message::Request {
                op,
                dir,
                block,
                parent,
                has_valid,
            } => {
                self.modules[dst.0].stats.requests += 1;
                let role = Role::Request {
                    op,
                    dir,
                    from: src,
                    parent,
                    has_valid,
                };
                let id = self.frames.alloc(|id| Frame::new(id, dst, block, role, now));
                self.resume(q, id)
            }
            Message::Evict {
                block,
                parent,
                data,
                non_coherent,
                keep,
                retain_owner,
            } => {
                let role = Role::EvictReceive {
                    from: src,
                    parent,
                    data,
                    non_coherent,
                    keep,
                    retain_owner,
                };
                let id = self.frames.alloc(|id| Frame::new(id, dst, block, role, now));
                self.resume(q, id)
            }
            Message::Reply { frame, reply } => {
                let Some(mut f) = self.frames.take(frame) else {
                    return Err(self.violation(now, dst, 0, format!("reply from {src} for a finished transaction")));
                };
                f.reply = Some((src, reply));
                self.run_frame(q, f)
            }
        }
    }

    /// Sends a message from one module to another through the interconnect.
    pub(crate) fn send(
        &mut self,
        q: &mut Queue,
        src: ModuleId,
        dst: ModuleId,
        msg: Message,
    ) -> Result<(), SimError> {
        let now = q.now();
        let size = msg.size(self.modules[src.0].geometry().block_size);
        let (a, b) = (self.modules[src.0].node, self.modules[dst.0].node);
        let Some(arrival) = self.network.send(now, a, b, size) else {
            return Err(self.violation(now, src, 0, format!("no route to {dst}")));
        };
        let packet = Packet {
            src,
            dst,
            size,
            sent: now,
            msg,
        };
        let _ = q.schedule_at(arrival, SimEvent::Arrive(packet))?;
        Ok(())
    }

    /// Releases a frame lock held by `id` and wakes every waiter.
    pub(crate) fn release_slot(&mut self, q: &mut Queue, module: ModuleId, slot: Slot, id: FrameId, block: u64) {
        let m = &mut self.modules[module.0];
        let b = m.cache.block_mut(slot);
        if b.transient == Some(block) {
            b.transient = None;
        }
        if m.dir.holder(slot) == Some(id) {
            m.cache.block_mut(slot).evicting = false;
            for waiter in m.dir.unlock(slot) {
                let _ = q.schedule_after(1, SimEvent::Frame(waiter));
            }
        }
    }

    /// Builds a protocol violation diagnostic.
    pub(crate) fn violation(&self, cycle: Cycle, module: ModuleId, block: u64, detail: String) -> SimError {
        let module = self
            .modules
            .get(module.0)
            .map_or_else(|| module.to_string(), |m| m.name.clone());
        tracing::error!(cycle, %module, block, %detail, "protocol violation");
        SimError::ProtocolViolation {
            cycle,
            module,
            block,
            detail,
        }
    }

    /// Schedules the delivery of a finished access.
    pub(crate) fn deliver(&mut self, q: &mut Queue, completion: Completion) {
        let token = completion.token;
        let handle = q.schedule_after(1, SimEvent::Complete(completion));
        let _ = self.pending.insert(token, handle);
    }

    /// Retry budget of one access.
    pub(crate) const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before an access looks its block up again.
    pub(crate) fn backoff(&mut self, base: Cycle) -> Cycle {
        let base = base.max(1);
        base + self.rng.gen_range(0..base)
    }
}

/// Picks the frame a top-level access works in.
///
/// # Returns
///
/// `None` for kinds that have nothing to do on an absent block, or `FrameBusy` when the
/// frame is locked by another transaction.
pub(crate) fn place(m: &mut Module, block: u64, kind: AccessKind) -> Result<Option<Slot>, Rejection> {
    let slot = match m.cache.find(block).or_else(|| m.cache.find_evicting(block)) {
        Some(slot) => slot,
        None if matches!(kind, AccessKind::Invalidate | AccessKind::WriteBack) => return Ok(None),
        None => {
            let dir = &m.dir;
            m.cache.choose_victim(block, |s| dir.is_locked(s))
        }
    };
    if m.is_locked(slot) {
        Err(Rejection::FrameBusy)
    } else {
        Ok(Some(slot))
    }
}
