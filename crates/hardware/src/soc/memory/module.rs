//! Memory module.
//!
//! A module is one cache level (or main memory): a tag array, a directory covering the
//! modules directly above it, a set of ports, and a miss-status holding budget for
//! top-level accesses. All protocol behavior lives in the memory system; the module
//! holds state and answers admission questions.

use std::collections::BTreeMap;

use crate::common::addr::{Cycle, Geometry};
use crate::common::data::ModuleId;
use crate::config::{ModuleConfig, ModuleKind};
use crate::core::units::cache::{BlockState, Slot, TagArray};
use crate::soc::interconnect::NodeId;
use crate::stats::ModuleStats;

use super::controller::{self, MemoryController};
use super::directory::{DirEntry, Directory};
use super::frame::FrameId;

/// Why a top-level access was not admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Another access to the same block is in flight at this module.
    BlockInFlight,
    /// Every MSHR is in use.
    MshrFull,
    /// Every port already started a request this cycle.
    PortsBusy,
    /// The block's frame is locked by another transaction.
    FrameBusy,
}

/// One cache level or main memory.
#[derive(Debug)]
pub struct Module {
    pub(crate) id: ModuleId,
    pub(crate) name: String,
    pub(crate) kind: ModuleKind,
    pub(crate) latency: Cycle,
    pub(crate) retry_latency: Cycle,
    pub(crate) cache: TagArray,
    pub(crate) dir: Directory,
    pub(crate) high: Vec<ModuleId>,
    pub(crate) low: Option<ModuleId>,
    pub(crate) node: NodeId,
    pub(crate) controller: Option<Box<dyn MemoryController>>,
    pub(crate) stats: ModuleStats,
    mshr_size: usize,
    mshr_in_use: usize,
    ports: Vec<Cycle>,
    in_flight: BTreeMap<u64, FrameId>,
}

impl Module {
    /// Creates a module from its configuration.
    ///
    /// # Arguments
    ///
    /// * `id` - Index of the module in the simulation.
    /// * `config` - Validated module configuration.
    /// * `node` - Interconnect node attached to the module.
    /// * `seed` - Seed for randomized replacement.
    pub(crate) fn new(id: ModuleId, config: &ModuleConfig, node: NodeId, seed: u64) -> Self {
        let geometry = Geometry::new(config.block_size, config.num_sets, config.num_ways);
        let controller = match config.kind {
            ModuleKind::MainMemory => Some(controller::build(config)),
            ModuleKind::Cache => None,
        };
        Self {
            id,
            name: config.name.clone(),
            kind: config.kind,
            latency: config.latency,
            retry_latency: config.retry_latency,
            cache: TagArray::new(geometry, config.eviction_policy, seed ^ id.0 as u64),
            dir: Directory::new(config.num_sets, config.num_ways),
            high: Vec::new(),
            low: None,
            node,
            controller,
            stats: ModuleStats::default(),
            mshr_size: config.mshr_count,
            mshr_in_use: 0,
            ports: vec![0; config.port_count],
            in_flight: BTreeMap::new(),
        }
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module handle.
    pub const fn id(&self) -> ModuleId {
        self.id
    }

    /// Cache or main memory.
    pub const fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Block/set/way geometry.
    pub const fn geometry(&self) -> &Geometry {
        self.cache.geometry()
    }

    /// Modules directly above this one.
    pub fn high(&self) -> &[ModuleId] {
        &self.high
    }

    /// Module directly below this one.
    pub const fn low(&self) -> Option<ModuleId> {
        self.low
    }

    /// Counters.
    pub const fn stats(&self) -> &ModuleStats {
        &self.stats
    }

    /// Returns true if top-level accesses may be issued to this module.
    pub fn is_entry(&self) -> bool {
        self.high.is_empty()
    }

    /// State of the block containing `addr`.
    pub fn block_state(&self, addr: u64) -> BlockState {
        let block = self.geometry().block_of(addr);
        self.cache
            .find(block)
            .map_or(BlockState::Invalid, |s| self.cache.block(s).state)
    }

    /// Directory entry of the block containing `addr`, if the block is present.
    pub fn directory_entry(&self, addr: u64) -> Option<&DirEntry> {
        let block = self.geometry().block_of(addr);
        self.cache.find(block).map(|s| self.dir.entry(s))
    }

    /// Word stored for `addr` in this module's copy, if valid.
    pub fn peek_word(&self, addr: u64) -> Option<u64> {
        let g = self.geometry();
        let block = g.block_of(addr);
        self.cache
            .find(block)
            .and_then(|s| self.cache.block(s).data.get(g.word_of(addr)).copied())
    }

    /// Checks whether a top-level access to `block` could be admitted at `now`.
    pub(crate) fn admission(&self, block: u64, now: Cycle) -> Result<(), Rejection> {
        if self.in_flight.contains_key(&block) {
            return Err(Rejection::BlockInFlight);
        }
        if self.mshr_in_use >= self.mshr_size {
            return Err(Rejection::MshrFull);
        }
        if !self.ports.iter().any(|&free| free <= now) {
            return Err(Rejection::PortsBusy);
        }
        Ok(())
    }

    /// Reserves the earliest available port.
    ///
    /// # Returns
    ///
    /// The cycle at which the request starts (at or after `now`).
    pub(crate) fn reserve_port(&mut self, now: Cycle) -> Cycle {
        let Some((i, &free)) = self.ports.iter().enumerate().min_by_key(|&(_, &c)| c) else {
            return now;
        };
        let start = free.max(now);
        self.ports[i] = start + 1;
        start
    }

    /// Records a top-level access as in flight.
    pub(crate) fn begin_access(&mut self, block: u64, frame: FrameId) {
        self.mshr_in_use += 1;
        let _ = self.in_flight.insert(block, frame);
    }

    /// Releases the resources of a finished top-level access.
    pub(crate) fn end_access(&mut self, block: u64) {
        self.mshr_in_use = self.mshr_in_use.saturating_sub(1);
        let _ = self.in_flight.remove(&block);
    }

    /// Accesses currently holding an MSHR.
    pub const fn mshr_in_use(&self) -> usize {
        self.mshr_in_use
    }

    /// Returns true if no transaction holds or waits for any resource of this module.
    pub fn is_quiescent(&self) -> bool {
        self.mshr_in_use == 0 && self.in_flight.is_empty() && self.dir.is_idle()
    }

    /// Backing-store latency for main-memory modules; tag latency otherwise.
    pub(crate) fn memory_latency(&mut self, block: u64) -> Cycle {
        match &mut self.controller {
            Some(c) => c.access_latency(block).max(1),
            None => self.latency,
        }
    }

    /// Returns true if `slot` is locked.
    pub(crate) fn is_locked(&self, slot: Slot) -> bool {
        self.dir.is_locked(slot)
    }
}
