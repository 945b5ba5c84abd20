//! Checkpoints.
//!
//! A checkpoint captures the architectural memory state of a quiescent simulation: every
//! valid block frame with its coherence state, directory entry and data, plus the contents
//! of the backing store. Transient state (frames, pending events, port and link occupancy,
//! replacement history) is not part of a checkpoint, so one can only be taken when nothing
//! is in flight.
//!
//! Modules and directory sharers are recorded by name, so a checkpoint can be restored
//! into any simulation whose modules have the same names and geometries.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::addr::Cycle;
use crate::common::error::SimError;
use crate::core::units::cache::{BlockState, Slot};
use crate::soc::memory::MemorySystem;

/// Format version written into every checkpoint.
pub const CHECKPOINT_VERSION: u32 = 1;

/// One valid block frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockImage {
    /// Set index.
    pub set: usize,
    /// Way index.
    pub way: usize,
    /// Block-aligned address.
    pub tag: u64,
    /// Coherence state.
    pub state: BlockState,
    /// Name of the upper module owning the block, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Names of the upper modules holding a copy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sharers: Vec<String>,
    /// Data words.
    pub data: Vec<u64>,
}

/// Contents of one module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleImage {
    /// Module name.
    pub name: String,
    /// Block size in bytes.
    pub block_size: u64,
    /// Number of sets.
    pub num_sets: usize,
    /// Associativity.
    pub num_ways: usize,
    /// Valid block frames.
    pub blocks: Vec<BlockImage>,
}

/// Serializable image of a quiescent memory system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Format version.
    pub version: u32,
    /// Cycle at which the checkpoint was taken.
    pub cycle: Cycle,
    /// Module contents, in configuration order.
    pub modules: Vec<ModuleImage>,
    /// Backing-store blocks, in address order.
    pub backing: Vec<(u64, Vec<u64>)>,
}

impl Checkpoint {
    /// Captures the state of `memory`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Checkpoint` if a transaction is still in flight.
    pub fn capture(memory: &MemorySystem, cycle: Cycle) -> Result<Self, SimError> {
        if !memory.is_quiescent() {
            return Err(SimError::Checkpoint(format!(
                "memory system is not quiescent at cycle {cycle} ({} transactions in flight)",
                memory.live_frames()
            )));
        }

        let name_of = |id: crate::common::data::ModuleId| {
            memory
                .module(id)
                .map_or_else(|| id.to_string(), |m| m.name().to_string())
        };

        let modules = memory
            .modules()
            .iter()
            .map(|m| {
                let g = m.geometry();
                let blocks = m
                    .cache
                    .iter()
                    .filter(|(_, b)| b.state.is_valid())
                    .map(|(slot, b)| {
                        let entry = m.dir.entry(slot);
                        BlockImage {
                            set: slot.set,
                            way: slot.way,
                            tag: b.tag,
                            state: b.state,
                            owner: entry.owner.map(name_of),
                            sharers: entry.sharers.iter().map(|&s| name_of(s)).collect(),
                            data: b.data.clone(),
                        }
                    })
                    .collect();
                ModuleImage {
                    name: m.name().to_string(),
                    block_size: g.block_size,
                    num_sets: g.num_sets,
                    num_ways: g.num_ways,
                    blocks,
                }
            })
            .collect();

        let backing = memory
            .backing()
            .iter()
            .map(|(b, d)| (b, d.to_vec()))
            .collect();

        Ok(Self {
            version: CHECKPOINT_VERSION,
            cycle,
            modules,
            backing,
        })
    }

    /// Loads the captured state into a freshly built `memory`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Checkpoint` on a version mismatch, an unknown module name, a
    /// geometry mismatch, a block frame outside the module's geometry, or restored
    /// contents that break coherence (conflicting owners, broken inclusion, a directory
    /// that disagrees with the copies above it).
    pub fn restore(&self, memory: &mut MemorySystem) -> Result<(), SimError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(SimError::Checkpoint(format!(
                "unsupported checkpoint version {}",
                self.version
            )));
        }
        if !memory.is_quiescent() {
            return Err(SimError::Checkpoint(
                "cannot restore into a busy memory system".to_string(),
            ));
        }

        let lookup = |memory: &MemorySystem, name: &str| {
            memory
                .find(name)
                .ok_or_else(|| SimError::Checkpoint(format!("unknown module '{name}'")))
        };

        for image in &self.modules {
            let id = lookup(memory, &image.name)?;
            let mut resolved = Vec::with_capacity(image.blocks.len());
            for b in &image.blocks {
                let owner = b.owner.as_deref().map(|n| lookup(memory, n)).transpose()?;
                let sharers = b
                    .sharers
                    .iter()
                    .map(|n| lookup(memory, n))
                    .collect::<Result<Vec<_>, _>>()?;
                resolved.push((b, owner, sharers));
            }

            let m = &mut memory.modules[id.0];
            let g = *m.geometry();
            if (g.block_size, g.num_sets, g.num_ways)
                != (image.block_size, image.num_sets, image.num_ways)
            {
                return Err(SimError::Checkpoint(format!(
                    "module '{}' geometry differs from the checkpoint",
                    image.name
                )));
            }
            for (b, owner, sharers) in resolved {
                if b.set >= g.num_sets
                    || b.way >= g.num_ways
                    || b.data.len() != g.words_per_block()
                    || g.set_of(b.tag) != b.set
                {
                    return Err(SimError::Checkpoint(format!(
                        "module '{}': block {:#x} does not fit frame ({}, {})",
                        image.name, b.tag, b.set, b.way
                    )));
                }
                let slot = Slot {
                    set: b.set,
                    way: b.way,
                };
                let frame = m.cache.block_mut(slot);
                frame.tag = b.tag;
                frame.state = b.state;
                frame.transient = None;
                frame.evicting = false;
                frame.data.clone_from(&b.data);
                m.cache.fill(slot);

                let entry = m.dir.entry_mut(slot);
                entry.clear();
                entry.owner = owner;
                for s in sharers {
                    entry.add_sharer(s);
                }
            }
        }

        for (block, data) in &self.backing {
            memory.backing.write(*block, data.clone());
        }
        memory
            .check_invariants(self.cycle)
            .map_err(|e| SimError::Checkpoint(format!("inconsistent coherence state: {e}")))?;
        debug!(
            cycle = self.cycle,
            modules = self.modules.len(),
            backing = self.backing.len(),
            "checkpoint restored"
        );
        Ok(())
    }
}
