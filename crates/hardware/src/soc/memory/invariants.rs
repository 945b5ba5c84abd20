//! Coherence checker.
//!
//! Run after every event when `general.check_invariants` is set. The always-on checks hold
//! at every event boundary, including mid-transaction; directory exactness only holds once
//! no transaction is in flight.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::common::addr::Cycle;
use crate::common::data::ModuleId;
use crate::common::error::SimError;
use crate::core::units::cache::BlockState;

use super::MemorySystem;

type Copies = Vec<(ModuleId, BlockState)>;

impl MemorySystem {
    /// Checks every directory against the copies held by the modules above it.
    ///
    /// Always: at most one upper module holds a block in M or E, such a holder excludes
    /// every other valid upper copy, and a block valid above is valid below. When no
    /// transaction is in flight: the sharers are exactly the upper modules holding a valid
    /// copy, and the owner is the one holding it in M, E or O (or N after a non-coherent
    /// store on an owned copy).
    ///
    /// # Errors
    ///
    /// Returns `SimError::ProtocolViolation` naming the lower module and the block.
    pub fn check_invariants(&self, now: Cycle) -> Result<(), SimError> {
        let exact = self.frames.len() == 0;
        for low in &self.modules {
            if low.high.is_empty() {
                continue;
            }
            let mut above: BTreeMap<u64, Copies> = BTreeMap::new();
            for &up in &low.high {
                for (_, b) in self.modules[up.0].cache.iter() {
                    if b.state.is_valid() {
                        above.entry(b.tag).or_default().push((up, b.state));
                    }
                }
            }

            for (&block, copies) in &above {
                let exclusive = copies.iter().filter(|(_, s)| s.is_exclusive()).count();
                if exclusive > 1 || (exclusive == 1 && copies.len() > 1) {
                    return Err(self.violation(
                        now,
                        low.id,
                        block,
                        format!("conflicting copies above: {}", self.render(copies)),
                    ));
                }
                let Some(slot) = low.cache.find(block) else {
                    return Err(self.violation(
                        now,
                        low.id,
                        block,
                        format!("inclusion broken; held above by {}", self.render(copies)),
                    ));
                };
                if !exact {
                    continue;
                }

                let entry = low.dir.entry(slot);
                let holders: BTreeSet<ModuleId> = copies.iter().map(|&(m, _)| m).collect();
                if entry.sharers != holders {
                    return Err(self.violation(
                        now,
                        low.id,
                        block,
                        format!(
                            "directory sharers {:?} but copies {}",
                            entry.sharers,
                            self.render(copies)
                        ),
                    ));
                }
                let owners: Vec<ModuleId> = copies
                    .iter()
                    .filter(|(_, s)| matches!(s, BlockState::Modified | BlockState::Exclusive | BlockState::Owned))
                    .map(|&(m, _)| m)
                    .collect();
                let owner_ok = match (entry.owner, owners.as_slice()) {
                    (None, []) => true,
                    (Some(o), [h]) => o == *h,
                    (Some(o), []) => copies
                        .iter()
                        .any(|&(m, s)| m == o && s == BlockState::NonCoherent),
                    _ => false,
                };
                if !owner_ok {
                    return Err(self.violation(
                        now,
                        low.id,
                        block,
                        format!(
                            "directory owner {:?} but copies {}",
                            entry.owner,
                            self.render(copies)
                        ),
                    ));
                }
            }

            if exact {
                for (slot, b) in low.cache.iter() {
                    let entry = low.dir.entry(slot);
                    let stale = if b.state.is_valid() {
                        !entry.sharers.is_empty() && !above.contains_key(&b.tag)
                    } else {
                        !entry.sharers.is_empty()
                    };
                    if stale {
                        return Err(self.violation(
                            now,
                            low.id,
                            b.tag,
                            format!("directory lists {:?} but no copy exists above", entry.sharers),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn render(&self, copies: &Copies) -> String {
        let mut out = String::new();
        for (i, (m, s)) in copies.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let name = self.modules.get(m.0).map_or("?", |m| m.name.as_str());
            let _ = write!(out, "{name}={}", s.letter());
        }
        out
    }
}
