//! Memory Access Types.
//!
//! This module defines the vocabulary shared by the timing cores and the memory system:
//! 1. **Identity:** Module and core handles (stable indices fixed at configuration time).
//! 2. **Access Kinds:** What a top-level request asks the hierarchy to do.
//! 3. **Outcomes:** The immediate answer to an access (`Hit`, `MissService`, `Retry`).
//! 4. **Completions:** The value delivered later by a scheduled completion event.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::addr::Cycle;

/// Stable index of a memory module within a simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub usize);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mod{}", self.0)
    }
}

/// Stable index of a timing core within a simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoreId(pub usize);

/// Kind of a top-level memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    /// Coherent read of one word.
    Load,

    /// Coherent write of one word; requires exclusive ownership.
    Store,

    /// Non-coherent write; completes on any valid copy without invalidating peers.
    NcStore,

    /// Removes the block from the module and every level above it, writing back dirty data.
    Invalidate,

    /// Writes dirty data to the next level while keeping a clean copy.
    WriteBack,
}

impl AccessKind {
    /// Returns true if the access modifies the data word it targets.
    #[inline]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Store | Self::NcStore)
    }
}

/// Who issued a top-level access, and therefore who receives its completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Requester {
    /// A pipeline timing core.
    Core(CoreId),
    /// A driver outside the simulated cores (tests, trace replay).
    External,
}

/// Handle identifying one admitted access until its completion is delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessToken(pub u64);

/// Immediate answer of a module to a top-level access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessOutcome {
    /// The block is present in a state that satisfies the access.
    Hit(AccessToken),
    /// The access was admitted and will be serviced by the hierarchy.
    MissService(AccessToken),
    /// The module cannot accept the access now; re-issue after a backoff.
    Retry,
}

impl AccessOutcome {
    /// Returns the token of an admitted access.
    pub const fn token(self) -> Option<AccessToken> {
        match self {
            Self::Hit(t) | Self::MissService(t) => Some(t),
            Self::Retry => None,
        }
    }
}

/// Result of a finished access, delivered by a scheduled completion event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Token returned when the access was admitted.
    pub token: AccessToken,
    /// Recipient of the completion.
    pub requester: Requester,
    /// Module the access was issued to.
    pub module: ModuleId,
    /// Kind of the access.
    pub kind: AccessKind,
    /// Byte address of the access.
    pub addr: u64,
    /// Word value loaded, or stored for writes.
    pub value: u64,
    /// Whether the access was a hit at admission.
    pub hit: bool,
    /// Cycle at which the access was admitted.
    pub issued: Cycle,
    /// Cycle at which the completion is delivered.
    pub completed: Cycle,
}
