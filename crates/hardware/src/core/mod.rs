//! Pipeline timing cores.
//!
//! This module contains the timing side of the simulator: the instruction stream
//! contract, the reorder buffer, the core that drives the memory system, and the
//! storage structures shared with the memory modules.

/// Instruction kinds and sources.
pub mod instruction;

/// Reorder buffer.
pub mod pipeline;

/// Superscalar timing core.
pub mod timing;

/// Storage units (tag arrays and replacement policies).
pub mod units;

pub use self::instruction::{InstKind, Instruction, InstructionSource, TraceSource};
pub use self::timing::TimingCore;
