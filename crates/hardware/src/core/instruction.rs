//! Instruction Stream Contract.
//!
//! The timing core does not decode or execute an ISA. It consumes an abstract stream of
//! instructions that carry just enough information to drive timing:
//! 1. **Kinds:** Fixed-latency ALU work, memory accesses, branches and no-ops.
//! 2. **Sources:** The `InstructionSource` trait feeding a core, and an in-memory trace.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::common::data::AccessKind;

/// What an instruction does, as far as timing is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InstKind {
    /// Arithmetic taking `latency` cycles after issue.
    Alu {
        /// Execution latency in cycles.
        latency: u64,
    },
    /// Coherent load of one word.
    Load {
        /// Byte address.
        addr: u64,
    },
    /// Coherent store of one word; issued only at the head of the reorder buffer.
    Store {
        /// Byte address.
        addr: u64,
        /// Word written.
        value: u64,
    },
    /// Non-coherent store; issued only at the head of the reorder buffer.
    NcStore {
        /// Byte address.
        addr: u64,
        /// Word written.
        value: u64,
    },
    /// Branch resolved one cycle after issue.
    Branch {
        /// Younger instructions are squashed and refetched on resolution.
        mispredicted: bool,
    },
    /// Single-cycle no-op.
    Nop,
}

/// One instruction of the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Program counter, used only for diagnostics.
    #[serde(default)]
    pub pc: u64,
    /// Timing behavior.
    #[serde(flatten)]
    pub kind: InstKind,
}

impl Instruction {
    /// Creates an instruction.
    pub const fn new(pc: u64, kind: InstKind) -> Self {
        Self { pc, kind }
    }

    /// Returns `(kind, addr, value)` for instructions that access memory.
    pub const fn memory_access(&self) -> Option<(AccessKind, u64, u64)> {
        match self.kind {
            InstKind::Load { addr } => Some((AccessKind::Load, addr, 0)),
            InstKind::Store { addr, value } => Some((AccessKind::Store, addr, value)),
            InstKind::NcStore { addr, value } => Some((AccessKind::NcStore, addr, value)),
            _ => None,
        }
    }

    /// Returns true for stores, which wait for the head of the reorder buffer.
    #[inline]
    pub const fn is_store(&self) -> bool {
        matches!(self.kind, InstKind::Store { .. } | InstKind::NcStore { .. })
    }

    /// Cycles from issue to completion for instructions that do not access memory.
    #[inline]
    pub const fn execute_latency(&self) -> u64 {
        match self.kind {
            InstKind::Alu { latency } if latency > 0 => latency,
            _ => 1,
        }
    }
}

/// Supplies instructions to a timing core in program order.
pub trait InstructionSource: Send {
    /// Returns the next instruction, or `None` once the stream is exhausted.
    fn next_instruction(&mut self) -> Option<Instruction>;
}

/// Instruction source backed by a finite, pre-recorded list.
#[derive(Clone, Debug, Default)]
pub struct TraceSource {
    insts: VecDeque<Instruction>,
}

impl TraceSource {
    /// Creates a source that yields `insts` in order.
    pub fn new(insts: impl IntoIterator<Item = Instruction>) -> Self {
        Self {
            insts: insts.into_iter().collect(),
        }
    }

    /// Instructions not yet handed out.
    pub fn remaining(&self) -> usize {
        self.insts.len()
    }
}

impl InstructionSource for TraceSource {
    fn next_instruction(&mut self) -> Option<Instruction> {
        self.insts.pop_front()
    }
}
