//! Error definitions.
//!
//! This module defines the error taxonomy of the simulator. It provides:
//! 1. **Configuration Errors:** Invalid geometry, topology or bindings, detected before a run.
//! 2. **Scheduling Errors:** Misuse of the event queue and runaway same-cycle processing.
//! 3. **Simulation Errors:** Protocol violations and other conditions that halt a run.
//!
//! Resource exhaustion is not an error: it is reported as `AccessOutcome::Retry`.
//! Interconnect congestion is absorbed as latency.

use thiserror::Error;

use super::addr::Cycle;

/// Invalid configuration, reported at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration could not be parsed.
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// No memory modules were configured.
    #[error("configuration declares no memory modules")]
    NoModules,

    /// Two modules or cores share a name.
    #[error("duplicate name '{0}'")]
    Duplicate(String),

    /// A name refers to a module that does not exist.
    #[error("'{owner}' refers to unknown module '{name}'")]
    UnknownModule {
        /// Entity holding the reference.
        owner: String,
        /// Missing module name.
        name: String,
    },

    /// Block size, set count or associativity is unusable.
    #[error("module '{module}': invalid geometry: {reason}")]
    Geometry {
        /// Offending module.
        module: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// A capacity or timing parameter is zero.
    #[error("'{owner}': {field} must be non-zero")]
    Zero {
        /// Module, core or network section.
        owner: String,
        /// Parameter name.
        field: &'static str,
    },

    /// The `low` links of the modules do not form chains ending in main memory.
    #[error("module '{module}': invalid hierarchy: {reason}")]
    Hierarchy {
        /// Offending module.
        module: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// The interconnect description is unusable.
    #[error("invalid topology: {0}")]
    Topology(String),

    /// Two modules that exchange messages have no route between them.
    #[error("no route from '{src}' to '{dst}'")]
    Unreachable {
        /// Sending module.
        src: String,
        /// Receiving module.
        dst: String,
    },

    /// A core is bound to a module that cannot accept top-level accesses.
    #[error("core '{core}': {reason}")]
    Core {
        /// Offending core.
        core: String,
        /// Human-readable explanation.
        reason: String,
    },
}

/// Misuse of the event queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// A negative delay was requested.
    #[error("cannot schedule with negative delay {delta}")]
    NegativeDelay {
        /// Requested delay.
        delta: i64,
    },

    /// An absolute cycle at or before the current cycle was requested.
    #[error("cannot schedule at cycle {cycle}: current cycle is {now}")]
    NotInFuture {
        /// Requested cycle.
        cycle: Cycle,
        /// Current cycle.
        now: Cycle,
    },

    /// More events than allowed were dispatched within one cycle.
    #[error("more than {limit} events dispatched in cycle {cycle}")]
    SameCycleOverflow {
        /// Cycle in which the bound was exceeded.
        cycle: Cycle,
        /// Configured bound.
        limit: u64,
    },
}

/// Fatal simulation error.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The coherence protocol reached a state it must never reach.
    #[error("protocol violation at cycle {cycle} in module '{module}' block {block:#x}: {detail}")]
    ProtocolViolation {
        /// Cycle at which the violation was detected.
        cycle: Cycle,
        /// Module name.
        module: String,
        /// Block address.
        block: u64,
        /// Description of the violated rule.
        detail: String,
    },

    /// Event queue misuse or runaway processing.
    #[error(transparent)]
    Event(#[from] EventError),

    /// An access kept being rejected past the configured retry bound.
    #[error("access to {addr:#x} at module '{module}' exceeded {retries} retries (cycle {cycle})")]
    RetryLimit {
        /// Cycle at which the bound was exceeded.
        cycle: Cycle,
        /// Module name.
        module: String,
        /// Byte address.
        addr: u64,
        /// Number of retries performed.
        retries: u32,
    },

    /// A request that the caller should never have made.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A checkpoint could not be taken or restored.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        Self::Checkpoint(e.to_string())
    }
}
