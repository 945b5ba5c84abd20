//! Simulation driver.
//!
//! Provides the discrete-event queue, the simulation owning all components, and
//! checkpointing of quiescent memory state.

/// Checkpoint capture and restore.
pub mod checkpoint;

/// Discrete-event queue.
pub mod event;

/// Simulation and event routing.
pub mod simulation;

pub use simulation::{ExternalAccess, SimEvent, Simulation};
