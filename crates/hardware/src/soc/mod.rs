//! Memory Hierarchy and Interconnect.
//!
//! This module organizes the components below the timing cores: the coherent memory
//! modules, the network carrying their messages, and the builder assembling both from
//! configuration.

/// Memory system builder.
pub mod builder;

/// Network topologies, routing and link contention.
pub mod interconnect;

/// Coherent memory modules and protocol flows.
pub mod memory;

pub use builder::build;
pub use memory::MemorySystem;
