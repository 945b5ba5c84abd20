//! Heterogeneous system simulator core.
//!
//! This crate implements a cycle-level simulator of a multi-level coherent memory system
//! driven by pipeline timing cores:
//! 1. **Events:** A discrete-event queue is the only clock; every component reacts to
//!    events scheduled on it.
//! 2. **Memory:** Caches and main memory kept coherent by a directory-based NMOESI protocol
//!    with MSHRs, ports, retries and write-back eviction.
//! 3. **Interconnect:** Bus, point-to-point, ring and crossbar networks with per-link
//!    bandwidth and FIFO delivery between each pair of endpoints.
//! 4. **Cores:** Superscalar timing models issuing loads and stores, with squash recovery.
//! 5. **Simulation:** Configuration, statistics, invariant checking and checkpoints.

/// Common types and constants (addresses, access kinds, errors).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Timing cores (instruction stream, reorder buffer, tag arrays).
pub mod core;
/// Event queue, simulation driver and checkpoints.
pub mod sim;
/// Memory modules, coherence protocol and interconnect.
pub mod soc;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Error taxonomy.
pub use crate::common::error::{ConfigError, EventError, SimError};
/// Top-level simulation; construct with `Simulation::new`.
pub use crate::sim::Simulation;
