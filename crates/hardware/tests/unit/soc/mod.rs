/// Directory and state scenarios across a three-cache hierarchy.
pub mod coherence;

/// Topologies and route checking.
pub mod interconnect;

/// Every access eventually completes under contention.
pub mod liveness;

/// Loads return values consistent with a sequential memory.
pub mod oracle;

/// Eviction races and random plans over small multi-level hierarchies.
pub mod stress;
