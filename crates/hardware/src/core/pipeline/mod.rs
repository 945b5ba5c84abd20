//! Pipeline bookkeeping structures.
//!
//! Holds the reorder buffer tracking in-flight instructions from dispatch to commit.

/// Reorder buffer: circular buffer for in-order commit and squash.
pub mod rob;
