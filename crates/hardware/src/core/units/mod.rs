//! Storage units.
//!
//! This module contains the set-associative tag array used by every memory module,
//! together with its replacement policies.

/// Tag array with NMOESI block states and replacement policies (FIFO, LRU, Random).
pub mod cache;
