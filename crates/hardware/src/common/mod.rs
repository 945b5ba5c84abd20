//! Common utilities and types used throughout the simulator.
//!
//! This module provides fundamental building blocks that are shared across all components
//! of the simulator. It includes:
//! 1. **Address Geometry:** Decomposition of byte addresses into block, set and word indices.
//! 2. **Constants:** Message header sizes and word width.
//! 3. **Access Types:** Memory access kinds, requester identity, tokens and completions.
//! 4. **Error Handling:** The error taxonomy shared by configuration, scheduling and protocol code.

/// Address geometry for set-associative structures.
pub mod addr;

/// Common constants used throughout the simulator.
pub mod constants;

/// Memory access type definitions.
pub mod data;

/// Error types.
pub mod error;

pub use addr::{Cycle, Geometry};
pub use data::{AccessKind, AccessOutcome, AccessToken, Completion, CoreId, ModuleId, Requester};
pub use error::{ConfigError, EventError, SimError};
