//! Memory controller implementations for latency modeling.
//!
//! This module provides:
//! 1. **SimpleController:** Fixed latency per access (no row-buffer modeling).
//! 2. **DramController:** Row-buffer-aware latency (CAS, RAS, precharge) for DRAM-style timing.
//!
//! Main-memory modules consult their controller for every access to the backing store.

use std::fmt;

use crate::common::addr::Cycle;
use crate::config::{MemoryController as ControllerKind, ModuleConfig};

/// Trait for memory controller implementations that report access latency in cycles.
pub trait MemoryController: fmt::Debug + Send + Sync {
    /// Returns the number of cycles required for an access to the given address.
    ///
    /// # Arguments
    ///
    /// * `addr` - Block address being accessed (may be used for row-buffer modeling).
    ///
    /// # Returns
    ///
    /// Latency in simulation cycles.
    fn access_latency(&mut self, addr: u64) -> Cycle;
}

/// Fixed-latency memory controller; every access takes the same number of cycles.
#[derive(Debug)]
pub struct SimpleController {
    latency: Cycle,
}

impl SimpleController {
    /// Creates a simple controller with the given fixed latency in cycles.
    pub const fn new(latency: Cycle) -> Self {
        Self { latency }
    }
}

impl MemoryController for SimpleController {
    fn access_latency(&mut self, _addr: u64) -> Cycle {
        self.latency
    }
}

/// DRAM-style controller with row buffer; models CAS, RAS, and precharge latencies.
#[derive(Debug)]
pub struct DramController {
    last_row: Option<u64>,
    t_cas: Cycle,
    t_ras: Cycle,
    t_pre: Cycle,
    row_mask: u64,
}

impl DramController {
    /// Creates a DRAM controller with the given timing parameters (in cycles).
    ///
    /// # Arguments
    ///
    /// * `t_cas` - Column access strobe latency.
    /// * `t_ras` - Row access strobe latency.
    /// * `t_pre` - Precharge latency.
    /// * `row_bytes` - Row size; a power of two.
    ///
    /// # Returns
    ///
    /// A new `DramController` with no row currently open.
    pub const fn new(t_cas: Cycle, t_ras: Cycle, t_pre: Cycle, row_bytes: u64) -> Self {
        Self {
            last_row: None,
            t_cas,
            t_ras,
            t_pre,
            row_mask: !(row_bytes - 1),
        }
    }
}

impl MemoryController for DramController {
    fn access_latency(&mut self, addr: u64) -> Cycle {
        let row = addr & self.row_mask;
        match self.last_row {
            Some(open_row) if open_row == row => self.t_cas,
            Some(_) => {
                self.last_row = Some(row);
                self.t_pre + self.t_ras + self.t_cas
            }
            None => {
                self.last_row = Some(row);
                self.t_ras + self.t_cas
            }
        }
    }
}

/// Builds the controller configured for a main-memory module.
pub fn build(config: &ModuleConfig) -> Box<dyn MemoryController> {
    match config.controller {
        ControllerKind::Simple => Box::new(SimpleController::new(config.latency)),
        ControllerKind::Dram => Box::new(DramController::new(
            config.t_cas,
            config.t_ras,
            config.t_pre,
            config.row_bytes,
        )),
    }
}
