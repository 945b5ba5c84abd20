//! Simulation statistics collection and reporting.
//!
//! This module tracks performance metrics of a run. It provides:
//! 1. **Module counters:** Hits, misses, invalidations, evictions, retries and latency per
//!    memory module.
//! 2. **Core counters:** Fetch, dispatch, issue, commit, squashes and stalls per timing core.
//! 3. **Interconnect counters:** Packets, bytes, latency and queueing delay.
//! 4. **Reporting:** A plain-text summary and serde serialization for machine consumption.

use std::io::{self, Write};

use serde::Serialize;

/// Counters of one memory module.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ModuleStats {
    /// Top-level accesses admitted.
    pub accesses: u64,
    /// Admitted accesses satisfied by the local copy.
    pub hits: u64,
    /// Admitted accesses that needed the hierarchy.
    pub misses: u64,
    /// Loads admitted.
    pub reads: u64,
    /// Coherent stores admitted.
    pub writes: u64,
    /// Non-coherent stores admitted.
    pub nc_writes: u64,
    /// Accesses rejected with `Retry` at admission.
    pub rejections: u64,
    /// Admitted accesses restarted after a nack.
    pub retries: u64,
    /// Requests from other modules processed.
    pub requests: u64,
    /// Requests answered with a nack.
    pub nacks: u64,
    /// Copies invalidated by down-up requests.
    pub invalidations: u64,
    /// Blocks evicted to make room or by `Invalidate`.
    pub evictions: u64,
    /// Dirty blocks written to the next level.
    pub writebacks: u64,
    /// Admitted accesses completed.
    pub completed: u64,
    /// Sum of completion latencies, in cycles.
    pub total_latency: u64,
}

impl ModuleStats {
    /// Average cycles from admission to completion.
    pub fn average_latency(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_latency as f64 / self.completed as f64
        }
    }

    /// Fraction of admitted accesses that hit.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Counters of one timing core.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CoreStats {
    /// Cycles the core was ticked.
    pub cycles: u64,
    /// Instructions fetched, including refetches after squashes.
    pub fetched: u64,
    /// Instructions dispatched into the reorder buffer.
    pub dispatched: u64,
    /// Instructions issued to execution or memory.
    pub issued: u64,
    /// Instructions retired.
    pub committed: u64,
    /// Squash events.
    pub squashes: u64,
    /// Instructions discarded by squashes.
    pub squashed: u64,
    /// Memory accesses rejected with `Retry`.
    pub memory_retries: u64,
    /// Completions that arrived for squashed accesses.
    pub dropped_completions: u64,
    /// Dispatch stalls on a full reorder buffer.
    pub stalls_rob: u64,
    /// Dispatch stalls on a full issue queue.
    pub stalls_iq: u64,
    /// Issue stalls on the outstanding-access limit.
    pub stalls_memory: u64,
    /// Fetch stalls after a squash.
    pub stalls_redirect: u64,
}

impl CoreStats {
    /// Retired instructions per cycle.
    pub fn ipc(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.committed as f64 / self.cycles as f64
        }
    }
}

/// Interconnect counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    /// Packets sent.
    pub packets: u64,
    /// Bytes sent.
    pub bytes: u64,
    /// Sum of send-to-arrival latencies.
    pub total_latency: u64,
    /// Sum of cycles spent waiting for busy links.
    pub queueing: u64,
}

impl NetworkStats {
    /// Average send-to-arrival latency.
    pub fn average_latency(&self) -> f64 {
        if self.packets == 0 {
            0.0
        } else {
            self.total_latency as f64 / self.packets as f64
        }
    }
}

/// Snapshot of every counter at the end of (or during) a run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SimStats {
    /// Current cycle.
    pub cycles: u64,
    /// Events dispatched.
    pub events: u64,
    /// Counters per module, in configuration order.
    pub modules: Vec<(String, ModuleStats)>,
    /// Counters per core, in configuration order.
    pub cores: Vec<(String, CoreStats)>,
    /// Interconnect counters.
    pub network: NetworkStats,
}

impl SimStats {
    /// Writes a plain-text summary.
    ///
    /// # Errors
    ///
    /// Propagates write errors from `out`.
    pub fn write_summary(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "\n==========================================================")?;
        writeln!(out, "SIMULATION STATISTICS")?;
        writeln!(out, "==========================================================")?;
        writeln!(out, "sim_cycles               {}", self.cycles)?;
        writeln!(out, "sim_events               {}", self.events)?;
        writeln!(out, "----------------------------------------------------------")?;
        for (name, c) in &self.cores {
            writeln!(out, "CORE {name}")?;
            writeln!(out, "  committed              {}", c.committed)?;
            writeln!(out, "  ipc                    {:.4}", c.ipc())?;
            writeln!(out, "  squashes               {} ({} insts)", c.squashes, c.squashed)?;
            writeln!(out, "  memory.retries         {}", c.memory_retries)?;
            writeln!(
                out,
                "  stalls rob/iq/mem      {}/{}/{}",
                c.stalls_rob, c.stalls_iq, c.stalls_memory
            )?;
        }
        writeln!(out, "----------------------------------------------------------")?;
        writeln!(out, "MEMORY MODULES")?;
        for (name, m) in &self.modules {
            writeln!(
                out,
                "  {:<10} acc {:>8}  hit {:>6.2}%  inv {:>6}  evict {:>6}  wb {:>6}  retry {:>6}  lat {:>8.2}",
                name,
                m.accesses,
                m.hit_rate() * 100.0,
                m.invalidations,
                m.evictions,
                m.writebacks,
                m.retries + m.rejections,
                m.average_latency()
            )?;
        }
        writeln!(out, "----------------------------------------------------------")?;
        writeln!(out, "INTERCONNECT")?;
        writeln!(out, "  packets                {}", self.network.packets)?;
        writeln!(out, "  bytes                  {}", self.network.bytes)?;
        writeln!(out, "  avg_latency            {:.2}", self.network.average_latency())?;
        writeln!(out, "  queueing               {}", self.network.queueing)?;
        writeln!(out, "==========================================================")?;
        Ok(())
    }
}
