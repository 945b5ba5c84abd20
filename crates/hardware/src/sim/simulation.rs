//! Simulation: owns the event queue, the memory system and the timing cores.
//!
//! The event queue is the only clock. Every component reacts to events dispatched to the
//! `Machine`, which routes them by variant:
//! 1. **Frames:** Protocol transactions resumed by handle.
//! 2. **Packets:** Messages arriving from the interconnect.
//! 3. **Ticks:** One pipeline cycle of a core; a core keeps ticking while it has work.
//! 4. **Completions:** Finished accesses delivered to their requester.
//! 5. **External accesses:** Accesses scheduled by a driver, re-issued on `Retry`.

use std::fmt;

use tracing::{debug, info};

use crate::common::addr::Cycle;
use crate::common::data::{AccessKind, AccessOutcome, Completion, CoreId, ModuleId, Requester};
use crate::common::error::{ConfigError, SimError};
use crate::config::Config;
use crate::core::instruction::InstructionSource;
use crate::core::timing::TimingCore;
use crate::core::units::cache::BlockState;
use crate::sim::checkpoint::Checkpoint;
use crate::sim::event::{EventHandle, EventHandler, EventQueue, RunSummary, TraceRecord};
use crate::soc::memory::directory::DirEntry;
use crate::soc::memory::frame::FrameId;
use crate::soc::memory::message::Packet;
use crate::soc::memory::module::Module;
use crate::soc::memory::MemorySystem;
use crate::stats::SimStats;

/// An access issued by a driver rather than a core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExternalAccess {
    /// Entry module.
    pub module: ModuleId,
    /// Kind of access.
    pub kind: AccessKind,
    /// Byte address.
    pub addr: u64,
    /// Word to store.
    pub value: u64,
    /// Times the access was rejected so far.
    pub attempts: u32,
}

/// Payload of every event in a simulation.
#[derive(Clone, Debug)]
pub enum SimEvent {
    /// Resume a protocol transaction.
    Frame(FrameId),
    /// A packet reached its destination module.
    Arrive(Packet),
    /// Advance a core by one cycle.
    Tick(CoreId),
    /// Deliver a finished access.
    Complete(Completion),
    /// Issue a driver access.
    External(ExternalAccess),
}

/// Event handler owning all simulated state.
pub(crate) struct Machine {
    pub(crate) memory: MemorySystem,
    pub(crate) cores: Vec<TimingCore>,
    pub(crate) completions: Vec<Completion>,
    check_invariants: bool,
}

impl Machine {
    fn external(&mut self, q: &mut EventQueue<SimEvent>, mut x: ExternalAccess) -> Result<(), SimError> {
        let outcome = self
            .memory
            .access(q, x.module, x.kind, x.addr, x.value, Requester::External)?;
        if outcome != AccessOutcome::Retry {
            return Ok(());
        }

        x.attempts += 1;
        let max = self.memory.max_retries();
        let Some(m) = self.memory.module(x.module) else {
            return Err(SimError::InvalidRequest(format!("no module {}", x.module)));
        };
        if x.attempts > max {
            return Err(SimError::RetryLimit {
                cycle: q.now(),
                module: m.name().to_string(),
                addr: x.addr,
                retries: max,
            });
        }
        let base = m.retry_latency.max(1);
        let delay = self.memory.backoff(base);
        let _ = q.schedule_after(delay, SimEvent::External(x));
        Ok(())
    }
}

impl EventHandler for Machine {
    type Event = SimEvent;

    fn handle(&mut self, event: SimEvent, q: &mut EventQueue<SimEvent>) -> Result<(), SimError> {
        match event {
            SimEvent::Frame(id) => self.memory.resume(q, id)?,
            SimEvent::Arrive(packet) => self.memory.receive(q, packet)?,
            SimEvent::Tick(id) => {
                let core = &mut self.cores[id.0];
                core.tick(&mut self.memory, q)?;
                if core.is_done() {
                    core.ticking = false;
                    debug!(core = %core.name(), cycle = q.now(), "core drained");
                } else {
                    let _ = q.schedule_after(1, SimEvent::Tick(id));
                }
            }
            SimEvent::Complete(c) => {
                self.memory.delivered(c.token);
                match c.requester {
                    Requester::Core(id) => {
                        if let Some(core) = self.cores.get_mut(id.0) {
                            core.on_complete(&c);
                        }
                    }
                    Requester::External => self.completions.push(c),
                }
            }
            SimEvent::External(x) => self.external(q, x)?,
        }
        if self.check_invariants {
            self.memory.check_invariants(q.now())?;
        }
        Ok(())
    }
}

/// A complete simulation: configuration, event queue, memory system and cores.
pub struct Simulation {
    config: Config,
    queue: EventQueue<SimEvent>,
    machine: Machine,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.queue.now())
            .field("pending", &self.queue.len())
            .field("cores", &self.machine.cores.len())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Builds a simulation from a configuration.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` for any configuration problem.
    pub fn new(config: Config) -> Result<Self, SimError> {
        let memory = crate::soc::build(&config)?;
        let cores = config
            .cores
            .iter()
            .enumerate()
            .map(|(i, cc)| {
                let entry = memory.find(&cc.entry).ok_or_else(|| ConfigError::UnknownModule {
                    owner: cc.name.clone(),
                    name: cc.entry.clone(),
                })?;
                Ok(TimingCore::new(CoreId(i), cc, entry))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut queue = EventQueue::new(
            config.general.max_events_per_cycle,
            config.general.overload_events,
        );
        if config.general.record_trace {
            queue.enable_trace();
        }
        info!(
            modules = memory.modules().len(),
            cores = cores.len(),
            seed = config.general.seed,
            "simulation built"
        );

        let check_invariants = config.general.check_invariants;
        Ok(Self {
            config,
            queue,
            machine: Machine {
                memory,
                cores,
                completions: Vec::new(),
                check_invariants,
            },
        })
    }

    /// Configuration the simulation was built from.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Current cycle.
    pub fn now(&self) -> Cycle {
        self.queue.now()
    }

    /// Events waiting to be dispatched.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// The memory system.
    pub const fn memory(&self) -> &MemorySystem {
        &self.machine.memory
    }

    /// Looks up a module by name.
    pub fn module(&self, name: &str) -> Option<&Module> {
        let id = self.machine.memory.find(name)?;
        self.machine.memory.module(id)
    }

    /// Looks up a core by name.
    pub fn core(&self, name: &str) -> Option<&TimingCore> {
        self.machine.cores.iter().find(|c| c.name() == name)
    }

    fn module_id(&self, name: &str) -> Result<ModuleId, SimError> {
        self.machine
            .memory
            .find(name)
            .ok_or_else(|| SimError::InvalidRequest(format!("unknown module '{name}'")))
    }

    /// Feeds a core with instructions and starts ticking it.
    ///
    /// # Errors
    ///
    /// Returns `SimError::InvalidRequest` if no core has that name.
    pub fn attach_source(
        &mut self,
        core: &str,
        source: Box<dyn InstructionSource>,
    ) -> Result<(), SimError> {
        let c = self
            .machine
            .cores
            .iter_mut()
            .find(|c| c.name() == core)
            .ok_or_else(|| SimError::InvalidRequest(format!("unknown core '{core}'")))?;
        c.attach(source);
        if !c.ticking {
            c.ticking = true;
            let _ = self.queue.schedule_after(1, SimEvent::Tick(c.id()));
        }
        Ok(())
    }

    /// Issues an access at the current cycle.
    ///
    /// # Arguments
    ///
    /// * `module` - Name of an entry module.
    /// * `kind` - What the access does.
    /// * `addr` - Byte address.
    /// * `value` - Word to store.
    ///
    /// # Returns
    ///
    /// The module's immediate answer. The completion of an admitted access appears in
    /// `completions()` once the run reaches its cycle.
    ///
    /// # Errors
    ///
    /// Returns `SimError::InvalidRequest` for unknown or non-entry modules.
    pub fn access(
        &mut self,
        module: &str,
        kind: AccessKind,
        addr: u64,
        value: u64,
    ) -> Result<AccessOutcome, SimError> {
        let id = self.module_id(module)?;
        self.machine
            .memory
            .access(&mut self.queue, id, kind, addr, value, Requester::External)
    }

    /// Schedules an access `delay` cycles from now; rejected attempts are re-issued.
    ///
    /// # Errors
    ///
    /// Returns `SimError::InvalidRequest` for unknown or non-entry modules, and
    /// `SimError::Event` for a negative delay.
    pub fn schedule_access(
        &mut self,
        delay: i64,
        module: &str,
        kind: AccessKind,
        addr: u64,
        value: u64,
    ) -> Result<EventHandle, SimError> {
        let id = self.module_id(module)?;
        if self.module(module).is_some_and(|m| !m.is_entry()) {
            return Err(SimError::InvalidRequest(format!(
                "module '{module}' has upper levels and accepts no direct accesses"
            )));
        }
        let x = ExternalAccess {
            module: id,
            kind,
            addr,
            value,
            attempts: 0,
        };
        Ok(self.queue.schedule(delay, SimEvent::External(x))?)
    }

    /// Runs until no events remain or the configured cycle limit is reached.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while dispatching.
    pub fn run(&mut self) -> Result<RunSummary, SimError> {
        let limit = self.config.general.max_cycles;
        self.run_limited(limit)
    }

    /// Runs until no events remain or the next event lies beyond `cycle`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while dispatching.
    pub fn run_until(&mut self, cycle: Cycle) -> Result<RunSummary, SimError> {
        self.run_limited(Some(cycle))
    }

    fn run_limited(&mut self, limit: Option<Cycle>) -> Result<RunSummary, SimError> {
        let summary = self.queue.run(&mut self.machine, limit)?;
        info!(
            cycle = summary.cycle,
            dispatched = summary.dispatched,
            finish = ?summary.finish,
            "run stopped"
        );
        Ok(summary)
    }

    /// State of the block containing `addr` in `module`.
    pub fn block_state(&self, module: &str, addr: u64) -> Option<BlockState> {
        self.module(module).map(|m| m.block_state(addr))
    }

    /// Directory entry of the block containing `addr` in `module`, if present.
    pub fn directory_entry(&self, module: &str, addr: u64) -> Option<&DirEntry> {
        self.module(module)?.directory_entry(addr)
    }

    /// Names of the modules in a directory entry's sharer set.
    pub fn sharers(&self, module: &str, addr: u64) -> Vec<String> {
        self.directory_entry(module, addr)
            .map(|e| {
                e.sharers
                    .iter()
                    .filter_map(|&s| self.machine.memory.module(s).map(|m| m.name().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Name of the module owning the block containing `addr`, per `module`'s directory.
    pub fn owner(&self, module: &str, addr: u64) -> Option<String> {
        let owner = self.directory_entry(module, addr)?.owner?;
        self.machine
            .memory
            .module(owner)
            .map(|m| m.name().to_string())
    }

    /// Word stored for `addr` in `module`'s copy, if it holds a valid one.
    pub fn peek_word(&self, module: &str, addr: u64) -> Option<u64> {
        self.module(module)?.peek_word(addr)
    }

    /// Completions delivered to external requesters so far.
    pub fn completions(&self) -> &[Completion] {
        &self.machine.completions
    }

    /// Removes and returns the delivered external completions.
    pub fn take_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.machine.completions)
    }

    /// Cancels the completion of an external access.
    pub fn cancel_completion(&mut self, token: crate::common::data::AccessToken) -> bool {
        self.machine
            .memory
            .cancel_completion(&mut self.queue, token)
    }

    /// Returns true when no event is pending and no transaction is in flight.
    pub fn is_quiescent(&self) -> bool {
        self.queue.is_empty() && self.machine.memory.is_quiescent()
    }

    /// Checks the coherence invariants now.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ProtocolViolation` describing the first broken invariant.
    pub fn check_invariants(&self) -> Result<(), SimError> {
        self.machine.memory.check_invariants(self.queue.now())
    }

    /// Snapshot of every counter.
    pub fn stats(&self) -> SimStats {
        let memory = &self.machine.memory;
        SimStats {
            cycles: self.queue.now(),
            events: self.queue.total_dispatched(),
            modules: memory
                .modules()
                .iter()
                .map(|m| (m.name().to_string(), m.stats().clone()))
                .collect(),
            cores: self
                .machine
                .cores
                .iter()
                .map(|c| (c.name().to_string(), c.stats().clone()))
                .collect(),
            network: memory.network().stats().clone(),
        }
    }

    /// Dispatched events, if tracing was enabled in the configuration.
    pub fn trace(&self) -> Option<&[TraceRecord]> {
        self.queue.trace()
    }

    /// Writes a checkpoint of the memory state as JSON.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Checkpoint` unless the simulation is quiescent and every core
    /// has drained.
    pub fn serialize(&self) -> Result<String, SimError> {
        if !self.queue.is_empty() || self.machine.cores.iter().any(|c| !c.is_done()) {
            return Err(SimError::Checkpoint(format!(
                "{} events pending at cycle {}",
                self.queue.len(),
                self.queue.now()
            )));
        }
        let checkpoint = Checkpoint::capture(&self.machine.memory, self.queue.now())?;
        Ok(serde_json::to_string_pretty(&checkpoint)?)
    }

    /// Builds a simulation from `config` and restores a checkpoint written by `serialize`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` for configuration problems and `SimError::Checkpoint`
    /// when the checkpoint is malformed or does not match the configuration.
    pub fn deserialize(config: Config, json: &str) -> Result<Self, SimError> {
        let checkpoint: Checkpoint = serde_json::from_str(json)?;
        let mut sim = Self::new(config)?;
        checkpoint.restore(&mut sim.machine.memory)?;
        sim.queue.set_now(checkpoint.cycle)?;
        info!(cycle = checkpoint.cycle, "simulation restored from checkpoint");
        Ok(sim)
    }
}
