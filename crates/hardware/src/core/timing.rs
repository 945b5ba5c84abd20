//! Pipeline Timing Core.
//!
//! A superscalar timing model that drives the memory system with the accesses of an
//! instruction stream. Each tick runs the stages in reverse order so that a slot freed
//! by a later stage is visible to an earlier one only in the next cycle:
//! 1. **Commit:** Retires completed instructions from the ROB head.
//! 2. **Complete:** Finishes instructions whose execution latency elapsed and resolves
//!    branches, squashing younger work on a misprediction.
//! 3. **Issue:** Sends ready instructions to execution; memory instructions go to the
//!    entry module in program order, stores only from the ROB head.
//! 4. **Dispatch:** Moves fetched instructions into the ROB and issue queue.
//! 5. **Fetch:** Pulls instructions from the refetch queue, then from the source.
//!
//! Memory completions arrive asynchronously through `on_complete`.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, trace};

use crate::common::addr::Cycle;
use crate::common::data::{AccessOutcome, AccessToken, Completion, CoreId, ModuleId, Requester};
use crate::common::error::SimError;
use crate::config::CoreConfig;
use crate::core::instruction::{InstKind, Instruction, InstructionSource};
use crate::core::pipeline::rob::{Rob, RobState, RobTag};
use crate::soc::memory::{MemorySystem, Queue};
use crate::stats::CoreStats;

/// One timing core bound to an entry module.
pub struct TimingCore {
    id: CoreId,
    name: String,
    entry: ModuleId,
    config: CoreConfig,
    source: Option<Box<dyn InstructionSource>>,
    exhausted: bool,
    refetch: VecDeque<Instruction>,
    fetch_queue: VecDeque<Instruction>,
    rob: Rob,
    iq: VecDeque<RobTag>,
    outstanding: BTreeMap<AccessToken, RobTag>,
    fetch_stall_until: Cycle,
    pub(crate) ticking: bool,
    stats: CoreStats,
}

impl std::fmt::Debug for TimingCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingCore")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("rob", &self.rob.len())
            .field("outstanding", &self.outstanding.len())
            .finish_non_exhaustive()
    }
}

impl TimingCore {
    /// Creates an idle core with no instruction source.
    ///
    /// # Arguments
    ///
    /// * `id` - Index of the core in the simulation.
    /// * `config` - Validated pipeline parameters.
    /// * `entry` - Module receiving the core's memory accesses.
    pub fn new(id: CoreId, config: &CoreConfig, entry: ModuleId) -> Self {
        Self {
            id,
            name: config.name.clone(),
            entry,
            config: config.clone(),
            source: None,
            exhausted: true,
            refetch: VecDeque::new(),
            fetch_queue: VecDeque::with_capacity(config.fetch_queue_size),
            rob: Rob::new(config.rob_size),
            iq: VecDeque::with_capacity(config.iq_size),
            outstanding: BTreeMap::new(),
            fetch_stall_until: 0,
            ticking: false,
            stats: CoreStats::default(),
        }
    }

    /// Core name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Core handle.
    pub const fn id(&self) -> CoreId {
        self.id
    }

    /// Entry module.
    pub const fn entry(&self) -> ModuleId {
        self.entry
    }

    /// Counters.
    pub const fn stats(&self) -> &CoreStats {
        &self.stats
    }

    /// Reorder buffer, for inspection.
    pub const fn rob(&self) -> &Rob {
        &self.rob
    }

    /// Memory accesses issued and not yet completed.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Replaces the instruction source.
    pub fn attach(&mut self, source: Box<dyn InstructionSource>) {
        self.source = Some(source);
        self.exhausted = false;
    }

    /// Returns true once the source is exhausted and every instruction has retired.
    pub fn is_done(&self) -> bool {
        self.exhausted
            && self.refetch.is_empty()
            && self.fetch_queue.is_empty()
            && self.rob.is_empty()
    }

    /// Advances the pipeline by one cycle.
    ///
    /// # Errors
    ///
    /// Propagates errors raised by the memory system while issuing accesses.
    pub fn tick(&mut self, memory: &mut MemorySystem, q: &mut Queue) -> Result<(), SimError> {
        let now = q.now();
        self.stats.cycles += 1;
        self.commit();
        self.complete(memory, q, now);
        self.issue(memory, q, now)?;
        self.dispatch();
        self.fetch(now);
        Ok(())
    }

    /// Delivers a memory completion.
    ///
    /// Completions for tokens the core no longer tracks are counted and dropped.
    pub fn on_complete(&mut self, completion: &Completion) {
        match self.outstanding.remove(&completion.token) {
            Some(tag) => {
                self.rob.complete(tag, completion.value);
                trace!(
                    core = %self.name,
                    token = completion.token.0,
                    value = completion.value,
                    cycle = completion.completed,
                    "memory access completed"
                );
            }
            None => {
                self.stats.dropped_completions += 1;
                debug!(core = %self.name, token = completion.token.0, "dropped stale completion");
            }
        }
    }

    /// Squashes every instruction younger than `tag` and queues it for refetch.
    ///
    /// Outstanding accesses of squashed instructions have their completions cancelled.
    /// Fetch resumes after the configured misprediction penalty.
    ///
    /// # Returns
    ///
    /// Number of instructions removed from the ROB.
    pub fn squash(&mut self, memory: &mut MemorySystem, q: &mut Queue, tag: RobTag) -> usize {
        let flushed = self.rob.flush_after(tag);
        let n = flushed.len();

        let mut replay: VecDeque<Instruction> = flushed.iter().filter_map(|e| e.inst).collect();
        replay.extend(self.fetch_queue.drain(..));
        replay.append(&mut self.refetch);
        self.refetch = replay;

        for e in &flushed {
            if let Some(token) = e.token {
                let _ = self.outstanding.remove(&token);
                let _ = memory.cancel_completion(q, token);
            }
        }
        let rob = &self.rob;
        self.iq.retain(|&t| rob.position(t).is_some());

        self.fetch_stall_until = q.now() + self.config.mispredict_penalty;
        self.stats.squashes += 1;
        self.stats.squashed += n as u64;
        debug!(core = %self.name, squashed = n, cycle = q.now(), "pipeline squashed");
        n
    }

    fn commit(&mut self) {
        for _ in 0..self.config.commit_width {
            match self.rob.commit_head() {
                Some(_) => self.stats.committed += 1,
                None => break,
            }
        }
    }

    fn complete(&mut self, memory: &mut MemorySystem, q: &mut Queue, now: Cycle) {
        let mut mispredict = None;
        let mut finished = Vec::new();
        for e in self.rob.iter() {
            if e.state != RobState::Issued || e.token.is_some() || e.ready_at > now {
                continue;
            }
            let Some(inst) = e.inst else { continue };
            if inst.memory_access().is_some() {
                continue;
            }
            finished.push(e.tag);
            if let InstKind::Branch { mispredicted: true } = inst.kind {
                mispredict = Some(e.tag);
                break;
            }
        }
        for tag in finished {
            self.rob.complete(tag, 0);
        }
        if let Some(tag) = mispredict {
            let _ = self.squash(memory, q, tag);
        }
    }

    fn issue(&mut self, memory: &mut MemorySystem, q: &mut Queue, now: Cycle) -> Result<(), SimError> {
        let head = self.rob.peek_head().map(|e| e.tag);
        let mut issued = 0;
        let mut memory_blocked = false;
        let mut i = 0;
        while i < self.iq.len() && issued < self.config.issue_width {
            let tag = self.iq[i];
            let Some(inst) = self.rob.find_entry(tag).and_then(|e| e.inst) else {
                let _ = self.iq.remove(i);
                continue;
            };

            let Some((kind, addr, value)) = inst.memory_access() else {
                if let Some(e) = self.rob.find_entry_mut(tag) {
                    e.state = RobState::Issued;
                    e.ready_at = now + inst.execute_latency();
                }
                let _ = self.iq.remove(i);
                issued += 1;
                self.stats.issued += 1;
                continue;
            };

            // Memory instructions leave in program order.
            if memory_blocked {
                i += 1;
                continue;
            }
            memory_blocked = true;
            let retry_at = self.rob.find_entry(tag).map_or(0, |e| e.retry_at);
            if retry_at > now || (inst.is_store() && head != Some(tag)) {
                i += 1;
                continue;
            }
            if self.outstanding.len() >= self.config.max_outstanding {
                self.stats.stalls_memory += 1;
                i += 1;
                continue;
            }

            match memory.access(q, self.entry, kind, addr, value, Requester::Core(self.id))? {
                AccessOutcome::Hit(token) | AccessOutcome::MissService(token) => {
                    let _ = self.outstanding.insert(token, tag);
                    if let Some(e) = self.rob.find_entry_mut(tag) {
                        e.state = RobState::Issued;
                        e.token = Some(token);
                    }
                    let _ = self.iq.remove(i);
                    issued += 1;
                    self.stats.issued += 1;
                    memory_blocked = false;
                }
                AccessOutcome::Retry => {
                    self.stats.memory_retries += 1;
                    if let Some(e) = self.rob.find_entry_mut(tag) {
                        e.retry_at = now + self.config.retry_backoff.max(1);
                    }
                    i += 1;
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self) {
        for _ in 0..self.config.decode_width {
            if self.fetch_queue.is_empty() {
                break;
            }
            if self.rob.is_full() {
                self.stats.stalls_rob += 1;
                break;
            }
            if self.iq.len() >= self.config.iq_size {
                self.stats.stalls_iq += 1;
                break;
            }
            let Some(inst) = self.fetch_queue.pop_front() else { break };
            if let Some(tag) = self.rob.allocate(inst) {
                self.iq.push_back(tag);
                self.stats.dispatched += 1;
            }
        }
    }

    fn fetch(&mut self, now: Cycle) {
        if now < self.fetch_stall_until {
            self.stats.stalls_redirect += 1;
            return;
        }
        for _ in 0..self.config.fetch_width {
            if self.fetch_queue.len() >= self.config.fetch_queue_size {
                break;
            }
            let next = match self.refetch.pop_front() {
                Some(inst) => Some(inst),
                None if self.exhausted => None,
                None => self.source.as_mut().and_then(|s| s.next_instruction()),
            };
            match next {
                Some(inst) => {
                    self.fetch_queue.push_back(inst);
                    self.stats.fetched += 1;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
    }
}
