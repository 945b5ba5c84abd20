//! Configuration system for the simulator.
//!
//! This module defines all configuration structures and enums used to parameterize
//! a simulation. It provides:
//! 1. **Defaults:** Baseline module, interconnect and pipeline parameters.
//! 2. **Structures:** General settings, memory modules, the interconnect, and timing cores.
//! 3. **Enums:** Module kinds, eviction policies, memory controllers and topologies.
//! 4. **Validation:** `Config::validate` rejects malformed values before anything is built.
//!
//! Configuration is supplied as JSON (`Config::from_json`) or assembled in code from the
//! `Default` implementations.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::common::constants::MIN_BLOCK_BYTES;
use crate::common::error::ConfigError;

/// Default configuration constants for the simulator.
///
/// These values define the baseline configuration when a field is omitted from the JSON.
pub mod defaults {
    /// Same-cycle dispatch bound; exceeding it indicates an event loop.
    pub const MAX_EVENTS_PER_CYCLE: u64 = 100_000;

    /// Number of pending events above which the queue warns once.
    pub const OVERLOAD_EVENTS: usize = 10_000;

    /// Seed for retry jitter and random replacement.
    pub const SEED: u64 = 0x5EED;

    /// Retries a single access may take before the run is aborted.
    pub const MAX_RETRIES: u32 = 10_000;

    /// Default cache block size in bytes.
    pub const BLOCK_SIZE: u64 = 64;

    /// Default number of sets.
    pub const NUM_SETS: usize = 16;

    /// Default associativity.
    pub const NUM_WAYS: usize = 2;

    /// Default tag/data access latency in cycles.
    pub const LATENCY: u64 = 2;

    /// Default number of miss-status holding registers.
    pub const MSHR_COUNT: usize = 16;

    /// Default number of ports; each starts one request per cycle.
    pub const PORT_COUNT: usize = 2;

    /// Default base retry latency in cycles.
    pub const RETRY_LATENCY: u64 = 4;

    /// CAS (Column Access Strobe) latency in cycles.
    pub const T_CAS: u64 = 14;

    /// RAS (Row Access Strobe) latency in cycles.
    pub const T_RAS: u64 = 14;

    /// Precharge latency in cycles.
    pub const T_PRE: u64 = 14;

    /// DRAM row size in bytes.
    pub const ROW_BYTES: u64 = 2048;

    /// Default link bandwidth in bytes per cycle.
    pub const BANDWIDTH: u64 = 32;

    /// Default link latency in cycles.
    pub const LINK_LATENCY: u64 = 1;

    /// Default switch traversal latency in cycles.
    pub const SWITCH_LATENCY: u64 = 1;

    /// Default pipeline stage width.
    pub const WIDTH: usize = 2;

    /// Default fetch queue capacity.
    pub const FETCH_QUEUE: usize = 16;

    /// Default issue queue capacity.
    pub const IQ_SIZE: usize = 16;

    /// Default reorder buffer capacity.
    pub const ROB_SIZE: usize = 32;

    /// Default bound on outstanding memory accesses per core.
    pub const MAX_OUTSTANDING: usize = 8;

    /// Default cycles a core waits before re-issuing a rejected access.
    pub const RETRY_BACKOFF: u64 = 4;

    /// Default fetch redirect penalty after a squash.
    pub const MISPREDICT_PENALTY: u64 = 5;
}

/// Kind of a memory module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ModuleKind {
    /// A cache level with a directory for the levels above it.
    #[default]
    Cache,
    /// The last level; misses are served from the backing store.
    #[serde(alias = "Memory")]
    MainMemory,
}

/// Memory controller implementation types.
///
/// Used by main-memory modules to time accesses to the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MemoryController {
    /// Simple fixed-latency memory controller using the module latency.
    #[default]
    Simple,
    /// DRAM controller with row buffer modeling (CAS, RAS, precharge).
    #[serde(alias = "DRAM")]
    Dram,
}

/// Cache replacement policy algorithms.
///
/// Specifies the algorithm used to select which block to evict
/// when a new block must be installed in a full set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    /// Least Recently Used replacement policy.
    #[default]
    #[serde(alias = "Lru")]
    Lru,
    /// First In First Out replacement policy.
    ///
    /// Evicts the block that was filled earliest in the set.
    #[serde(alias = "Fifo")]
    Fifo,
    /// Random replacement policy, driven by the simulation seed.
    #[serde(alias = "Random")]
    Random,
}

/// Interconnect topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Topology {
    /// A single shared medium; every packet serializes on it.
    Bus,
    /// Explicitly configured links between modules.
    #[serde(alias = "P2P")]
    PointToPoint,
    /// One switch per module, switches connected in a bidirectional ring.
    Ring,
    /// One central switch with a dedicated uplink and downlink per module.
    #[default]
    Crossbar,
}

/// Root configuration structure containing all simulator settings.
///
/// # Examples
///
/// Deserializing a two-level hierarchy from JSON:
///
/// ```
/// use hetsim_core::config::{Config, ModuleKind, Topology};
///
/// let json = r#"{
///     "modules": [
///         { "name": "l1", "num_sets": 4, "num_ways": 2, "low": "mem" },
///         { "name": "mem", "kind": "MainMemory", "latency": 20 }
///     ],
///     "network": { "topology": "Bus", "bandwidth": 16 },
///     "cores": [ { "name": "cpu0", "entry": "l1" } ]
/// }"#;
///
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.modules[1].kind, ModuleKind::MainMemory);
/// assert_eq!(config.network.topology, Topology::Bus);
/// assert_eq!(config.cores[0].rob_size, 32);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General simulation settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// Memory modules, listed in any order
    pub modules: Vec<ModuleConfig>,
    /// Interconnect between the modules
    #[serde(default)]
    pub network: NetworkConfig,
    /// Pipeline timing cores
    #[serde(default)]
    pub cores: Vec<CoreConfig>,
}

/// General simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Stop the run once the next event lies beyond this cycle.
    #[serde(default)]
    pub max_cycles: Option<u64>,

    /// Upper bound on events dispatched within one cycle.
    #[serde(default = "GeneralConfig::default_max_events_per_cycle")]
    pub max_events_per_cycle: u64,

    /// Pending-event count above which the queue warns.
    #[serde(default = "GeneralConfig::default_overload_events")]
    pub overload_events: usize,

    /// Seed for every pseudo-random choice in the run.
    #[serde(default = "GeneralConfig::default_seed")]
    pub seed: u64,

    /// Retries a single access may take before the run is aborted.
    #[serde(default = "GeneralConfig::default_max_retries")]
    pub max_retries: u32,

    /// Check the coherence invariants after every event.
    #[serde(default)]
    pub check_invariants: bool,

    /// Record every dispatched event for trace comparison.
    #[serde(default)]
    pub record_trace: bool,
}

impl GeneralConfig {
    fn default_max_events_per_cycle() -> u64 {
        defaults::MAX_EVENTS_PER_CYCLE
    }

    fn default_overload_events() -> usize {
        defaults::OVERLOAD_EVENTS
    }

    fn default_seed() -> u64 {
        defaults::SEED
    }

    fn default_max_retries() -> u32 {
        defaults::MAX_RETRIES
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_cycles: None,
            max_events_per_cycle: defaults::MAX_EVENTS_PER_CYCLE,
            overload_events: defaults::OVERLOAD_EVENTS,
            seed: defaults::SEED,
            max_retries: defaults::MAX_RETRIES,
            check_invariants: false,
            record_trace: false,
        }
    }
}

/// Parameters of one memory module (cache level or main memory).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Unique module name
    pub name: String,

    /// Cache or main memory
    #[serde(default)]
    pub kind: ModuleKind,

    /// Block size in bytes
    #[serde(default = "ModuleConfig::default_block_size")]
    pub block_size: u64,

    /// Number of sets
    #[serde(default = "ModuleConfig::default_num_sets")]
    pub num_sets: usize,

    /// Associativity
    #[serde(default = "ModuleConfig::default_num_ways")]
    pub num_ways: usize,

    /// Tag/data access latency in cycles
    #[serde(default = "ModuleConfig::default_latency")]
    pub latency: u64,

    /// Maximum top-level accesses in flight
    #[serde(default = "ModuleConfig::default_mshr_count")]
    pub mshr_count: usize,

    /// Requests started per cycle
    #[serde(default = "ModuleConfig::default_port_count")]
    pub port_count: usize,

    /// Victim selection policy
    #[serde(default)]
    pub eviction_policy: ReplacementPolicy,

    /// Next module toward main memory; required for caches
    #[serde(default)]
    pub low: Option<String>,

    /// Base latency before a failed access is retried
    #[serde(default = "ModuleConfig::default_retry_latency")]
    pub retry_latency: u64,

    /// Memory controller model (main memory only)
    #[serde(default)]
    pub controller: MemoryController,

    /// CAS latency (column access strobe)
    #[serde(default = "ModuleConfig::default_t_cas")]
    pub t_cas: u64,

    /// RAS latency (row access strobe)
    #[serde(default = "ModuleConfig::default_t_ras")]
    pub t_ras: u64,

    /// Precharge latency
    #[serde(default = "ModuleConfig::default_t_pre")]
    pub t_pre: u64,

    /// DRAM row size in bytes
    #[serde(default = "ModuleConfig::default_row_bytes")]
    pub row_bytes: u64,
}

impl ModuleConfig {
    fn default_block_size() -> u64 {
        defaults::BLOCK_SIZE
    }

    fn default_num_sets() -> usize {
        defaults::NUM_SETS
    }

    fn default_num_ways() -> usize {
        defaults::NUM_WAYS
    }

    fn default_latency() -> u64 {
        defaults::LATENCY
    }

    fn default_mshr_count() -> usize {
        defaults::MSHR_COUNT
    }

    fn default_port_count() -> usize {
        defaults::PORT_COUNT
    }

    fn default_retry_latency() -> u64 {
        defaults::RETRY_LATENCY
    }

    fn default_t_cas() -> u64 {
        defaults::T_CAS
    }

    fn default_t_ras() -> u64 {
        defaults::T_RAS
    }

    fn default_t_pre() -> u64 {
        defaults::T_PRE
    }

    fn default_row_bytes() -> u64 {
        defaults::ROW_BYTES
    }

    /// Creates a cache module configuration with default timing.
    ///
    /// # Arguments
    ///
    /// * `name` - Module name.
    /// * `num_sets` - Number of sets.
    /// * `num_ways` - Associativity.
    /// * `low` - Name of the next level toward main memory.
    pub fn cache(name: &str, num_sets: usize, num_ways: usize, low: &str) -> Self {
        Self {
            name: name.to_string(),
            num_sets,
            num_ways,
            low: Some(low.to_string()),
            ..Self::default()
        }
    }

    /// Creates a main-memory module configuration with a fixed latency.
    pub fn main_memory(name: &str, latency: u64) -> Self {
        Self {
            name: name.to_string(),
            kind: ModuleKind::MainMemory,
            num_sets: 256,
            num_ways: 8,
            latency,
            ..Self::default()
        }
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: ModuleKind::Cache,
            block_size: defaults::BLOCK_SIZE,
            num_sets: defaults::NUM_SETS,
            num_ways: defaults::NUM_WAYS,
            latency: defaults::LATENCY,
            mshr_count: defaults::MSHR_COUNT,
            port_count: defaults::PORT_COUNT,
            eviction_policy: ReplacementPolicy::default(),
            low: None,
            retry_latency: defaults::RETRY_LATENCY,
            controller: MemoryController::default(),
            t_cas: defaults::T_CAS,
            t_ras: defaults::T_RAS,
            t_pre: defaults::T_PRE,
            row_bytes: defaults::ROW_BYTES,
        }
    }
}

/// Interconnect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Topology connecting the modules
    #[serde(default)]
    pub topology: Topology,

    /// Default link bandwidth in bytes per cycle
    #[serde(default = "NetworkConfig::default_bandwidth")]
    pub bandwidth: u64,

    /// Default link latency in cycles
    #[serde(default = "NetworkConfig::default_latency")]
    pub latency: u64,

    /// Latency of traversing a switch between two links
    #[serde(default = "NetworkConfig::default_switch_latency")]
    pub switch_latency: u64,

    /// Links for the point-to-point topology
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

impl NetworkConfig {
    fn default_bandwidth() -> u64 {
        defaults::BANDWIDTH
    }

    fn default_latency() -> u64 {
        defaults::LINK_LATENCY
    }

    fn default_switch_latency() -> u64 {
        defaults::SWITCH_LATENCY
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            bandwidth: defaults::BANDWIDTH,
            latency: defaults::LINK_LATENCY,
            switch_latency: defaults::SWITCH_LATENCY,
            links: Vec::new(),
        }
    }
}

/// One configured point-to-point link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Source module
    pub src: String,
    /// Destination module
    pub dst: String,
    /// Bandwidth override in bytes per cycle
    #[serde(default)]
    pub bandwidth: Option<u64>,
    /// Latency override in cycles
    #[serde(default)]
    pub latency: Option<u64>,
    /// Also create the reverse link
    #[serde(default = "LinkConfig::default_bidirectional")]
    pub bidirectional: bool,
}

impl LinkConfig {
    const fn default_bidirectional() -> bool {
        true
    }

    /// Creates a bidirectional link with the network defaults.
    pub fn between(src: &str, dst: &str) -> Self {
        Self {
            src: src.to_string(),
            dst: dst.to_string(),
            bandwidth: None,
            latency: None,
            bidirectional: true,
        }
    }
}

/// Pipeline timing core configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Unique core name
    pub name: String,

    /// Module receiving the core's memory accesses
    pub entry: String,

    /// Instructions fetched per cycle
    #[serde(default = "CoreConfig::default_width")]
    pub fetch_width: usize,

    /// Instructions dispatched into the ROB per cycle
    #[serde(default = "CoreConfig::default_width")]
    pub decode_width: usize,

    /// Instructions issued per cycle
    #[serde(default = "CoreConfig::default_width")]
    pub issue_width: usize,

    /// Instructions retired per cycle
    #[serde(default = "CoreConfig::default_width")]
    pub commit_width: usize,

    /// Fetch queue capacity
    #[serde(default = "CoreConfig::default_fetch_queue_size")]
    pub fetch_queue_size: usize,

    /// Issue queue capacity
    #[serde(default = "CoreConfig::default_iq_size")]
    pub iq_size: usize,

    /// Reorder buffer capacity
    #[serde(default = "CoreConfig::default_rob_size")]
    pub rob_size: usize,

    /// Outstanding memory accesses allowed
    #[serde(default = "CoreConfig::default_max_outstanding")]
    pub max_outstanding: usize,

    /// Cycles before a rejected access is re-issued
    #[serde(default = "CoreConfig::default_retry_backoff")]
    pub retry_backoff: u64,

    /// Fetch stall after a squash
    #[serde(default = "CoreConfig::default_mispredict_penalty")]
    pub mispredict_penalty: u64,
}

impl CoreConfig {
    fn default_width() -> usize {
        defaults::WIDTH
    }

    fn default_fetch_queue_size() -> usize {
        defaults::FETCH_QUEUE
    }

    fn default_iq_size() -> usize {
        defaults::IQ_SIZE
    }

    fn default_rob_size() -> usize {
        defaults::ROB_SIZE
    }

    fn default_max_outstanding() -> usize {
        defaults::MAX_OUTSTANDING
    }

    fn default_retry_backoff() -> u64 {
        defaults::RETRY_BACKOFF
    }

    fn default_mispredict_penalty() -> u64 {
        defaults::MISPREDICT_PENALTY
    }

    /// Creates a core configuration with default pipeline parameters.
    pub fn new(name: &str, entry: &str) -> Self {
        Self {
            name: name.to_string(),
            entry: entry.to_string(),
            fetch_width: defaults::WIDTH,
            decode_width: defaults::WIDTH,
            issue_width: defaults::WIDTH,
            commit_width: defaults::WIDTH,
            fetch_queue_size: defaults::FETCH_QUEUE,
            iq_size: defaults::IQ_SIZE,
            rob_size: defaults::ROB_SIZE,
            max_outstanding: defaults::MAX_OUTSTANDING,
            retry_backoff: defaults::RETRY_BACKOFF,
            mispredict_penalty: defaults::MISPREDICT_PENALTY,
        }
    }
}

impl Config {
    /// Parses and validates a JSON configuration.
    ///
    /// # Arguments
    ///
    /// * `json` - Configuration document.
    ///
    /// # Returns
    ///
    /// The configuration, or the first `ConfigError` found.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the index of the module with the given name.
    pub fn module_index(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name == name)
    }

    /// Checks every value that would make the simulation ill-formed.
    ///
    /// Route reachability depends on the topology and is checked when the interconnect is
    /// built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modules.is_empty() {
            return Err(ConfigError::NoModules);
        }

        let mut names = BTreeSet::new();
        for m in &self.modules {
            if !names.insert(m.name.as_str()) {
                return Err(ConfigError::Duplicate(m.name.clone()));
            }
        }

        for m in &self.modules {
            Self::validate_module(m)?;
        }
        self.validate_hierarchy()?;
        self.validate_network()?;
        self.validate_cores()
    }

    fn validate_module(m: &ModuleConfig) -> Result<(), ConfigError> {
        let geometry = |reason: String| ConfigError::Geometry {
            module: m.name.clone(),
            reason,
        };
        if !m.block_size.is_power_of_two() || m.block_size < MIN_BLOCK_BYTES {
            return Err(geometry(format!(
                "block size {} is not a power of two >= {MIN_BLOCK_BYTES}",
                m.block_size
            )));
        }
        if !m.num_sets.is_power_of_two() {
            return Err(geometry(format!(
                "set count {} is not a power of two",
                m.num_sets
            )));
        }

        let zero = |field: &'static str| ConfigError::Zero {
            owner: m.name.clone(),
            field,
        };
        if m.num_ways == 0 {
            return Err(zero("num_ways"));
        }
        if m.latency == 0 {
            return Err(zero("latency"));
        }
        if m.mshr_count == 0 {
            return Err(zero("mshr_count"));
        }
        if m.port_count == 0 {
            return Err(zero("port_count"));
        }
        if m.retry_latency == 0 {
            return Err(zero("retry_latency"));
        }
        if m.kind == ModuleKind::MainMemory && m.controller == MemoryController::Dram {
            if m.t_cas == 0 {
                return Err(zero("t_cas"));
            }
            if !m.row_bytes.is_power_of_two() {
                return Err(geometry(format!(
                    "row size {} is not a power of two",
                    m.row_bytes
                )));
            }
        }
        Ok(())
    }

    fn validate_hierarchy(&self) -> Result<(), ConfigError> {
        let index: BTreeMap<&str, usize> = self
            .modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.as_str(), i))
            .collect();

        for m in &self.modules {
            let hierarchy = |reason: &str| ConfigError::Hierarchy {
                module: m.name.clone(),
                reason: reason.to_string(),
            };
            match (m.kind, &m.low) {
                (ModuleKind::Cache, None) => {
                    return Err(hierarchy("cache has no lower module"));
                }
                (ModuleKind::MainMemory, Some(_)) => {
                    return Err(hierarchy("main memory cannot have a lower module"));
                }
                (ModuleKind::Cache, Some(low)) => {
                    let Some(&li) = index.get(low.as_str()) else {
                        return Err(ConfigError::UnknownModule {
                            owner: m.name.clone(),
                            name: low.clone(),
                        });
                    };
                    let lower = &self.modules[li];
                    if lower.block_size != m.block_size {
                        return Err(hierarchy(&format!(
                            "block size {} differs from '{}' ({})",
                            m.block_size, lower.name, lower.block_size
                        )));
                    }
                }
                (ModuleKind::MainMemory, None) => {}
            }
        }

        // Every chain of `low` links must reach main memory within `n` steps.
        for (start, m) in self.modules.iter().enumerate() {
            let mut cur = start;
            let mut steps = 0;
            while let Some(low) = &self.modules[cur].low {
                steps += 1;
                if steps > self.modules.len() {
                    return Err(ConfigError::Hierarchy {
                        module: m.name.clone(),
                        reason: "cycle in lower-module chain".to_string(),
                    });
                }
                cur = index.get(low.as_str()).copied().unwrap_or(cur);
            }
        }
        Ok(())
    }

    fn validate_network(&self) -> Result<(), ConfigError> {
        let net = &self.network;
        let zero = |field: &'static str| ConfigError::Zero {
            owner: "network".to_string(),
            field,
        };
        if net.bandwidth == 0 {
            return Err(zero("bandwidth"));
        }

        if net.topology != Topology::PointToPoint {
            if !net.links.is_empty() {
                return Err(ConfigError::Topology(format!(
                    "links are only allowed with the point-to-point topology, not {:?}",
                    net.topology
                )));
            }
            return Ok(());
        }

        let mut seen = BTreeSet::new();
        for link in &net.links {
            for end in [&link.src, &link.dst] {
                if self.module_index(end).is_none() {
                    return Err(ConfigError::UnknownModule {
                        owner: "network".to_string(),
                        name: end.clone(),
                    });
                }
            }
            if link.src == link.dst {
                return Err(ConfigError::Topology(format!(
                    "link from '{}' to itself",
                    link.src
                )));
            }
            if link.bandwidth == Some(0) {
                return Err(zero("link bandwidth"));
            }
            let mut pairs = vec![(link.src.as_str(), link.dst.as_str())];
            if link.bidirectional {
                pairs.push((link.dst.as_str(), link.src.as_str()));
            }
            for pair in pairs {
                if !seen.insert(pair) {
                    return Err(ConfigError::Topology(format!(
                        "duplicate link from '{}' to '{}'",
                        pair.0, pair.1
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_cores(&self) -> Result<(), ConfigError> {
        let mut names = BTreeSet::new();
        for core in &self.cores {
            if !names.insert(core.name.as_str()) {
                return Err(ConfigError::Duplicate(core.name.clone()));
            }
            let Some(entry) = self.module_index(&core.entry) else {
                return Err(ConfigError::UnknownModule {
                    owner: core.name.clone(),
                    name: core.entry.clone(),
                });
            };
            let entry_name = &self.modules[entry].name;
            if self
                .modules
                .iter()
                .any(|m| m.low.as_deref() == Some(entry_name.as_str()))
            {
                return Err(ConfigError::Core {
                    core: core.name.clone(),
                    reason: format!("entry module '{entry_name}' has upper levels"),
                });
            }

            let zero = |field: &'static str| ConfigError::Zero {
                owner: core.name.clone(),
                field,
            };
            for (field, value) in [
                ("fetch_width", core.fetch_width),
                ("decode_width", core.decode_width),
                ("issue_width", core.issue_width),
                ("commit_width", core.commit_width),
                ("fetch_queue_size", core.fetch_queue_size),
                ("iq_size", core.iq_size),
                ("rob_size", core.rob_size),
                ("max_outstanding", core.max_outstanding),
            ] {
                if value == 0 {
                    return Err(zero(field));
                }
            }
            if core.retry_backoff == 0 {
                return Err(zero("retry_backoff"));
            }
        }
        Ok(())
    }
}
