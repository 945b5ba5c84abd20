//! Memory system construction.
//!
//! This module builds the memory hierarchy from configuration. It performs:
//! 1. **Validation:** The whole configuration is checked before anything is built.
//! 2. **Modules:** One module per configuration entry, each attached to the network node
//!    of the same index.
//! 3. **Hierarchy:** `low` names become `low`/`high` links between module handles.
//! 4. **Interconnect:** The topology is built and every pair of modules that exchanges
//!    messages is checked for a route in both directions.
//! 5. **Protocol:** The coherence protocol is bound once for the whole run.

use tracing::debug;

use crate::common::data::ModuleId;
use crate::common::error::ConfigError;
use crate::config::Config;
use crate::soc::interconnect::{Network, NodeId};
use crate::soc::memory::MemorySystem;
use crate::soc::memory::module::Module;
use crate::soc::memory::protocol::Nmoesi;

/// Builds the memory system described by `config`.
///
/// # Arguments
///
/// * `config` - Simulator configuration.
///
/// # Returns
///
/// A memory system with every module empty and every link idle.
///
/// # Errors
///
/// Returns the first `ConfigError` found by validation, or `ConfigError::Unreachable` when
/// a module cannot reach the module below it (or vice versa) through the network.
pub fn build(config: &Config) -> Result<MemorySystem, ConfigError> {
    config.validate()?;

    let names: Vec<String> = config.modules.iter().map(|m| m.name.clone()).collect();
    let network = Network::build(&config.network, &names)?;

    let mut modules: Vec<Module> = config
        .modules
        .iter()
        .enumerate()
        .map(|(i, mc)| Module::new(ModuleId(i), mc, NodeId(i), config.general.seed))
        .collect();

    for (i, mc) in config.modules.iter().enumerate() {
        let Some(low) = &mc.low else {
            continue;
        };
        let j = config
            .module_index(low)
            .ok_or_else(|| ConfigError::UnknownModule {
                owner: mc.name.clone(),
                name: low.clone(),
            })?;
        modules[i].low = Some(ModuleId(j));
        modules[j].high.push(ModuleId(i));
    }

    for m in &modules {
        let Some(low) = m.low else {
            continue;
        };
        let l = &modules[low.0];
        for (a, b) in [(m, l), (l, m)] {
            if network.path(a.node, b.node).is_none() {
                return Err(ConfigError::Unreachable {
                    src: a.name.clone(),
                    dst: b.name.clone(),
                });
            }
        }
    }

    debug!(
        modules = modules.len(),
        topology = ?config.network.topology,
        nodes = network.node_count(),
        "memory system built"
    );
    Ok(MemorySystem::new(
        modules,
        network,
        Box::new(Nmoesi),
        config.general.seed,
        config.general.max_retries,
    ))
}
