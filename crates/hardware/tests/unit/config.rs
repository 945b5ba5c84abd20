//! # Configuration Tests
//!
//! Tests for configuration defaults, JSON deserialization and validation.

use hetsim_core::Simulation;
use hetsim_core::config::*;
use hetsim_core::ConfigError;
use hetsim_core::SimError;
use rstest::rstest;

use crate::common::harness::abc_config;

#[test]
fn test_general_config_defaults() {
    let general = GeneralConfig::default();
    assert_eq!(general.max_cycles, None);
    assert_eq!(general.max_events_per_cycle, defaults::MAX_EVENTS_PER_CYCLE);
    assert_eq!(general.seed, defaults::SEED);
    assert_eq!(general.max_retries, defaults::MAX_RETRIES);
    assert!(!general.check_invariants);
    assert!(!general.record_trace);
}

#[test]
fn test_module_config_defaults() {
    let m = ModuleConfig::default();
    assert_eq!(m.kind, ModuleKind::Cache);
    assert_eq!(m.block_size, 64);
    assert_eq!(m.num_sets, 16);
    assert_eq!(m.num_ways, 2);
    assert_eq!(m.eviction_policy, ReplacementPolicy::Lru);
    assert_eq!(m.controller, MemoryController::Simple);
    assert_eq!(m.low, None);
}

#[test]
fn test_network_and_core_defaults() {
    let net = NetworkConfig::default();
    assert_eq!(net.topology, Topology::Crossbar);
    assert_eq!(net.bandwidth, defaults::BANDWIDTH);
    assert!(net.links.is_empty());

    let core = CoreConfig::new("cpu0", "l1");
    assert_eq!(core.rob_size, defaults::ROB_SIZE);
    assert_eq!(core.fetch_width, core.commit_width);
}

#[test]
fn test_deserialize_minimal_json() {
    let json = r#"{
        "modules": [
            { "name": "l1", "num_sets": 4, "low": "mem", "eviction_policy": "FIFO" },
            { "name": "mem", "kind": "MainMemory", "controller": "Dram", "latency": 20 }
        ],
        "network": {
            "topology": "P2P",
            "links": [ { "src": "l1", "dst": "mem", "latency": 3 } ]
        }
    }"#;
    let config = Config::from_json(json).unwrap();
    assert_eq!(config.modules[0].eviction_policy, ReplacementPolicy::Fifo);
    assert_eq!(config.modules[0].num_ways, defaults::NUM_WAYS);
    assert_eq!(config.modules[1].controller, MemoryController::Dram);
    assert_eq!(config.network.topology, Topology::PointToPoint);
    assert_eq!(config.network.links[0].latency, Some(3));
    assert!(config.network.links[0].bidirectional);
    assert!(config.cores.is_empty());
}

#[test]
fn test_malformed_json_is_parse_error() {
    let err = Config::from_json("{ \"modules\": 3 }").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_abc_config_is_valid() {
    abc_config(Topology::Crossbar).validate().unwrap();
}

fn broken(edit: impl FnOnce(&mut Config)) -> ConfigError {
    let mut config = abc_config(Topology::Crossbar);
    edit(&mut config);
    config.validate().unwrap_err()
}

#[rstest]
#[case::no_modules(|c: &mut Config| c.modules.clear(), "no memory modules")]
#[case::duplicate(|c: &mut Config| c.modules[1].name = "A".into(), "duplicate")]
#[case::block_not_power_of_two(|c: &mut Config| c.modules[0].block_size = 48, "block size")]
#[case::sets_not_power_of_two(|c: &mut Config| c.modules[0].num_sets = 3, "set count")]
#[case::zero_ways(|c: &mut Config| c.modules[0].num_ways = 0, "num_ways")]
#[case::zero_mshr(|c: &mut Config| c.modules[2].mshr_count = 0, "mshr_count")]
#[case::cache_without_low(|c: &mut Config| c.modules[2].low = None, "no lower module")]
#[case::memory_with_low(|c: &mut Config| c.modules[3].low = Some("C".into()), "main memory")]
#[case::unknown_low(|c: &mut Config| c.modules[0].low = Some("L9".into()), "unknown module")]
#[case::lower_cycle(|c: &mut Config| {
    c.modules[2].low = Some("A".into());
}, "cycle")]
#[case::block_size_mismatch(|c: &mut Config| c.modules[0].block_size = 128, "differs")]
#[case::zero_bandwidth(|c: &mut Config| c.network.bandwidth = 0, "bandwidth")]
#[case::links_outside_p2p(|c: &mut Config| c.network.links.push(LinkConfig::between("A", "C")), "point-to-point")]
#[case::core_on_shared_level(|c: &mut Config| c.cores.push(CoreConfig::new("cpu0", "C")), "upper levels")]
#[case::core_on_unknown_module(|c: &mut Config| c.cores.push(CoreConfig::new("cpu0", "X")), "unknown module")]
#[case::zero_rob(|c: &mut Config| {
    let mut core = CoreConfig::new("cpu0", "A");
    core.rob_size = 0;
    c.cores.push(core);
}, "rob_size")]
fn test_validation_rejects(#[case] edit: fn(&mut Config), #[case] needle: &str) {
    let err = broken(edit);
    let msg = err.to_string();
    assert!(msg.contains(needle), "'{msg}' does not mention '{needle}'");
}

#[test]
fn test_p2p_duplicate_link_rejected() {
    let err = broken(|c| {
        c.network.topology = Topology::PointToPoint;
        c.network.links = vec![LinkConfig::between("A", "C"), LinkConfig::between("C", "A")];
    });
    assert!(matches!(err, ConfigError::Topology(_)));
}

#[test]
fn test_p2p_missing_route_is_unreachable() {
    let mut config = abc_config(Topology::PointToPoint);
    config.network.links = vec![
        LinkConfig::between("A", "C"),
        LinkConfig::between("C", "mem"),
    ];
    let err = Simulation::new(config).unwrap_err();
    match err {
        SimError::Config(ConfigError::Unreachable { src, dst }) => {
            assert!(src == "B" || dst == "B", "unexpected pair {src} -> {dst}");
        }
        other => panic!("expected Unreachable, got {other}"),
    }
}

#[test]
fn test_p2p_one_way_link_is_unreachable() {
    let mut config = abc_config(Topology::PointToPoint);
    let mut up = LinkConfig::between("C", "mem");
    up.bidirectional = false;
    config.network.links = vec![
        LinkConfig::between("A", "C"),
        LinkConfig::between("B", "C"),
        up,
    ];
    let err = Simulation::new(config).unwrap_err();
    assert!(matches!(
        err,
        SimError::Config(ConfigError::Unreachable { .. })
    ));
}
