//! Statistics Tests.
//!
//! Verifies derived metrics, the counters collected during a run and the two report
//! formats (plain text and JSON).

use hetsim_core::common::data::AccessKind;
use hetsim_core::config::Topology;
use hetsim_core::stats::{CoreStats, ModuleStats, NetworkStats, SimStats};

use crate::common::harness::{TestContext, abc_config};

#[test]
fn test_default_stats_all_zero() {
    let stats = SimStats::default();
    assert_eq!(stats.cycles, 0);
    assert_eq!(stats.events, 0);
    assert!(stats.modules.is_empty());
    assert!(stats.cores.is_empty());
    assert_eq!(stats.network, NetworkStats::default());
}

#[test]
fn test_derived_metrics_handle_zero() {
    assert_eq!(ModuleStats::default().hit_rate(), 0.0);
    assert_eq!(ModuleStats::default().average_latency(), 0.0);
    assert_eq!(CoreStats::default().ipc(), 0.0);
    assert_eq!(NetworkStats::default().average_latency(), 0.0);
}

#[test]
fn test_derived_metrics() {
    let m = ModuleStats {
        hits: 3,
        misses: 1,
        completed: 4,
        total_latency: 40,
        ..ModuleStats::default()
    };
    assert!((m.hit_rate() - 0.75).abs() < f64::EPSILON);
    assert!((m.average_latency() - 10.0).abs() < f64::EPSILON);

    let c = CoreStats {
        cycles: 200,
        committed: 100,
        ..CoreStats::default()
    };
    assert!((c.ipc() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_run_counters() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    let _ = ctx.load("A", 0x0);
    let _ = ctx.load("A", 0x8);
    ctx.store("A", 0x10, 1);
    let _ = ctx.complete("A", AccessKind::NcStore, 0x18, 2);

    let stats = ctx.sim.stats();
    let (name, a) = &stats.modules[0];
    assert_eq!(name, "A");
    assert_eq!(a.accesses, 4);
    assert_eq!(a.reads, 2);
    assert_eq!(a.writes, 1);
    assert_eq!(a.nc_writes, 1);
    assert_eq!(a.misses, 1);
    assert_eq!(a.hits, 3);
    assert_eq!(a.completed, 4);
    assert!(a.average_latency() > 0.0);

    let (_, c) = &stats.modules[2];
    assert_eq!(c.accesses, 0);
    assert!(c.requests >= 1);
    assert_eq!(stats.cycles, ctx.sim.now());
    assert!(stats.events > 0);
}

#[test]
fn test_reports() {
    let mut ctx = TestContext::new(abc_config(Topology::Bus));
    let _ = ctx.load("B", 0x40);
    let stats = ctx.sim.stats();

    let mut text = Vec::new();
    stats.write_summary(&mut text).unwrap();
    let text = String::from_utf8(text).unwrap();
    assert!(text.contains("SIMULATION STATISTICS"));
    assert!(text.contains("MEMORY MODULES"));
    assert!(text.contains("mem"));

    let json: serde_json::Value = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["modules"][1][0], "B");
    assert_eq!(json["modules"][1][1]["reads"], 1);
    assert!(json["network"]["packets"].as_u64().unwrap() > 0);
}
