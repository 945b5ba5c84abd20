//! Liveness Tests.
//!
//! Piles accesses onto one block, and onto few resources, and checks that every one of
//! them completes: nacks and retries must resolve instead of deadlocking or livelocking.

use hetsim_core::common::data::AccessKind;
use hetsim_core::config::Topology;
use hetsim_core::sim::event::FinishReason;
use hetsim_core::{SimError, Simulation};
use rstest::rstest;

use crate::common::harness::abc_config;

#[rstest]
fn test_hot_block_accesses_all_complete(
    #[values(Topology::Bus, Topology::Ring, Topology::Crossbar)] topology: Topology,
    #[values(1, 4)] mshr_count: usize,
) {
    let mut config = abc_config(topology);
    for m in &mut config.modules {
        m.mshr_count = mshr_count;
        m.port_count = 1;
    }
    let mut sim = Simulation::new(config).unwrap();

    let n = 64u64;
    for i in 0..n {
        let module = if i % 2 == 0 { "A" } else { "B" };
        let kind = if i % 3 == 0 {
            AccessKind::Load
        } else {
            AccessKind::Store
        };
        let _ = sim
            .schedule_access((i % 5) as i64, module, kind, 8 * (i % 4), i)
            .unwrap();
    }
    let summary = sim.run().unwrap();
    assert_eq!(summary.finish, FinishReason::Drained);
    assert_eq!(sim.completions().len() as u64, n);
    assert!(sim.is_quiescent());

    let stats = sim.stats();
    let retried: u64 = stats
        .modules
        .iter()
        .map(|(_, s)| s.rejections + s.retries + s.nacks)
        .sum();
    assert!(retried > 0, "contention should have caused retries");
}

#[test]
fn test_cross_eviction_traffic_completes() {
    let mut sim = Simulation::new(abc_config(Topology::Crossbar)).unwrap();
    // Every address maps to set 0 of every cache.
    for i in 0..48u64 {
        let module = if i % 2 == 0 { "A" } else { "B" };
        let addr = 0x100 * (i % 6);
        let kind = if i % 4 == 0 {
            AccessKind::Store
        } else {
            AccessKind::Load
        };
        let _ = sim.schedule_access((i / 3) as i64, module, kind, addr, i).unwrap();
    }
    let _ = sim.run().unwrap();
    assert_eq!(sim.completions().len(), 48);
    sim.check_invariants().unwrap();
}

#[test]
fn test_retry_bound_aborts_run() {
    let mut config = abc_config(Topology::Crossbar);
    config.general.max_retries = 0;
    let mut sim = Simulation::new(config).unwrap();
    for _ in 0..2 {
        let _ = sim.schedule_access(0, "A", AccessKind::Load, 0x0, 0).unwrap();
    }
    let err = sim.run().unwrap_err();
    match err {
        SimError::RetryLimit { module, addr, .. } => {
            assert_eq!(module, "A");
            assert_eq!(addr, 0x0);
        }
        other => panic!("expected RetryLimit, got {other}"),
    }
}

#[test]
fn test_cycle_limit_stops_early() {
    let mut config = abc_config(Topology::Crossbar);
    config.general.max_cycles = Some(3);
    let mut sim = Simulation::new(config).unwrap();
    let _ = sim.schedule_access(0, "A", AccessKind::Load, 0x0, 0).unwrap();

    let summary = sim.run().unwrap();
    assert_eq!(summary.finish, FinishReason::CycleLimit);
    assert!(sim.completions().is_empty());
    assert!(sim.pending_events() > 0);

    let _ = sim.run_until(10_000).unwrap();
    assert_eq!(sim.completions().len(), 1);
}
