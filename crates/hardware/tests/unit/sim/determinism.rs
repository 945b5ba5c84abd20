//! Determinism Tests.
//!
//! Two simulations built from the same configuration and driven by the same inputs
//! must dispatch identical event traces and end with identical counters, even with
//! randomized replacement, randomized retry backoff and contended resources.

use hetsim_core::Simulation;
use hetsim_core::common::data::AccessKind;
use hetsim_core::config::{Config, ReplacementPolicy, Topology};
use hetsim_core::core::{InstKind, Instruction, TraceSource};
use pretty_assertions::assert_eq;

use crate::common::harness::abc_with_cores;

fn contended() -> Config {
    let mut config = abc_with_cores(Topology::Ring);
    config.general.record_trace = true;
    for m in &mut config.modules {
        m.eviction_policy = ReplacementPolicy::Random;
        m.mshr_count = 2;
        m.port_count = 1;
    }
    config
}

fn drive(config: Config) -> Simulation {
    let mut sim = Simulation::new(config).unwrap();
    for (core, base) in [("cpu0", 0x0), ("cpu1", 0x20)] {
        let insts: Vec<Instruction> = (0..24u64)
            .map(|i| {
                let addr = base + (i % 6) * 0x100;
                let kind = if i % 3 == 0 {
                    InstKind::Store { addr, value: i }
                } else {
                    InstKind::Load { addr }
                };
                Instruction::new(4 * i, kind)
            })
            .collect();
        sim.attach_source(core, Box::new(TraceSource::new(insts)))
            .unwrap();
    }
    for i in 0..8u64 {
        let module = if i % 2 == 0 { "A" } else { "B" };
        let _ = sim
            .schedule_access(i as i64, module, AccessKind::Store, 0x300 + 8 * i, 100 + i)
            .unwrap();
    }
    let _ = sim.run().unwrap();
    sim
}

#[test]
fn test_identical_runs_have_identical_traces() {
    let a = drive(contended());
    let b = drive(contended());

    let (ta, tb) = (a.trace().unwrap(), b.trace().unwrap());
    assert!(!ta.is_empty());
    assert_eq!(ta, tb);
    assert_eq!(a.now(), b.now());
    assert_eq!(
        serde_json::to_string(&a.stats()).unwrap(),
        serde_json::to_string(&b.stats()).unwrap()
    );
    assert_eq!(a.completions(), b.completions());
}

#[test]
fn test_trace_is_off_by_default() {
    let mut config = contended();
    config.general.record_trace = false;
    let sim = drive(config);
    assert!(sim.trace().is_none());
}
