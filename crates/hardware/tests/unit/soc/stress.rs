//! Coherence Stress Tests.
//!
//! Hierarchies small enough that nearly every access evicts something, driven by
//! overlapping accesses from several requesters:
//! 1. **Eviction Races:** A victim that merges dirty data from above and is then abandoned
//!    must keep that data; an evicted copy must be gone once the level below forgets it.
//! 2. **Random Plans:** Loads, stores, invalidations and write-backs from four entry
//!    modules over three hierarchy shapes. The invariant checker runs after every event,
//!    every load must return a legal value, and the settled hierarchy must agree with the
//!    store that completed last.

use hetsim_core::Simulation;
use hetsim_core::common::data::AccessKind;
use hetsim_core::config::{Config, ModuleConfig, ReplacementPolicy, Topology};
use hetsim_core::core::units::cache::BlockState;
use proptest::prelude::*;

use crate::common::harness::{MEMORY_LATENCY, TestContext, last_store, legal};

const ENTRIES: [&str; 4] = ["a0", "a1", "a2", "a3"];

/// Word addresses colliding in the two- and four-set caches below.
const ADDRS: [u64; 8] = [0x0, 0x8, 0x40, 0x80, 0x100, 0x140, 0x200, 0x1000];

#[derive(Clone, Copy, Debug)]
enum Shape {
    /// Four one-way caches over a tiny FIFO cache.
    OneWay,
    /// Pairs of caches over two middle caches over a shared last level.
    ThreeLevel,
    /// Four caches sharing one middle cache on a ring.
    Wide,
}

fn fifo(name: &str, sets: usize, ways: usize, low: &str) -> ModuleConfig {
    let mut m = ModuleConfig::cache(name, sets, ways, low);
    m.eviction_policy = ReplacementPolicy::Fifo;
    m
}

fn stress_config(shape: Shape) -> Config {
    let mut config = Config::default();
    config.general.check_invariants = true;
    let mem = ModuleConfig::main_memory("mem", MEMORY_LATENCY);
    config.modules = match shape {
        Shape::OneWay => {
            config.network.topology = Topology::Bus;
            let mut modules: Vec<_> = ENTRIES.iter().map(|n| fifo(n, 4, 1, "m0")).collect();
            modules.extend([fifo("m0", 2, 2, "mem"), mem]);
            modules
        }
        Shape::ThreeLevel => {
            config.network.topology = Topology::Crossbar;
            vec![
                ModuleConfig::cache("a0", 2, 2, "m0"),
                ModuleConfig::cache("a1", 2, 2, "m0"),
                ModuleConfig::cache("a2", 2, 1, "m1"),
                ModuleConfig::cache("a3", 2, 1, "m1"),
                ModuleConfig::cache("m0", 2, 2, "l3"),
                fifo("m1", 2, 2, "l3"),
                ModuleConfig::cache("l3", 4, 2, "mem"),
                mem,
            ]
        }
        Shape::Wide => {
            config.network.topology = Topology::Ring;
            let mut modules: Vec<_> = ENTRIES
                .iter()
                .map(|n| ModuleConfig::cache(n, 4, 2, "m0"))
                .collect();
            modules.extend([ModuleConfig::cache("m0", 4, 2, "mem"), mem]);
            modules
        }
    };
    config
}

/// `A` and `B` over a one-way `C`, so every new block in a set evicts the old one.
fn one_way_shared() -> Config {
    let mut config = Config::default();
    config.general.check_invariants = true;
    config.modules = vec![
        ModuleConfig::cache("A", 4, 2, "C"),
        ModuleConfig::cache("B", 4, 2, "C"),
        ModuleConfig::cache("C", 4, 1, "mem"),
        ModuleConfig::main_memory("mem", MEMORY_LATENCY),
    ];
    config
}

#[test]
fn test_abandoned_eviction_keeps_merged_dirty_data() {
    let mut ctx = TestContext::new(one_way_shared());
    ctx.store("A", 0x0, 5);
    assert_eq!(ctx.load("B", 0x0), 5);
    assert!(ctx.state("B", 0x0).is_valid());

    // Evicting 0x0 from C collects A's dirty copy while B drops its own.
    let _ = ctx.sim.schedule_access(0, "A", AccessKind::Load, 0x100, 0).unwrap();
    let _ = ctx.sim.schedule_access(2, "B", AccessKind::Invalidate, 0x0, 0).unwrap();
    let _ = ctx.sim.run().unwrap();
    assert_eq!(ctx.sim.take_completions().len(), 2);
    ctx.sim.check_invariants().unwrap();

    assert_eq!(ctx.load("B", 0x0), 5);
    assert_eq!(ctx.load("A", 0x0), 5);
}

#[test]
fn test_evicted_copy_is_invalid_once_directory_forgets_it() {
    let mut config = one_way_shared();
    config.modules[0].num_ways = 1;
    config.modules[2].num_ways = 2;
    let mut ctx = TestContext::new(config);
    let _ = ctx.load("A", 0x0);
    assert_eq!(ctx.sim.sharers("C", 0x0), vec!["A".to_string()]);

    let _ = ctx.sim.schedule_access(0, "A", AccessKind::Load, 0x100, 0).unwrap();
    let start = ctx.sim.now();
    let mut forgotten = false;
    for t in start + 1..start + 500 {
        let _ = ctx.sim.run_until(t).unwrap();
        ctx.sim.check_invariants().unwrap();
        if !ctx.sim.sharers("C", 0x0).contains(&"A".to_string()) {
            forgotten = true;
            assert_eq!(ctx.state("A", 0x0), BlockState::Invalid, "cycle {t}");
        }
        if ctx.sim.is_quiescent() {
            break;
        }
    }
    assert!(forgotten);
    assert!(ctx.sim.is_quiescent());
    assert_eq!(ctx.sim.take_completions().len(), 1);
    assert!(ctx.state("A", 0x100).is_valid());
    assert!(ctx.state("C", 0x0).is_valid());
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Load,
    Store,
    Invalidate,
    WriteBack,
}

impl Op {
    const fn kind(self) -> AccessKind {
        match self {
            Self::Load => AccessKind::Load,
            Self::Store => AccessKind::Store,
            Self::Invalidate => AccessKind::Invalidate,
            Self::WriteBack => AccessKind::WriteBack,
        }
    }
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Load),
        3 => Just(Op::Store),
        2 => Just(Op::Invalidate),
        2 => Just(Op::WriteBack),
    ]
}

fn shape() -> impl Strategy<Value = Shape> {
    prop_oneof![Just(Shape::OneWay), Just(Shape::ThreeLevel), Just(Shape::Wide)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_random_plans_keep_hierarchy_coherent(
        shape in shape(),
        plan in prop::collection::vec((0..ENTRIES.len(), op(), 0..ADDRS.len(), 0i64..60), 1..80),
    ) {
        let mut sim = Simulation::new(stress_config(shape)).unwrap();
        for (i, &(m, op, a, delay)) in plan.iter().enumerate() {
            let _ = sim
                .schedule_access(delay, ENTRIES[m], op.kind(), ADDRS[a], 1000 + i as u64)
                .unwrap();
        }
        let result = sim.run();
        prop_assert!(result.is_ok(), "{:?} run failed: {:?}", shape, result.err());
        prop_assert!(sim.is_quiescent());

        let done = sim.take_completions();
        prop_assert_eq!(done.len(), plan.len());
        for load in done.iter().filter(|c| c.kind == AccessKind::Load) {
            prop_assert!(legal(load, &done), "{:?} load {:?} returned an illegal value", shape, load);
        }

        let mut ctx = TestContext { sim };
        for addr in ADDRS {
            let expected = last_store(&done, addr);
            for entry in ENTRIES {
                prop_assert_eq!(ctx.load(entry, addr), expected, "{:?} {} {:#x}", shape, entry, addr);
            }
        }
        ctx.sim.check_invariants().unwrap();
    }
}
