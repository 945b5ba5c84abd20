//! Value Oracle Tests.
//!
//! Random access sequences are replayed against the hierarchy and checked against a
//! reference memory:
//! 1. **Sequential:** One access at a time; every load must return the last stored word.
//! 2. **Concurrent:** Accesses overlap in time; every load must return either the latest
//!    store that completed before it was issued, or a store that overlapped it.
//!
//! A small shared cache keeps the hierarchy busy with inclusive evictions, and the
//! invariant checker runs after every event.

use std::collections::BTreeMap;

use hetsim_core::Simulation;
use hetsim_core::common::data::AccessKind;
use hetsim_core::config::Topology;
use proptest::prelude::*;

use crate::common::harness::{TestContext, abc_config, legal};

/// Word addresses spread over few sets, so blocks collide in every cache.
const ADDRS: [u64; 7] = [0x0, 0x8, 0x100, 0x200, 0x300, 0x1040, 0x2040];

const TOPOLOGIES: [Topology; 4] = [
    Topology::Bus,
    Topology::PointToPoint,
    Topology::Ring,
    Topology::Crossbar,
];

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
        1 => Just(Op::Invalidate),
        1 => Just(Op::WriteBack),
    ]
}

/// `(module, op, address index)`.
fn accesses(max: usize) -> impl Strategy<Value = Vec<(bool, Op, usize)>> {
    prop::collection::vec((any::<bool>(), op(), 0..ADDRS.len()), 1..max)
}

fn module(first: bool) -> &'static str {
    if first { "A" } else { "B" }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_sequential_loads_see_last_store(
        plan in accesses(60),
        topology in prop::sample::select(TOPOLOGIES.to_vec()),
    ) {
        let mut ctx = TestContext::new(abc_config(topology));
        let mut reference: BTreeMap<u64, u64> = BTreeMap::new();

        for (i, (first, op, a)) in plan.into_iter().enumerate() {
            let addr = ADDRS[a];
            let value = 1000 + i as u64;
            let c = ctx.complete(module(first), op.kind(), addr, value);
            match op {
                Op::Load => {
                    let expected = reference.get(&addr).copied().unwrap_or(0);
                    prop_assert_eq!(c.value, expected, "load #{} of {:#x} at {}", i, addr, module(first));
                }
                Op::Store => {
                    let _ = reference.insert(addr, value);
                }
                Op::Invalidate | Op::WriteBack => {}
            }
        }
        prop_assert!(ctx.sim.is_quiescent());
    }

    #[test]
    fn test_concurrent_loads_see_legal_values(
        plan in prop::collection::vec((any::<bool>(), any::<bool>(), 0..ADDRS.len(), 0i64..40), 1..50),
        topology in prop::sample::select(TOPOLOGIES.to_vec()),
    ) {
        let mut sim = Simulation::new(abc_config(topology)).unwrap();
        for (i, &(first, store, a, delay)) in plan.iter().enumerate() {
            let kind = if store { AccessKind::Store } else { AccessKind::Load };
            let _ = sim
                .schedule_access(delay, module(first), kind, ADDRS[a], 1000 + i as u64)
                .unwrap();
        }
        let _ = sim.run().unwrap();

        let done = sim.take_completions();
        prop_assert_eq!(done.len(), plan.len());
        for load in done.iter().filter(|c| c.kind == AccessKind::Load) {
            prop_assert!(legal(load, &done), "load {:?} returned an illegal value", load);
        }
    }
}
