//! Coherence Scenario Tests.
//!
//! Walks the three-cache hierarchy (`A`, `B` private over a shared `C`) through the
//! classic sharing sequences and checks block states, directory contents and data at
//! every level. Every test runs with the invariant checker enabled.

use hetsim_core::common::data::{AccessKind, AccessOutcome};
use hetsim_core::config::Topology;
use hetsim_core::core::units::cache::BlockState;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::harness::{TestContext, abc_config};

use BlockState::{Exclusive, Invalid, Modified, NonCoherent, Owned, Shared};

const X: u64 = 0x0;

/// Read, read, write, read across two private caches.
#[rstest]
fn test_read_read_write_read(
    #[values(Topology::Bus, Topology::PointToPoint, Topology::Ring, Topology::Crossbar)]
    topology: Topology,
) {
    let mut ctx = TestContext::new(abc_config(topology));

    // A reads: exclusive everywhere on its path.
    assert_eq!(ctx.load("A", X), 0);
    assert_eq!(ctx.state("A", X), Exclusive);
    assert_eq!(ctx.state("C", X), Exclusive);
    assert_eq!(ctx.sim.owner("C", X).as_deref(), Some("A"));
    assert_eq!(ctx.sim.sharers("C", X), vec!["A"]);

    // B reads: A is downgraded, nobody owns the block.
    assert_eq!(ctx.load("B", X), 0);
    assert_eq!(ctx.state("A", X), Shared);
    assert_eq!(ctx.state("B", X), Shared);
    assert_eq!(ctx.sim.owner("C", X), None);
    assert_eq!(ctx.sim.sharers("C", X), vec!["A", "B"]);

    // B writes: A is invalidated, B owns a modified copy.
    ctx.store("B", X, 42);
    assert_eq!(ctx.state("A", X), Invalid);
    assert_eq!(ctx.state("B", X), Modified);
    assert_eq!(ctx.sim.owner("C", X).as_deref(), Some("B"));
    assert_eq!(ctx.sim.sharers("C", X), vec!["B"]);

    // A reads again: B keeps the dirty data as owner, A gets it directly.
    assert_eq!(ctx.load("A", X), 42);
    assert_eq!(ctx.state("B", X), Owned);
    assert_eq!(ctx.state("A", X), Shared);
    assert_eq!(ctx.sim.owner("C", X).as_deref(), Some("B"));
    assert_eq!(ctx.sim.sharers("C", X), vec!["A", "B"]);

    // C was never written: it still holds the pre-write value.
    assert_eq!(ctx.state("C", X), Exclusive);
    assert_eq!(ctx.sim.peek_word("C", X), Some(0));
    assert_eq!(ctx.sim.peek_word("B", X), Some(42));

    ctx.sim.check_invariants().unwrap();
    assert!(ctx.sim.is_quiescent());
}

#[test]
fn test_store_hit_on_exclusive_is_silent() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    let _ = ctx.load("A", X);
    let requests_before = ctx.sim.module("C").unwrap().stats().requests;

    let c = ctx.complete("A", AccessKind::Store, X + 8, 3);
    assert!(c.hit);
    assert_eq!(ctx.state("A", X), Modified);
    assert_eq!(ctx.sim.module("C").unwrap().stats().requests, requests_before);
}

#[test]
fn test_owner_upgrade_keeps_data() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    ctx.store("B", X, 1);
    assert_eq!(ctx.load("A", X), 1);
    assert_eq!(ctx.state("B", X), Owned);

    // The owner writes again: the sharer is invalidated, the owner becomes modified.
    ctx.store("B", X + 8, 2);
    assert_eq!(ctx.state("A", X), Invalid);
    assert_eq!(ctx.state("B", X), Modified);
    assert_eq!(ctx.load("A", X), 1);
    assert_eq!(ctx.load("A", X + 8), 2);
}

#[test]
fn test_nc_store_does_not_invalidate_peers() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    let _ = ctx.load("A", X);
    let _ = ctx.load("B", X);

    let c = ctx.complete("A", AccessKind::NcStore, X, 5);
    assert!(c.hit);
    assert_eq!(ctx.state("A", X), NonCoherent);
    assert_eq!(ctx.state("B", X), Shared);
    assert_eq!(ctx.sim.peek_word("A", X), Some(5));
    assert_eq!(ctx.sim.peek_word("B", X), Some(0));
}

#[test]
fn test_nc_store_on_exclusive_becomes_modified() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    let _ = ctx.load("A", X);
    let _ = ctx.complete("A", AccessKind::NcStore, X, 5);
    assert_eq!(ctx.state("A", X), Modified);
}

#[test]
fn test_invalidate_writes_dirty_data_down() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    ctx.store("A", X, 9);

    let _ = ctx.complete("A", AccessKind::Invalidate, X, 0);
    assert_eq!(ctx.state("A", X), Invalid);
    assert_eq!(ctx.state("C", X), Modified);
    assert_eq!(ctx.sim.peek_word("C", X), Some(9));
    assert_eq!(ctx.sim.sharers("C", X), Vec::<String>::new());
    assert_eq!(ctx.load("B", X), 9);
}

#[test]
fn test_invalidate_of_absent_block_completes() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    let c = ctx.complete("A", AccessKind::Invalidate, 0x4000, 0);
    assert!(c.hit);
    assert_eq!(ctx.state("A", 0x4000), Invalid);
}

#[test]
fn test_writeback_keeps_clean_copy() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    ctx.store("A", X, 9);

    let _ = ctx.complete("A", AccessKind::WriteBack, X, 0);
    assert_eq!(ctx.state("A", X), Exclusive);
    assert_eq!(ctx.state("C", X), Modified);
    assert_eq!(ctx.sim.peek_word("C", X), Some(9));
    assert_eq!(ctx.sim.owner("C", X).as_deref(), Some("A"));
    assert_eq!(ctx.sim.module("A").unwrap().stats().writebacks, 1);
}

#[test]
fn test_shared_level_eviction_invalidates_uppers() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    // 0x0, 0x100 and 0x200 map to set 0 of C, which has two ways.
    ctx.store("A", X, 13);
    let _ = ctx.load("B", 0x100);
    let _ = ctx.load("B", 0x200);

    assert_eq!(ctx.state("C", X), Invalid);
    assert_eq!(ctx.state("A", X), Invalid);
    assert!(ctx.sim.module("C").unwrap().stats().evictions >= 1);
    assert_eq!(ctx.sim.peek_word("mem", X), Some(13));
    assert_eq!(ctx.load("B", X), 13);
}

#[test]
fn test_access_to_shared_level_is_rejected() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    assert!(ctx.sim.access("C", AccessKind::Load, X, 0).is_err());
    assert!(
        ctx.sim
            .schedule_access(0, "C", AccessKind::Load, X, 0)
            .is_err()
    );
    assert!(ctx.sim.access("Z", AccessKind::Load, X, 0).is_err());
}

#[test]
fn test_same_block_in_flight_is_retried() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    let first = ctx.sim.access("A", AccessKind::Load, X, 0).unwrap();
    assert!(matches!(first, AccessOutcome::MissService(_)));
    let second = ctx.sim.access("A", AccessKind::Load, X + 8, 0).unwrap();
    assert_eq!(second, AccessOutcome::Retry);

    let _ = ctx.sim.run().unwrap();
    let done = ctx.sim.take_completions();
    assert_eq!(done.len(), 1);
    assert_eq!(Some(done[0].token), first.token());
    assert_eq!(ctx.sim.module("A").unwrap().stats().rejections, 1);
}

#[test]
fn test_cancelled_completion_is_not_delivered() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    let token = ctx
        .sim
        .access("A", AccessKind::Load, X, 0)
        .unwrap()
        .token()
        .unwrap();
    assert!(ctx.sim.cancel_completion(token));

    let _ = ctx.sim.run().unwrap();
    assert!(ctx.sim.completions().is_empty());
    // The protocol work still happened.
    assert_eq!(ctx.state("A", X), Exclusive);
    assert!(!ctx.sim.cancel_completion(token));
}

#[test]
fn test_completion_carries_timing() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    let miss = ctx.complete("A", AccessKind::Load, X, 0);
    let hit = ctx.complete("A", AccessKind::Load, X, 0);
    assert!(!miss.hit);
    assert!(hit.hit);
    assert!(miss.completed > miss.issued);
    assert!(hit.completed - hit.issued < miss.completed - miss.issued);
    assert!(miss.completed - miss.issued > crate::common::harness::MEMORY_LATENCY);
}
