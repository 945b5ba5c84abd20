//! Cache Replacement Policy Tests.
//!
//! Verifies the victim selection of the LRU, FIFO and Random policies in isolation,
//! then checks that a cache configured with each policy evicts the expected block.

use hetsim_core::config::ReplacementPolicy as PolicyType;
use hetsim_core::core::units::cache::BlockState;
use hetsim_core::core::units::cache::policies::{
    FifoPolicy, LruPolicy, RandomPolicy, ReplacementPolicy,
};
use rstest::rstest;

use crate::common::harness::{TestContext, single_level};

// ══════════════════════════════════════════════════════════
// 1. Policies in isolation
// ══════════════════════════════════════════════════════════

#[test]
fn test_lru_initial_victim_is_last_way() {
    let mut policy = LruPolicy::new(1, 4);
    assert_eq!(policy.victim(0), 3);
}

#[test]
fn test_lru_evicts_least_recent_after_reaccess() {
    let mut policy = LruPolicy::new(1, 4);
    for way in 0..4 {
        policy.touch(0, way);
    }
    assert_eq!(policy.victim(0), 0);

    policy.touch(0, 0);
    assert_eq!(policy.victim(0), 1);
    policy.touch(0, 1);
    assert_eq!(policy.victim(0), 2);
}

#[test]
fn test_lru_sets_are_independent() {
    let mut policy = LruPolicy::new(2, 2);
    policy.touch(0, 1);
    policy.touch(0, 0);
    assert_eq!(policy.victim(0), 1);
    assert_eq!(policy.victim(1), 1);
    policy.touch(1, 1);
    assert_eq!(policy.victim(1), 0);
}

#[test]
fn test_fifo_ignores_hits() {
    let mut policy = FifoPolicy::new(1, 2);
    policy.fill(0, 0);
    policy.fill(0, 1);
    policy.touch(0, 0);
    policy.touch(0, 0);
    assert_eq!(policy.victim(0), 0);

    policy.fill(0, 0);
    assert_eq!(policy.victim(0), 1);
}

#[test]
fn test_random_is_seeded_and_in_range() {
    let mut a = RandomPolicy::new(4, 42);
    let mut b = RandomPolicy::new(4, 42);
    let seq_a: Vec<usize> = (0..64).map(|_| a.victim(0)).collect();
    let seq_b: Vec<usize> = (0..64).map(|_| b.victim(0)).collect();
    assert_eq!(seq_a, seq_b);
    assert!(seq_a.iter().all(|&w| w < 4));
}

// ══════════════════════════════════════════════════════════
// 2. Policies inside a cache
// ══════════════════════════════════════════════════════════

/// Fills both ways of a one-set cache, re-reads the first block, then forces an eviction.
#[rstest]
#[case::lru(PolicyType::Lru, 0x40)]
#[case::fifo(PolicyType::Fifo, 0x0)]
fn test_cache_evicts_per_policy(#[case] policy: PolicyType, #[case] evicted: u64) {
    let mut config = single_level();
    config.modules[0].num_sets = 1;
    config.modules[0].eviction_policy = policy;
    let mut ctx = TestContext::new(config);

    let _ = ctx.load("l1", 0x0);
    let _ = ctx.load("l1", 0x40);
    let _ = ctx.load("l1", 0x0);
    let _ = ctx.load("l1", 0x80);

    let kept = if evicted == 0x0 { 0x40 } else { 0x0 };
    assert_eq!(ctx.state("l1", evicted), BlockState::Invalid);
    assert!(ctx.state("l1", kept).is_valid());
    assert!(ctx.state("l1", 0x80).is_valid());
    assert_eq!(ctx.sim.module("l1").unwrap().stats().evictions, 1);
}

#[test]
fn test_dirty_victim_is_written_back() {
    let mut config = single_level();
    config.modules[0].num_sets = 1;
    let mut ctx = TestContext::new(config);

    ctx.store("l1", 0x8, 77);
    let _ = ctx.load("l1", 0x40);
    let _ = ctx.load("l1", 0x80);

    assert_eq!(ctx.state("l1", 0x0), BlockState::Invalid);
    assert_eq!(ctx.sim.peek_word("mem", 0x8), Some(77));
    assert_eq!(ctx.load("l1", 0x8), 77);
}
