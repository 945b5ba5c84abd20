//! Interconnect Tests.
//!
//! Checks route lengths for every topology, link contention, per-pair FIFO delivery
//! and that the same coherence traffic runs over each network.

use hetsim_core::common::constants::{CONTROL_MESSAGE_BYTES, data_message_bytes};
use hetsim_core::config::{LinkConfig, NetworkConfig, Topology};
use hetsim_core::soc::interconnect::{Network, NodeId};
use proptest::prelude::*;
use rstest::rstest;

use crate::common::harness::{TestContext, abc_config};

fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("m{i}")).collect()
}

fn network(topology: Topology, links: Vec<LinkConfig>) -> Network {
    let config = NetworkConfig {
        topology,
        bandwidth: 8,
        latency: 1,
        switch_latency: 1,
        links,
    };
    Network::build(&config, &names(6)).unwrap()
}

#[rstest]
#[case::bus(Topology::Bus, 1, 1)]
#[case::crossbar(Topology::Crossbar, 4, 2)]
#[case::ring_neighbor(Topology::Ring, 3, 3)]
#[case::ring_opposite(Topology::Ring, 5, 5)]
fn test_route_lengths(#[case] topology: Topology, #[case] dst: usize, #[case] hops: usize) {
    let net = network(topology, Vec::new());
    let path = net.path(NodeId(2), NodeId(dst)).unwrap();
    assert_eq!(path.len(), hops);
}

#[test]
fn test_ring_wraps_around() {
    let net = network(Topology::Ring, Vec::new());
    // m0 and m5 are neighbors across the wrap link.
    assert_eq!(net.path(NodeId(0), NodeId(5)).unwrap().len(), 3);
    assert_eq!(net.node_count(), 12);
}

#[test]
fn test_point_to_point_routes_over_links() {
    let net = network(
        Topology::PointToPoint,
        vec![LinkConfig::between("m0", "m1"), LinkConfig::between("m1", "m2")],
    );
    assert_eq!(net.path(NodeId(0), NodeId(2)).unwrap().len(), 2);
    assert_eq!(net.path(NodeId(2), NodeId(0)).unwrap().len(), 2);
    assert!(net.path(NodeId(0), NodeId(3)).is_none());
    assert_eq!(net.links().len(), 4);
}

#[test]
fn test_contention_becomes_latency() {
    let mut net = network(Topology::Crossbar, Vec::new());
    let size = data_message_bytes(64);
    let alone = net.send(0, NodeId(0), NodeId(1), size).unwrap();
    // A second sender to the same destination shares the downlink.
    let contended = net.send(0, NodeId(2), NodeId(1), size).unwrap();
    assert!(contended > alone);
    assert!(net.stats().queueing > 0);
    assert_eq!(net.stats().packets, 2);
    assert_eq!(net.stats().bytes, 2 * size);
}

#[test]
fn test_idle_after_transfers_drain() {
    let mut net = network(Topology::Bus, Vec::new());
    let arrival = net.send(5, NodeId(0), NodeId(1), CONTROL_MESSAGE_BYTES).unwrap();
    assert!(!net.is_idle(5));
    assert!(net.is_idle(arrival));
}

proptest! {
    #[test]
    fn test_same_pair_delivery_is_fifo(
        sends in prop::collection::vec((0u64..4, 1u64..200, 0usize..3), 1..60),
        topology in prop::sample::select(vec![Topology::Bus, Topology::Ring, Topology::Crossbar]),
    ) {
        let mut net = network(topology, Vec::new());
        let mut now = 0;
        let mut last = [0u64; 3];
        for (gap, size, pair) in sends {
            now += gap;
            let (src, dst) = [(0, 1), (1, 0), (3, 4)][pair];
            let arrival = net.send(now, NodeId(src), NodeId(dst), size).unwrap();
            prop_assert!(arrival > now);
            prop_assert!(arrival >= last[pair]);
            last[pair] = arrival;
        }
    }
}

#[rstest]
fn test_coherence_traffic_uses_network(
    #[values(Topology::Bus, Topology::PointToPoint, Topology::Ring, Topology::Crossbar)]
    topology: Topology,
) {
    let mut ctx = TestContext::new(abc_config(topology));
    let _ = ctx.load("A", 0x0);
    ctx.store("B", 0x0, 1);
    assert_eq!(ctx.load("A", 0x0), 1);

    let stats = ctx.sim.stats();
    assert!(stats.network.packets >= 6);
    assert!(stats.network.bytes >= data_message_bytes(64));
    assert!(stats.network.average_latency() >= 1.0);
    assert_eq!(ctx.sim.memory().network().topology(), topology);
}
