//! Interconnect between memory modules.
//!
//! This module models the network that carries coherence messages. It provides:
//! 1. **Topologies:** Bus, point-to-point, ring and crossbar, built from the configuration.
//! 2. **Routing:** Shortest paths through switches and intermediate nodes.
//! 3. **Contention:** Each link serializes transfers through a busy-until cycle, so
//!    congestion shows up as added latency rather than as an error.
//! 4. **Ordering:** Packets between the same pair of nodes arrive in send order.

/// Shortest-path routing table.
pub mod routing;

use std::collections::BTreeMap;

use crate::common::addr::Cycle;
use crate::common::error::ConfigError;
use crate::config::{NetworkConfig, Topology};
use crate::stats::NetworkStats;

use self::routing::RoutingTable;

/// Index of a network node. End nodes share indices with the modules they attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// A directed link with its own bandwidth budget.
#[derive(Debug, Clone)]
pub struct Link {
    /// Sending node.
    pub src: NodeId,
    /// Receiving node.
    pub dst: NodeId,
    /// Bytes per cycle.
    pub bandwidth: u64,
    /// Propagation latency in cycles.
    pub latency: Cycle,
    /// First cycle at which the link can start another transfer.
    pub busy_until: Cycle,
    /// Bytes carried.
    pub bytes: u64,
    /// Transfers carried.
    pub transfers: u64,
}

impl Link {
    /// Creates an idle link.
    pub const fn new(src: NodeId, dst: NodeId, bandwidth: u64, latency: Cycle) -> Self {
        Self {
            src,
            dst,
            bandwidth,
            latency,
            busy_until: 0,
            bytes: 0,
            transfers: 0,
        }
    }

    /// Returns the number of cycles the link is occupied by a transfer of `bytes`.
    ///
    /// # Returns
    ///
    /// ceiling(bytes / bandwidth), at least one.
    pub const fn transfer_cycles(&self, bytes: u64) -> Cycle {
        let cycles = bytes.div_ceil(self.bandwidth);
        if cycles == 0 { 1 } else { cycles }
    }
}

/// The network connecting all modules.
#[derive(Debug)]
pub struct Network {
    topology: Topology,
    nodes: usize,
    links: Vec<Link>,
    routes: RoutingTable,
    switch_latency: Cycle,
    last_arrival: BTreeMap<(NodeId, NodeId), Cycle>,
    stats: NetworkStats,
}

impl Network {
    /// Builds the network for `endpoints` end nodes.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated network configuration.
    /// * `names` - Module names, indexed like the end nodes.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Topology` if the description cannot be built.
    pub fn build(config: &NetworkConfig, names: &[String]) -> Result<Self, ConfigError> {
        let n = names.len();
        let bw = config.bandwidth;
        let lat = config.latency;
        let mut links = Vec::new();
        let nodes = match config.topology {
            Topology::Bus => {
                // A single medium; the routing table is bypassed.
                links.push(Link::new(NodeId(0), NodeId(0), bw, lat));
                n
            }
            Topology::Crossbar => {
                let switch = NodeId(n);
                for i in 0..n {
                    links.push(Link::new(NodeId(i), switch, bw, lat));
                    links.push(Link::new(switch, NodeId(i), bw, lat));
                }
                n + 1
            }
            Topology::Ring => {
                for i in 0..n {
                    let sw = NodeId(n + i);
                    links.push(Link::new(NodeId(i), sw, bw, lat));
                    links.push(Link::new(sw, NodeId(i), bw, lat));
                }
                let ring_links = match n {
                    0 | 1 => 0,
                    2 => 1,
                    _ => n,
                };
                for i in 0..ring_links {
                    let a = NodeId(n + i);
                    let b = NodeId(n + (i + 1) % n);
                    links.push(Link::new(a, b, bw, lat));
                    links.push(Link::new(b, a, bw, lat));
                }
                2 * n
            }
            Topology::PointToPoint => {
                let index = |name: &str| {
                    names
                        .iter()
                        .position(|m| m == name)
                        .ok_or_else(|| ConfigError::Topology(format!("unknown node '{name}'")))
                };
                for l in &config.links {
                    let (a, b) = (NodeId(index(&l.src)?), NodeId(index(&l.dst)?));
                    let lbw = l.bandwidth.unwrap_or(bw);
                    let llat = l.latency.unwrap_or(lat);
                    links.push(Link::new(a, b, lbw, llat));
                    if l.bidirectional {
                        links.push(Link::new(b, a, lbw, llat));
                    }
                }
                n
            }
        };
        let routes = RoutingTable::build(nodes, &links);
        Ok(Self {
            topology: config.topology,
            nodes,
            links,
            routes,
            switch_latency: config.switch_latency,
            last_arrival: BTreeMap::new(),
            stats: NetworkStats::default(),
        })
    }

    /// Configured topology.
    pub const fn topology(&self) -> Topology {
        self.topology
    }

    /// Number of nodes, switches included.
    pub const fn node_count(&self) -> usize {
        self.nodes
    }

    /// Links, indexed by link id.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Counters.
    pub const fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Returns the links a packet from `src` to `dst` traverses.
    pub fn path(&self, src: NodeId, dst: NodeId) -> Option<Vec<usize>> {
        if self.topology == Topology::Bus {
            return Some(vec![0]);
        }
        self.routes.path(&self.links, src, dst)
    }

    /// Returns true if no link is busy at or after `now`.
    pub fn is_idle(&self, now: Cycle) -> bool {
        self.links.iter().all(|l| l.busy_until <= now)
    }

    /// Sends a packet and reserves bandwidth on every link of its path.
    ///
    /// # Arguments
    ///
    /// * `now` - Current cycle.
    /// * `src` - Sending node.
    /// * `dst` - Receiving node.
    /// * `size` - Packet size in bytes.
    ///
    /// # Returns
    ///
    /// The arrival cycle (strictly after `now`, never before an earlier packet of the same
    /// pair), or `None` if `dst` is unreachable.
    pub fn send(&mut self, now: Cycle, src: NodeId, dst: NodeId, size: u64) -> Option<Cycle> {
        let path = self.path(src, dst)?;
        let mut t = now;
        for (hop, &l) in path.iter().enumerate() {
            if hop > 0 {
                t += self.switch_latency;
            }
            let link = &mut self.links[l];
            let start = t.max(link.busy_until);
            self.stats.queueing += start - t;
            link.busy_until = start + link.transfer_cycles(size);
            link.bytes += size;
            link.transfers += 1;
            t = link.busy_until + link.latency;
        }

        let mut arrival = t.max(now + 1);
        let last = self.last_arrival.entry((src, dst)).or_insert(0);
        arrival = arrival.max(*last);
        *last = arrival;

        self.stats.packets += 1;
        self.stats.bytes += size;
        self.stats.total_latency += arrival - now;
        Some(arrival)
    }
}
