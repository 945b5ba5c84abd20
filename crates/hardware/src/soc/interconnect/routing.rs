//! Shortest-path routing.
//!
//! Routes are computed once at build time with Floyd–Warshall over hop counts. The table
//! stores, for every `(src, dst)` pair, the first link to take; paths are rebuilt by
//! following first hops.

use super::{Link, NodeId};

/// All-pairs next-hop table.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    nodes: usize,
    next: Vec<Option<usize>>,
}

impl RoutingTable {
    /// Computes shortest paths over `links`.
    ///
    /// # Arguments
    ///
    /// * `nodes` - Number of nodes (end nodes and switches).
    /// * `links` - Directed links; their index is the link id.
    pub fn build(nodes: usize, links: &[Link]) -> Self {
        let idx = |a: usize, b: usize| a * nodes + b;
        let mut dist = vec![u32::MAX; nodes * nodes];
        let mut next = vec![None; nodes * nodes];

        for n in 0..nodes {
            dist[idx(n, n)] = 0;
        }
        for (l, link) in links.iter().enumerate() {
            let i = idx(link.src.0, link.dst.0);
            if dist[i] > 1 {
                dist[i] = 1;
                next[i] = Some(l);
            }
        }

        for k in 0..nodes {
            for i in 0..nodes {
                let ik = dist[idx(i, k)];
                if ik == u32::MAX {
                    continue;
                }
                for j in 0..nodes {
                    let kj = dist[idx(k, j)];
                    if kj == u32::MAX {
                        continue;
                    }
                    if ik + kj < dist[idx(i, j)] {
                        dist[idx(i, j)] = ik + kj;
                        next[idx(i, j)] = next[idx(i, k)];
                    }
                }
            }
        }

        Self { nodes, next }
    }

    /// Returns the links from `src` to `dst`, or `None` if unreachable.
    ///
    /// A node reaches itself through an empty path.
    pub fn path(&self, links: &[Link], src: NodeId, dst: NodeId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut at = src;
        while at != dst {
            let l = self.next.get(at.0 * self.nodes + dst.0).copied().flatten()?;
            path.push(l);
            at = links[l].dst;
            if path.len() > self.nodes {
                return None;
            }
        }
        Some(path)
    }
}
