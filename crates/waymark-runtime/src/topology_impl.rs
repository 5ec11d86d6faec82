//! Concrete implementation of the PatrolGraph trait using petgraph.
//!
//! Uses petgraph's undirected `Graph` as the backing store with a
//! HashMap index for O(1) vertex lookup by id. Edges are unweighted:
//! every hop costs one tick.

use petgraph::algo::{astar, connected_components, dijkstra};
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::HashMap;
use waymark_core::error::{PreconditionViolation, Result};
use waymark_core::topology::PatrolGraph;
use waymark_core::types::VertexId;

/// Petgraph-backed patrol graph.
#[derive(Debug, Clone, Default)]
pub struct PetPatrolGraph {
    graph: UnGraph<VertexId, ()>,
    /// Map from our VertexId to petgraph's internal index.
    index: HashMap<VertexId, NodeIndex>,
}

impl PetPatrolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path `0 - 1 - ... - n-1`.
    pub fn line(n: u32) -> Self {
        let mut g = Self::new();
        for i in 0..n {
            g.add_vertex(VertexId(i));
        }
        for i in 1..n {
            g.link(VertexId(i - 1), VertexId(i));
        }
        g
    }

    /// Cycle `0 - 1 - ... - n-1 - 0`. Below three vertices this is a line.
    pub fn ring(n: u32) -> Self {
        let mut g = Self::line(n);
        if n > 2 {
            g.link(VertexId(n - 1), VertexId(0));
        }
        g
    }

    /// `width x height` grid, vertex `y * width + x`.
    pub fn grid(width: u32, height: u32) -> Self {
        let mut g = Self::new();
        for i in 0..width * height {
            g.add_vertex(VertexId(i));
        }
        for y in 0..height {
            for x in 0..width {
                let v = y * width + x;
                if x + 1 < width {
                    g.link(VertexId(v), VertexId(v + 1));
                }
                if y + 1 < height {
                    g.link(VertexId(v), VertexId(v + width));
                }
            }
        }
        g
    }

    /// Build from explicit vertex and edge lists.
    pub fn from_edges(
        vertices: impl IntoIterator<Item = VertexId>,
        edges: impl IntoIterator<Item = (VertexId, VertexId)>,
    ) -> Result<Self> {
        let mut g = Self::new();
        for v in vertices {
            g.add_vertex(v);
        }
        for (a, b) in edges {
            g.add_edge(a, b)?;
        }
        Ok(g)
    }

    /// Add a vertex. Returns false if it already existed.
    pub fn add_vertex(&mut self, vertex: VertexId) -> bool {
        if self.index.contains_key(&vertex) {
            return false;
        }
        let idx = self.graph.add_node(vertex);
        self.index.insert(vertex, idx);
        true
    }

    /// Connect two existing vertices.
    pub fn add_edge(&mut self, a: VertexId, b: VertexId) -> Result<()> {
        for v in [a, b] {
            if !self.index.contains_key(&v) {
                return Err(PreconditionViolation::UnknownVertex(v).into());
            }
        }
        self.link(a, b);
        Ok(())
    }

    fn link(&mut self, a: VertexId, b: VertexId) {
        let (Some(&ia), Some(&ib)) = (self.index.get(&a), self.index.get(&b)) else {
            return;
        };
        if a != b && self.graph.find_edge(ia, ib).is_none() {
            self.graph.add_edge(ia, ib, ());
        }
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_connected(&self) -> bool {
        self.graph.node_count() == 0 || connected_components(&self.graph) == 1
    }
}

impl PatrolGraph for PetPatrolGraph {
    fn vertices(&self) -> Vec<VertexId> {
        let mut all: Vec<VertexId> = self.index.keys().copied().collect();
        all.sort();
        all
    }

    fn contains(&self, vertex: &VertexId) -> bool {
        self.index.contains_key(vertex)
    }

    fn neighbors(&self, vertex: &VertexId) -> Vec<VertexId> {
        let Some(&idx) = self.index.get(vertex) else {
            return Vec::new();
        };
        let mut out: Vec<VertexId> = self.graph.neighbors(idx).map(|n| self.graph[n]).collect();
        out.sort();
        out.dedup();
        out
    }

    fn edges(&self) -> Vec<(VertexId, VertexId)> {
        let mut out: Vec<(VertexId, VertexId)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| {
                let (a, b) = (self.graph[a], self.graph[b]);
                (a.min(b), a.max(b))
            })
            .collect();
        out.sort();
        out
    }

    fn hop_distance(&self, from: &VertexId, to: &VertexId) -> Option<u32> {
        let start = *self.index.get(from)?;
        let goal = *self.index.get(to)?;
        astar(&self.graph, start, |n| n == goal, |_| 1u32, |_| 0).map(|(cost, _)| cost)
    }

    fn next_hop(&self, from: &VertexId, to: &VertexId) -> Option<VertexId> {
        let start = *self.index.get(from)?;
        let goal = *self.index.get(to)?;
        if start == goal {
            return Some(*from);
        }
        // Distances toward the goal; the neighbour closest to it wins,
        // lowest id on ties.
        let dist = dijkstra(&self.graph, goal, None, |_| 1u32);
        self.graph
            .neighbors(start)
            .filter_map(|n| dist.get(&n).map(|d| (*d, self.graph[n])))
            .min()
            .map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_distances() {
        let g = PetPatrolGraph::line(5);
        assert_eq!(g.vertex_count(), 5);
        assert_eq!(g.hop_distance(&VertexId(0), &VertexId(4)), Some(4));
        assert_eq!(g.next_hop(&VertexId(0), &VertexId(4)), Some(VertexId(1)));
        assert_eq!(g.next_hop(&VertexId(3), &VertexId(3)), Some(VertexId(3)));
        assert_eq!(g.neighbors(&VertexId(2)), vec![VertexId(1), VertexId(3)]);
        assert!(g.is_connected());
    }

    #[test]
    fn ring_wraps_around() {
        let g = PetPatrolGraph::ring(20);
        assert_eq!(g.edge_count(), 20);
        assert_eq!(g.hop_distance(&VertexId(0), &VertexId(13)), Some(7));
        assert_eq!(g.next_hop(&VertexId(0), &VertexId(13)), Some(VertexId(19)));
        assert_eq!(PetPatrolGraph::ring(2).edge_count(), 1);
    }

    #[test]
    fn grid_prefers_lowest_neighbour_on_ties() {
        // 0 1
        // 2 3
        let g = PetPatrolGraph::grid(2, 2);
        assert_eq!(g.edge_count(), 4);
        assert_eq!(g.hop_distance(&VertexId(0), &VertexId(3)), Some(2));
        assert_eq!(g.next_hop(&VertexId(0), &VertexId(3)), Some(VertexId(1)));
    }

    #[test]
    fn disconnected_vertices_are_unreachable() {
        let g = PetPatrolGraph::from_edges(
            [VertexId(0), VertexId(1), VertexId(7)],
            [(VertexId(0), VertexId(1))],
        )
        .unwrap();
        assert!(!g.is_connected());
        assert_eq!(g.hop_distance(&VertexId(0), &VertexId(7)), None);
        assert_eq!(g.next_hop(&VertexId(0), &VertexId(7)), None);
        assert_eq!(g.edges(), vec![(VertexId(0), VertexId(1))]);
    }

    #[test]
    fn edge_to_unknown_vertex_is_rejected() {
        let mut g = PetPatrolGraph::line(2);
        assert!(g.add_edge(VertexId(0), VertexId(9)).is_err());
        assert!(!g.add_vertex(VertexId(1)));
    }
}
