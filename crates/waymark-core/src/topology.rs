//! The patrol graph agents move on.
//!
//! The graph itself is supplied by the surrounding simulation. This trait
//! is the narrow view the coordination layer needs: the vertex set, the
//! neighbour relation and hop distances.

use crate::types::*;

/// Read-only view of the patrol graph.
pub trait PatrolGraph {
    /// All vertices, ascending.
    fn vertices(&self) -> Vec<VertexId>;

    /// Whether a vertex belongs to the graph.
    fn contains(&self, vertex: &VertexId) -> bool;

    /// Neighbours of a vertex, ascending.
    fn neighbors(&self, vertex: &VertexId) -> Vec<VertexId>;

    /// All undirected edges as `(low, high)` pairs, ascending.
    fn edges(&self) -> Vec<(VertexId, VertexId)>;

    /// Number of hops on a shortest path, `None` if unreachable.
    fn hop_distance(&self, from: &VertexId, to: &VertexId) -> Option<u32>;

    /// First step of a shortest path from `from` toward `to`.
    ///
    /// Returns `Some(from)` when already there and `None` if unreachable.
    fn next_hop(&self, from: &VertexId, to: &VertexId) -> Option<VertexId>;

    /// Number of vertices.
    fn vertex_count(&self) -> usize {
        self.vertices().len()
    }
}
