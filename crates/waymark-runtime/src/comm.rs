//! Who can talk to whom.
//!
//! The fleet asks a [`RangeOracle`] once per pair of active agents per
//! tick. Agents standing on the same vertex can always exchange
//! rendezvous records, whatever the oracle says about gossip.

use serde::{Deserialize, Serialize};
use std::fmt;
use waymark_core::topology::PatrolGraph;
use waymark_core::types::VertexId;

/// Communication range model.
pub trait RangeOracle: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether agents at `a` and `b` can exchange gossip this tick.
    fn in_range(&self, a: VertexId, b: VertexId, graph: &dyn PatrolGraph) -> bool;
}

/// Everyone hears everyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullMesh;

impl RangeOracle for FullMesh {
    fn name(&self) -> &'static str {
        "full-mesh"
    }

    fn in_range(&self, _a: VertexId, _b: VertexId, _graph: &dyn PatrolGraph) -> bool {
        true
    }
}

/// Agents within `max_hops` of each other.
#[derive(Debug, Clone, Copy)]
pub struct HopRange {
    pub max_hops: u32,
}

impl RangeOracle for HopRange {
    fn name(&self) -> &'static str {
        "hop-range"
    }

    fn in_range(&self, a: VertexId, b: VertexId, graph: &dyn PatrolGraph) -> bool {
        graph.hop_distance(&a, &b).is_some_and(|d| d <= self.max_hops)
    }
}

/// Only agents on the same vertex; information moves at rendezvous only.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoLocated;

impl RangeOracle for CoLocated {
    fn name(&self) -> &'static str {
        "co-located"
    }

    fn in_range(&self, a: VertexId, b: VertexId, _graph: &dyn PatrolGraph) -> bool {
        a == b
    }
}

/// Serializable oracle selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CommConfig {
    FullMesh,
    HopRange { max_hops: u32 },
    CoLocated,
}

impl Default for CommConfig {
    fn default() -> Self {
        CommConfig::HopRange { max_hops: 2 }
    }
}

impl CommConfig {
    pub fn build(&self) -> Box<dyn RangeOracle> {
        match *self {
            CommConfig::FullMesh => Box::new(FullMesh),
            CommConfig::HopRange { max_hops } => Box::new(HopRange { max_hops }),
            CommConfig::CoLocated => Box::new(CoLocated),
        }
    }
}
