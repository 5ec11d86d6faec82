//! Shared types used across all Waymark crates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The current tick of the simulation.
pub type Tick = u64;

/// Unique identifier for an agent in the fleet.
///
/// Ids are stable for the whole run. Their numeric order is meaningful:
/// the stigmergy merge rule and the rendezvous reporter both prefer the
/// lowest id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl AgentId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent-{}", self.0)
    }
}

/// Identifier for a vertex of the patrol graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u32);

impl VertexId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The slice of the patrol graph one agent is responsible for.
///
/// Immutable once published. A redistribution publishes a new
/// `PartitionInfo` under a new key rather than editing this one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub partition_id: u32,
    pub vertex_ids: BTreeSet<VertexId>,
}

impl PartitionInfo {
    pub fn new(partition_id: u32, vertex_ids: impl IntoIterator<Item = VertexId>) -> Self {
        Self {
            partition_id,
            vertex_ids: vertex_ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, vertex: &VertexId) -> bool {
        self.vertex_ids.contains(vertex)
    }

    pub fn len(&self) -> usize {
        self.vertex_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_ids.is_empty()
    }
}

impl fmt::Display for PartitionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [", self.partition_id)?;
        for (i, v) in self.vertex_ids.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", v.0)?;
        }
        write!(f, "]")
    }
}

/// Store key for a published partition.
///
/// `excluded` is the set of lost agents the layout was derived for. The
/// initial layout has an empty set; every redistribution publishes under
/// the enlarged set, which is how a partition gets a new key version
/// without the store ever deleting anything.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub owner: AgentId,
    pub excluded: BTreeSet<AgentId>,
}

impl PartitionKey {
    pub fn initial(owner: AgentId) -> Self {
        Self {
            owner,
            excluded: BTreeSet::new(),
        }
    }

    pub fn excluding(owner: AgentId, excluded: BTreeSet<AgentId>) -> Self {
        Self { owner, excluded }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition/{}", self.owner.0)?;
        if !self.excluded.is_empty() {
            let ids: Vec<String> = self.excluded.iter().map(|a| a.0.to_string()).collect();
            write!(f, "-{{{}}}", ids.join(","))?;
        }
        Ok(())
    }
}

/// Gossiped fact that an agent failed to show up at a rendezvous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbsenceReport {
    pub meeting_vertex: VertexId,
    pub tick: Tick,
    pub reported_by: AgentId,
}

/// Keys of the fleet's shared store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SharedKey {
    /// The partition of one agent for one loss set.
    Partition(PartitionKey),
    /// An agent known to be lost.
    Absence(AgentId),
}

impl fmt::Display for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharedKey::Partition(key) => write!(f, "{}", key),
            SharedKey::Absence(agent) => write!(f, "absence/{}", agent.0),
        }
    }
}

/// Values of the fleet's shared store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SharedValue {
    Partition(PartitionInfo),
    Absence(AbsenceReport),
}

impl SharedValue {
    pub fn as_partition(&self) -> Option<&PartitionInfo> {
        match self {
            SharedValue::Partition(p) => Some(p),
            SharedValue::Absence(_) => None,
        }
    }
}

/// Movement status reported by the surrounding simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionStatus {
    /// Standing on a vertex with no pending move.
    Idle,
    /// Travelling toward a target vertex.
    Moving,
    /// The last move command could not be executed.
    Blocked,
}

impl MotionStatus {
    /// Stable token used by condition-based suspension.
    pub fn token(&self) -> u64 {
        match self {
            MotionStatus::Idle => 0,
            MotionStatus::Moving => 1,
            MotionStatus::Blocked => 2,
        }
    }
}

/// Movement intent returned by an agent's tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentIntent {
    /// Stay on the current vertex.
    Hold,
    /// Travel toward a vertex, one hop per tick.
    MoveTo(VertexId),
}

/// Diagnostic events an agent reports to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentEvent {
    /// The agent published the initial partition layout.
    AssignmentPublished { partitions: usize },
    /// The agent's own partition became visible in its replica.
    PartitionAdopted { partition: PartitionInfo, excluded: BTreeSet<AgentId> },
    /// A rendezvous was held with every expected participant.
    MeetingHeld { vertex: VertexId, tick: Tick, present: BTreeSet<AgentId> },
    /// A rendezvous fired with expected participants absent.
    MeetingPartiallyMissed { vertex: VertexId, tick: Tick, absent: BTreeSet<AgentId> },
    /// The agent missed a rendezvous it was expected at.
    MeetingMissed { vertex: VertexId, scheduled_tick: Tick },
    /// New partitions were published for a loss set.
    RedistributionPublished { excluded: BTreeSet<AgentId> },
    /// A redistribution is waiting for the initial layout to become visible.
    RedistributionDeferred { excluded: BTreeSet<AgentId> },
}
