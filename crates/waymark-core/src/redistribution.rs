//! Fault-triggered redistribution.
//!
//! When a rendezvous fires with expected participants missing, the
//! designated reporter hands the absentees to its
//! [`RedistributionCoordinator`]. The coordinator records the loss in the
//! replica, derives a new layout for the enlarged loss set and publishes
//! it. Gossip carries both to everybody else.
//!
//! New layouts are always derived from the initial partitions and the
//! whole loss set. Any two agents that know the same losses therefore
//! compute the same partitions, whoever reports and in whatever order the
//! agents were lost, and re-running a redistribution never accumulates
//! extra splits.

use crate::error::{PreconditionViolation, Result};
use crate::partition::{split_evenly, PartitionAssigner};
use crate::schedule::MeetingPoint;
use crate::stigmergy::FleetStore;
use crate::topology::PatrolGraph;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A pure function from (initial layout, lost agents) to a new layout.
///
/// Implementations must be deterministic and must return a disjoint,
/// covering partition over the surviving agents.
pub trait RedistributionPolicy: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn redistribute(
        &self,
        partitions: &BTreeMap<AgentId, PartitionInfo>,
        lost: &BTreeSet<AgentId>,
    ) -> Result<BTreeMap<AgentId, PartitionInfo>>;
}

/// Survivors in ascending order, or `NoSurvivors`.
fn survivors(
    partitions: &BTreeMap<AgentId, PartitionInfo>,
    lost: &BTreeSet<AgentId>,
) -> Result<Vec<AgentId>> {
    let alive: Vec<AgentId> = partitions.keys().filter(|a| !lost.contains(a)).copied().collect();
    if alive.is_empty() {
        return Err(PreconditionViolation::NoSurvivors.into());
    }
    Ok(alive)
}

/// Vertices of lost agents, ascending.
fn orphaned(
    partitions: &BTreeMap<AgentId, PartitionInfo>,
    lost: &BTreeSet<AgentId>,
) -> Vec<VertexId> {
    let set: BTreeSet<VertexId> = partitions
        .iter()
        .filter(|(a, _)| lost.contains(a))
        .flat_map(|(_, p)| p.vertex_ids.iter().copied())
        .collect();
    set.into_iter().collect()
}

/// Orphaned vertices are cut into contiguous chunks handed to survivors
/// in ascending id order.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvenSplit;

impl RedistributionPolicy for EvenSplit {
    fn name(&self) -> &'static str {
        "even-split"
    }

    fn redistribute(
        &self,
        partitions: &BTreeMap<AgentId, PartitionInfo>,
        lost: &BTreeSet<AgentId>,
    ) -> Result<BTreeMap<AgentId, PartitionInfo>> {
        let alive = survivors(partitions, lost)?;
        let chunks = split_evenly(&orphaned(partitions, lost), alive.len());
        Ok(alive
            .into_iter()
            .zip(chunks)
            .map(|(agent, extra)| {
                let base = &partitions[&agent];
                let vertices = base.vertex_ids.iter().copied().chain(extra);
                (agent, PartitionInfo::new(base.partition_id, vertices))
            })
            .collect())
    }
}

/// Each orphaned vertex goes to the survivor owning the closest vertex
/// (fewest hops on a graph snapshot); ties go to the lowest id.
#[derive(Debug, Clone, Default)]
pub struct NearestNeighbor {
    adjacency: BTreeMap<VertexId, Vec<VertexId>>,
}

impl NearestNeighbor {
    pub fn from_graph(graph: &dyn PatrolGraph) -> Self {
        let adjacency = graph
            .vertices()
            .into_iter()
            .map(|v| (v, graph.neighbors(&v)))
            .collect();
        Self { adjacency }
    }

    /// Breadth-first search outward from `start` until a level contains
    /// survivor-owned vertices.
    fn nearest_owner(&self, start: VertexId, owner_of: &BTreeMap<VertexId, AgentId>) -> Option<AgentId> {
        let mut seen: BTreeSet<VertexId> = [start].into_iter().collect();
        let mut frontier: VecDeque<VertexId> = [start].into_iter().collect();
        while !frontier.is_empty() {
            let owners: BTreeSet<AgentId> = frontier.iter().filter_map(|v| owner_of.get(v).copied()).collect();
            if let Some(first) = owners.into_iter().next() {
                return Some(first);
            }
            let mut next = VecDeque::new();
            for v in frontier {
                for n in self.adjacency.get(&v).into_iter().flatten() {
                    if seen.insert(*n) {
                        next.push_back(*n);
                    }
                }
            }
            frontier = next;
        }
        None
    }
}

impl RedistributionPolicy for NearestNeighbor {
    fn name(&self) -> &'static str {
        "nearest-neighbor"
    }

    fn redistribute(
        &self,
        partitions: &BTreeMap<AgentId, PartitionInfo>,
        lost: &BTreeSet<AgentId>,
    ) -> Result<BTreeMap<AgentId, PartitionInfo>> {
        let alive = survivors(partitions, lost)?;
        let owner_of: BTreeMap<VertexId, AgentId> = alive
            .iter()
            .flat_map(|a| partitions[a].vertex_ids.iter().map(move |v| (*v, *a)))
            .collect();

        let mut result: BTreeMap<AgentId, PartitionInfo> =
            alive.iter().map(|a| (*a, partitions[a].clone())).collect();
        for vertex in orphaned(partitions, lost) {
            // Unreachable vertices fall back to the lowest surviving id.
            let owner = self.nearest_owner(vertex, &owner_of).unwrap_or(alive[0]);
            if let Some(p) = result.get_mut(&owner) {
                p.vertex_ids.insert(vertex);
            }
        }
        Ok(result)
    }
}

/// Throw the layout away and re-run the assigner over the survivors.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalRepartition;

impl RedistributionPolicy for GlobalRepartition {
    fn name(&self) -> &'static str {
        "global-repartition"
    }

    fn redistribute(
        &self,
        partitions: &BTreeMap<AgentId, PartitionInfo>,
        lost: &BTreeSet<AgentId>,
    ) -> Result<BTreeMap<AgentId, PartitionInfo>> {
        let alive: BTreeSet<AgentId> = survivors(partitions, lost)?.into_iter().collect();
        let all: BTreeSet<VertexId> = partitions
            .values()
            .flat_map(|p| p.vertex_ids.iter().copied())
            .collect();
        PartitionAssigner::new().assign(&alive, &all)
    }
}

/// Configuration-level choice of policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    EvenSplit,
    NearestNeighbor,
    GlobalRepartition,
}

impl PolicyKind {
    pub fn build(&self, graph: &dyn PatrolGraph) -> Arc<dyn RedistributionPolicy> {
        match self {
            PolicyKind::EvenSplit => Arc::new(EvenSplit),
            PolicyKind::NearestNeighbor => Arc::new(NearestNeighbor::from_graph(graph)),
            PolicyKind::GlobalRepartition => Arc::new(GlobalRepartition),
        }
    }
}

/// Result of a redistribution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedistributionOutcome {
    /// New partitions were written to the replica.
    Published {
        excluded: BTreeSet<AgentId>,
        partitions: BTreeMap<AgentId, PartitionInfo>,
    },
    /// The layout for this loss set was already in the replica.
    AlreadyPublished {
        excluded: BTreeSet<AgentId>,
        partitions: BTreeMap<AgentId, PartitionInfo>,
    },
    /// The initial layout has not replicated here yet; retry later.
    Deferred { excluded: BTreeSet<AgentId> },
}

impl RedistributionOutcome {
    pub fn partitions(&self) -> Option<&BTreeMap<AgentId, PartitionInfo>> {
        match self {
            RedistributionOutcome::Published { partitions, .. }
            | RedistributionOutcome::AlreadyPublished { partitions, .. } => Some(partitions),
            RedistributionOutcome::Deferred { .. } => None,
        }
    }
}

/// Per-agent redistribution logic.
#[derive(Debug, Clone)]
pub struct RedistributionCoordinator {
    owner: AgentId,
    roster: BTreeSet<AgentId>,
    vertices: BTreeSet<VertexId>,
    policy: Arc<dyn RedistributionPolicy>,
    /// Loss set still waiting for the initial layout.
    pending: Option<BTreeSet<AgentId>>,
}

impl RedistributionCoordinator {
    pub fn new(
        owner: AgentId,
        roster: BTreeSet<AgentId>,
        vertices: BTreeSet<VertexId>,
        policy: Arc<dyn RedistributionPolicy>,
    ) -> Self {
        Self {
            owner,
            roster,
            vertices,
            policy,
            pending: None,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Handle absentees observed at a rendezvous.
    ///
    /// Idempotent: repeating the call with the same absentees against the
    /// same replica returns the same partitions and writes nothing new.
    pub fn on_missing_agents_at_meeting(
        &mut self,
        meeting: &MeetingPoint,
        missing: &BTreeSet<AgentId>,
        tick: Tick,
        store: &mut FleetStore,
    ) -> Result<RedistributionOutcome> {
        for agent in missing.iter().filter(|a| self.roster.contains(a)) {
            let key = SharedKey::Absence(*agent);
            if !store.contains_key(&key) {
                store.put(
                    key,
                    SharedValue::Absence(AbsenceReport {
                        meeting_vertex: meeting.vertex,
                        tick,
                        reported_by: self.owner,
                    }),
                );
                info!(reporter = %self.owner, lost = %agent, meeting = %meeting, tick, "agent missed rendezvous");
            }
        }
        self.publish_for(store.loss_set(), store)
    }

    /// Make sure the replica's current loss set has a published layout.
    ///
    /// Covers losses that reached this replica from different reporters,
    /// none of whom knew the combined set.
    pub fn reconcile(&mut self, store: &mut FleetStore) -> Result<Option<RedistributionOutcome>> {
        let lost = store.loss_set();
        if lost.is_empty() {
            self.pending = None;
            return Ok(None);
        }
        if store.partitions_under(&self.roster, &lost).is_some() && self.pending.is_none() {
            return Ok(None);
        }
        self.publish_for(lost, store).map(Some)
    }

    fn publish_for(
        &mut self,
        excluded: BTreeSet<AgentId>,
        store: &mut FleetStore,
    ) -> Result<RedistributionOutcome> {
        if self.roster.iter().all(|agent| excluded.contains(agent)) {
            warn!(owner = %self.owner, excluded = ?excluded, "every roster agent is lost");
            return Err(PreconditionViolation::NoSurvivors.into());
        }
        if let Some(partitions) = store.partitions_under(&self.roster, &excluded) {
            self.pending = None;
            return Ok(RedistributionOutcome::AlreadyPublished { excluded, partitions });
        }

        let Some(base) = store.base_partitions(&self.roster) else {
            debug!(owner = %self.owner, excluded = ?excluded, "initial layout not visible, deferring");
            self.pending = Some(excluded.clone());
            return Ok(RedistributionOutcome::Deferred { excluded });
        };

        let partitions = self.policy.redistribute(&base, &excluded)?;
        PartitionAssigner::check_partition(&partitions, &self.vertices)?;

        for (agent, partition) in &partitions {
            let key = SharedKey::Partition(PartitionKey::excluding(*agent, excluded.clone()));
            if !store.contains_key(&key) {
                store.put(key, SharedValue::Partition(partition.clone()));
            }
        }
        self.pending = None;
        info!(
            owner = %self.owner,
            policy = self.policy.name(),
            excluded = ?excluded,
            partitions = partitions.len(),
            "published redistributed partitions"
        );
        Ok(RedistributionOutcome::Published { excluded, partitions })
    }
}
