//! Partition assignment.
//!
//! The assigner runs once, on the lowest-id agent of the roster, and
//! publishes one [`PartitionInfo`] per agent into that agent's replica.
//! Everybody else finds out through gossip and polls `try_get` until
//! their own key shows up.

use crate::error::{PreconditionViolation, Result};
use crate::stigmergy::FleetStore;
use crate::types::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Splits the patrol vertex set among agents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionAssigner;

impl PartitionAssigner {
    pub fn new() -> Self {
        Self
    }

    /// Check that a partition set is disjoint and covers `vertices`.
    pub fn check_partition(
        partitions: &BTreeMap<AgentId, PartitionInfo>,
        vertices: &BTreeSet<VertexId>,
    ) -> Result<()> {
        let mut owner_of: BTreeMap<VertexId, AgentId> = BTreeMap::new();
        for (agent, partition) in partitions {
            for vertex in &partition.vertex_ids {
                if !vertices.contains(vertex) {
                    return Err(PreconditionViolation::ForeignVertex {
                        agent: *agent,
                        vertex: *vertex,
                    }
                    .into());
                }
                if let Some(first) = owner_of.insert(*vertex, *agent) {
                    return Err(PreconditionViolation::OverlappingPartitions {
                        vertex: *vertex,
                        first,
                        second: *agent,
                    }
                    .into());
                }
            }
        }
        if let Some(missing) = vertices.iter().find(|v| !owner_of.contains_key(v)) {
            return Err(PreconditionViolation::UncoveredVertex(*missing).into());
        }
        Ok(())
    }

    /// Cheap up-front check of the assignment preconditions.
    pub fn validate(agents: &BTreeSet<AgentId>, vertices: &BTreeSet<VertexId>) -> Result<()> {
        if agents.is_empty() {
            return Err(PreconditionViolation::NoAgents.into());
        }
        if vertices.len() < agents.len() {
            return Err(PreconditionViolation::TooFewVertices {
                vertices: vertices.len(),
                agents: agents.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Compute one partition per agent.
    ///
    /// Vertices in ascending order are cut into contiguous chunks whose
    /// sizes differ by at most one; agents in ascending order take the
    /// chunks in turn and the agent's rank becomes its `partition_id`.
    pub fn assign(
        &self,
        agents: &BTreeSet<AgentId>,
        vertices: &BTreeSet<VertexId>,
    ) -> Result<BTreeMap<AgentId, PartitionInfo>> {
        Self::validate(agents, vertices)?;

        let ordered: Vec<VertexId> = vertices.iter().copied().collect();
        let partitions: BTreeMap<AgentId, PartitionInfo> = split_evenly(&ordered, agents.len())
            .into_iter()
            .zip(agents.iter())
            .enumerate()
            .map(|(rank, (chunk, agent))| (*agent, PartitionInfo::new(rank as u32, chunk)))
            .collect();

        if partitions.len() != agents.len() {
            return Err(PreconditionViolation::PartitionCountMismatch {
                partitions: partitions.len(),
                agents: agents.len(),
            }
            .into());
        }
        Self::check_partition(&partitions, vertices)?;

        debug!(
            agents = agents.len(),
            vertices = vertices.len(),
            "computed initial partition layout"
        );
        Ok(partitions)
    }

    /// Publish the initial layout into a replica.
    pub fn publish(store: &mut FleetStore, partitions: &BTreeMap<AgentId, PartitionInfo>) {
        for (agent, partition) in partitions {
            store.put(
                SharedKey::Partition(PartitionKey::initial(*agent)),
                SharedValue::Partition(partition.clone()),
            );
        }
        info!(
            publisher = %store.owner(),
            partitions = partitions.len(),
            "published initial partitions"
        );
    }
}

/// Cut `items` into `parts` contiguous chunks, the first `len % parts`
/// of them one element longer.
pub fn split_evenly<T: Clone>(items: &[T], parts: usize) -> Vec<Vec<T>> {
    if parts == 0 {
        return Vec::new();
    }
    let base = items.len() / parts;
    let extra = items.len() % parts;
    let mut chunks = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        chunks.push(items[start..start + len].to_vec());
        start += len;
    }
    chunks
}
