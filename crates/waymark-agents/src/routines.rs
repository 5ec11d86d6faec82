//! The routines a [`PatrolAgent`](crate::patrol::PatrolAgent) runs.
//!
//! Priorities: assignment (0) before reconcile (5) before partition
//! lookup (10) before patrol planning (20), so a partition published
//! earlier in the tick is already visible to the planner.

use crate::patrol::PatrolState;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use waymark_core::prelude::*;

/// Publishes the initial layout. Only the lowest roster id does anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignPartitions;

impl Routine<PatrolState> for AssignPartitions {
    fn name(&self) -> &'static str {
        "assign-partitions"
    }

    fn priority(&self) -> u8 {
        0
    }

    fn advance(&mut self, state: &mut PatrolState, _ctx: &TickContext<'_>) -> Result<Suspend> {
        if !state.is_assigner() || state.store.base_partitions(&state.roster).is_some() {
            return Ok(Suspend::Finished);
        }
        let layout = PartitionAssigner::new().assign(&state.roster, &state.vertices)?;
        PartitionAssigner::publish(&mut state.store, &layout);
        state.events.push(AgentEvent::AssignmentPublished {
            partitions: layout.len(),
        });
        Ok(Suspend::Finished)
    }
}

/// Keeps the replica's loss set covered by a published layout.
#[derive(Debug, Clone, Default)]
pub struct Reconcile {
    /// Last loss set reported as deferred, so a retry loop logs once.
    deferred: Option<BTreeSet<AgentId>>,
}

impl Routine<PatrolState> for Reconcile {
    fn name(&self) -> &'static str {
        "reconcile"
    }

    fn priority(&self) -> u8 {
        5
    }

    fn advance(&mut self, state: &mut PatrolState, ctx: &TickContext<'_>) -> Result<Suspend> {
        match state.coordinator.reconcile(&mut state.store)? {
            Some(RedistributionOutcome::Published { excluded, .. }) => {
                debug!(agent = %state.id, tick = ctx.tick, excluded = ?excluded, "reconciled loss set");
                state.events.push(AgentEvent::RedistributionPublished { excluded });
            }
            Some(RedistributionOutcome::Deferred { excluded }) => {
                if self.deferred.as_ref() != Some(&excluded) {
                    self.deferred = Some(excluded.clone());
                    state.events.push(AgentEvent::RedistributionDeferred { excluded });
                }
            }
            Some(RedistributionOutcome::AlreadyPublished { .. }) | None => {}
        }
        Ok(if state.coordinator.has_pending() {
            Suspend::NextTick
        } else {
            Suspend::Until(Condition::LossSetChanged)
        })
    }
}

/// Polls the replica for the agent's partition under the current loss
/// set, and re-polls whenever that set grows.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionLookup;

impl Routine<PatrolState> for PartitionLookup {
    fn name(&self) -> &'static str {
        "partition-lookup"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn advance(&mut self, state: &mut PatrolState, ctx: &TickContext<'_>) -> Result<Suspend> {
        if state.declared_lost {
            return Ok(Suspend::Finished);
        }
        let lost = state.store.loss_set();
        let Some(found) = state.store.partition_under(state.id, &lost) else {
            // Not replicated yet. Keep patrolling the old partition meanwhile.
            return Ok(Suspend::NextTick);
        };
        if state.partition.as_ref() != Some(found) || state.partition_excluded != lost {
            info!(
                agent = %state.id,
                tick = ctx.tick,
                partition = %found,
                excluded = ?lost,
                "adopted partition"
            );
            let partition = found.clone();
            state.partition = Some(partition.clone());
            state.partition_excluded = lost.clone();
            state.events.push(AgentEvent::PartitionAdopted {
                partition,
                excluded: lost,
            });
        }
        Ok(Suspend::Until(Condition::LossSetChanged))
    }
}

/// Chooses the movement intent.
///
/// The next own rendezvous takes precedence once the ticks left before it
/// are no more than the hop distance plus one. Otherwise the agent walks
/// to the least recently visited vertex of its partition, nearest first
/// on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatrolPlanner;

impl PatrolPlanner {
    fn next_meeting(state: &PatrolState, ctx: &TickContext<'_>) -> Option<(VertexId, Tick)> {
        let lost = state.store.loss_set();
        state
            .meetings
            .iter()
            .filter(|m| m.participants.iter().any(|p| *p != state.id && !lost.contains(p)))
            .filter_map(|m| Some((m.vertex, state.tracker.next_rendezvous(m)?)))
            .filter(|(_, tick)| *tick >= ctx.tick)
            .min_by_key(|(vertex, tick)| (*tick, *vertex))
    }

    fn patrol_target(state: &PatrolState, ctx: &TickContext<'_>) -> Option<VertexId> {
        let partition = state.partition.as_ref()?;
        partition
            .vertex_ids
            .iter()
            .filter(|v| **v != state.position && !state.unreachable.contains(v))
            .filter_map(|v| {
                let hops = ctx.graph.hop_distance(&state.position, v)?;
                Some((state.last_visit.get(v).copied(), hops, *v))
            })
            .min()
            .map(|(_, _, v)| v)
    }
}

impl Routine<PatrolState> for PatrolPlanner {
    fn name(&self) -> &'static str {
        "patrol-planner"
    }

    fn priority(&self) -> u8 {
        20
    }

    fn advance(&mut self, state: &mut PatrolState, ctx: &TickContext<'_>) -> Result<Suspend> {
        if state.declared_lost {
            state.intent = AgentIntent::Hold;
            return Ok(Suspend::Finished);
        }

        if ctx.motion == MotionStatus::Blocked {
            if let AgentIntent::MoveTo(target) = state.intent {
                warn!(agent = %state.id, target = %target, tick = ctx.tick, "route blocked");
                state.unreachable.insert(target);
            }
            state.intent = AgentIntent::Hold;
            return Ok(Suspend::Until(Condition::MotionStatusChanged));
        }

        if let Some((vertex, at)) = Self::next_meeting(state, ctx) {
            if let Some(hops) = ctx.graph.hop_distance(&state.position, &vertex) {
                let remaining = at - ctx.tick;
                if remaining <= u64::from(hops) + 1 {
                    state.intent = if hops == 0 {
                        AgentIntent::Hold
                    } else {
                        AgentIntent::MoveTo(vertex)
                    };
                    return Ok(Suspend::NextTick);
                }
            }
        }

        state.intent = match Self::patrol_target(state, ctx) {
            Some(target) => AgentIntent::MoveTo(target),
            None => AgentIntent::Hold,
        };
        Ok(Suspend::NextTick)
    }
}
