//! Fleet builder with setup validation.
//!
//! Setup defects are caught here, before the first tick. The builder also
//! derives the meeting points, which every agent receives by value.
//!
//! # Example
//!
//! ```rust
//! use waymark_runtime::prelude::*;
//!
//! let mut fleet = FleetBuilder::new()
//!     .with_graph(PetPatrolGraph::line(9))
//!     .agent(AgentId::new(1), VertexId::new(0))
//!     .agent(AgentId::new(2), VertexId::new(4))
//!     .agent(AgentId::new(3), VertexId::new(8))
//!     .build()
//!     .unwrap();
//! fleet.run(5).unwrap();
//! assert_eq!(fleet.patrol_layout().len(), 3);
//! ```

use crate::comm::CommConfig;
use crate::fleet::{Fleet, FleetConfig};
use crate::topology_impl::PetPatrolGraph;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};
use waymark_agents::prelude::*;

/// Builder for [`Fleet`].
#[derive(Debug, Default)]
pub struct FleetBuilder {
    graph: Option<PetPatrolGraph>,
    agents: Vec<(AgentId, VertexId)>,
    removals: Vec<(AgentId, Tick)>,
    config: FleetConfig,
}

impl FleetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph(mut self, graph: PetPatrolGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Add an agent starting on `start`.
    pub fn agent(mut self, id: AgentId, start: VertexId) -> Self {
        self.agents.push((id, start));
        self
    }

    pub fn with_config(mut self, config: FleetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.config.schedule = schedule;
        self
    }

    pub fn with_comm(mut self, comm: CommConfig) -> Self {
        self.config.comm = comm;
        self
    }

    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.config.redistribution = policy;
        self
    }

    /// Script the removal of an agent at the start of `tick`.
    pub fn remove_at(mut self, id: AgentId, tick: Tick) -> Self {
        self.removals.push((id, tick));
        self
    }

    /// Validate the setup and create the fleet.
    pub fn build(self) -> Result<Fleet> {
        let graph = self
            .graph
            .ok_or_else(|| WaymarkError::invalid_config("graph", "none", "a patrol graph is required"))?;

        let mut roster = BTreeSet::new();
        for (id, start) in &self.agents {
            if !roster.insert(*id) {
                return Err(PreconditionViolation::DuplicateAgent(*id).into());
            }
            if !graph.contains(start) {
                return Err(PreconditionViolation::UnknownVertex(*start).into());
            }
        }
        for (id, tick) in &self.removals {
            if !roster.contains(id) {
                return Err(WaymarkError::invalid_config(
                    "faults.agent",
                    id.to_string(),
                    format!("removal at tick {} names an agent that is not in the fleet", tick),
                ));
            }
        }

        let vertices: BTreeSet<VertexId> = graph.vertices().into_iter().collect();
        if !graph.is_connected() {
            warn!(vertices = vertices.len(), "patrol graph is not connected; some vertices cannot be reached");
        }

        // Meeting points come from the layout the assigner is going to
        // publish; the assignment is deterministic, so computing it here
        // gives the same answer.
        let layout = PartitionAssigner::new().assign(&roster, &vertices)?;
        let starts: BTreeMap<AgentId, VertexId> = self.agents.iter().copied().collect();
        let meetings = plan_meetings(&layout, &graph, &self.config.schedule)?;
        let meetings = delay_for_starts(meetings, &starts, &graph)?;
        let policy = self.config.redistribution.build(&graph);
        let oracle = self.config.comm.build();

        let agents: Vec<PatrolAgent> = self
            .agents
            .iter()
            .map(|(id, start)| {
                PatrolAgent::new(*id, *start, roster.clone(), vertices.clone())
                    .with_meetings(meetings.iter().cloned())
                    .with_policy(policy.clone())
            })
            .collect();

        info!(
            agents = agents.len(),
            vertices = vertices.len(),
            meetings = meetings.len(),
            policy = policy.name(),
            oracle = oracle.name(),
            "fleet ready"
        );

        let mut fleet = Fleet::new(graph, oracle, agents, meetings);
        for (id, tick) in self.removals {
            fleet.schedule_removal(id, tick);
        }
        Ok(fleet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_on_a_line() -> FleetBuilder {
        FleetBuilder::new()
            .with_graph(PetPatrolGraph::line(9))
            .agent(AgentId(1), VertexId(0))
            .agent(AgentId(2), VertexId(4))
            .agent(AgentId(3), VertexId(8))
    }

    #[test]
    fn builds_and_plans_meetings() {
        let fleet = three_on_a_line().build().unwrap();
        assert_eq!(fleet.meetings().len(), 2);
        assert_eq!(fleet.agents().count(), 3);
        assert_eq!(fleet.agent(AgentId(2)).unwrap().state().meetings().len(), 2);
        assert_eq!(fleet.agent(AgentId(1)).unwrap().state().meetings().len(), 1);
    }

    #[test]
    fn missing_graph_is_a_config_error() {
        let err = FleetBuilder::new().agent(AgentId(1), VertexId(0)).build().unwrap_err();
        assert!(matches!(err, WaymarkError::Config { .. }));
    }

    #[test]
    fn duplicate_agent_is_rejected() {
        let err = three_on_a_line().agent(AgentId(2), VertexId(1)).build().unwrap_err();
        assert_eq!(err, WaymarkError::from(PreconditionViolation::DuplicateAgent(AgentId(2))));
    }

    #[test]
    fn start_outside_graph_is_rejected() {
        let err = three_on_a_line().agent(AgentId(4), VertexId(42)).build().unwrap_err();
        assert_eq!(err, WaymarkError::from(PreconditionViolation::UnknownVertex(VertexId(42))));
    }

    #[test]
    fn too_many_agents_for_the_graph() {
        let err = FleetBuilder::new()
            .with_graph(PetPatrolGraph::line(2))
            .agent(AgentId(1), VertexId(0))
            .agent(AgentId(2), VertexId(1))
            .agent(AgentId(3), VertexId(1))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            WaymarkError::Precondition(PreconditionViolation::TooFewVertices { .. })
        ));
    }

    #[test]
    fn removal_of_unknown_agent_is_rejected() {
        assert!(three_on_a_line().remove_at(AgentId(9), 5).build().is_err());
    }
}
