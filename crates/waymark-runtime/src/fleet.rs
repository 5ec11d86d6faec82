//! Fleet: the tick-driven simulation harness.
//!
//! The fleet stands in for the surrounding simulation. It tracks agent
//! positions and moves agents one hop per tick; the range oracle decides
//! who can talk. Agent state is only ever reached through [`Agent`].
//!
//! Each tick:
//! 1. Scheduled removals take effect
//! 2. Agents in range swap replicas (all snapshots taken first)
//! 3. Rendezvous: exchange records between co-located agents, then the
//!    reporters' absence reports
//! 4. Every agent runs its routines and returns a movement intent
//! 5. Intents are executed and the tick counter advances

use crate::comm::{CommConfig, RangeOracle};
use crate::topology_impl::PetPatrolGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info, warn};
use waymark_agents::prelude::*;

/// Event emitted by the fleet during simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FleetEvent {
    /// An agent stopped being scheduled.
    AgentRemoved { id: AgentId },
    /// An agent moved one hop.
    Moved { id: AgentId, from: VertexId, to: VertexId },
    /// An agent asked to go somewhere it cannot reach.
    Blocked { id: AgentId, target: VertexId },
    /// Something an agent reported about itself.
    Agent { id: AgentId, event: AgentEvent },
    /// A tick completed.
    TickComplete { tick: Tick, active: usize, exchanges: usize },
}

/// Statistics about the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetStats {
    pub tick: Tick,
    pub agents_total: usize,
    pub agents_active: usize,
    pub agents_removed: usize,
    /// Replica exchanges (one per direction) since the start.
    pub gossip_exchanges: usize,
    pub meetings_held: usize,
    pub meetings_partially_missed: usize,
    pub meetings_missed: usize,
    pub redistributions: usize,
    /// All active replicas hold identical entries.
    pub converged: bool,
}

/// A complete serializable snapshot of the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub tick: Tick,
    pub agents: Vec<AgentSnapshot>,
    pub removed: Vec<AgentId>,
    pub meetings: Vec<MeetingPoint>,
    pub stats: FleetStats,
}

/// Tunable fleet parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub comm: CommConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub redistribution: PolicyKind,
}

struct Member {
    agent: PatrolAgent,
    active: bool,
    motion: MotionStatus,
}

#[derive(Default)]
struct Counters {
    gossip_exchanges: usize,
    meetings_held: usize,
    meetings_partially_missed: usize,
    meetings_missed: usize,
    redistributions: usize,
}

/// The fleet: agents, the graph they patrol and the communication model.
pub struct Fleet {
    graph: PetPatrolGraph,
    oracle: Box<dyn RangeOracle>,
    members: Vec<Member>,
    meetings: Vec<MeetingPoint>,
    removals: BTreeMap<Tick, BTreeSet<AgentId>>,
    tick: Tick,
    event_history: Vec<(Tick, FleetEvent)>,
    counters: Counters,
}

impl Fleet {
    /// Create a fleet from already configured agents.
    ///
    /// Usually called through [`FleetBuilder`](crate::fleet_builder::FleetBuilder),
    /// which also validates the setup.
    pub fn new(
        graph: PetPatrolGraph,
        oracle: Box<dyn RangeOracle>,
        agents: Vec<PatrolAgent>,
        meetings: Vec<MeetingPoint>,
    ) -> Self {
        let members = agents
            .into_iter()
            .map(|agent| Member {
                agent,
                active: true,
                motion: MotionStatus::Idle,
            })
            .collect();
        Self {
            graph,
            oracle,
            members,
            meetings,
            removals: BTreeMap::new(),
            tick: 0,
            event_history: Vec::new(),
            counters: Counters::default(),
        }
    }

    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    pub fn graph(&self) -> &PetPatrolGraph {
        &self.graph
    }

    pub fn meetings(&self) -> &[MeetingPoint] {
        &self.meetings
    }

    pub fn oracle_name(&self) -> &'static str {
        self.oracle.name()
    }

    /// Every agent, removed ones included.
    pub fn agents(&self) -> impl Iterator<Item = &PatrolAgent> {
        self.members.iter().map(|m| &m.agent)
    }

    /// Agents still being scheduled.
    pub fn active_agents(&self) -> impl Iterator<Item = &PatrolAgent> {
        self.members.iter().filter(|m| m.active).map(|m| &m.agent)
    }

    pub fn agent(&self, id: AgentId) -> Option<&PatrolAgent> {
        self.agents().find(|a| a.id() == id)
    }

    pub fn is_active(&self, id: AgentId) -> bool {
        self.members.iter().any(|m| m.active && m.agent.id() == id)
    }

    /// Stop scheduling an agent. Its state is kept but never changes again.
    pub fn remove_agent(&mut self, id: AgentId) -> bool {
        let Some(member) = self.members.iter_mut().find(|m| m.agent.id() == id && m.active) else {
            return false;
        };
        member.active = false;
        info!(agent = %id, tick = self.tick, "agent removed from the fleet");
        self.event_history.push((self.tick, FleetEvent::AgentRemoved { id }));
        true
    }

    /// Remove an agent at the start of `tick`.
    pub fn schedule_removal(&mut self, id: AgentId, tick: Tick) {
        self.removals.entry(tick).or_default().insert(id);
    }

    fn index_of(&self, id: AgentId) -> Option<usize> {
        self.members.iter().position(|m| m.agent.id() == id)
    }

    fn active_indices(&self) -> Vec<usize> {
        (0..self.members.len()).filter(|i| self.members[*i].active).collect()
    }

    /// Run a single simulation tick.
    ///
    /// Only precondition violations from agents are errors.
    pub fn tick(&mut self) -> Result<Vec<FleetEvent>> {
        let now = self.tick;
        let mut events = Vec::new();

        // 1. Removals due now (and any left over from the past).
        let due: Vec<Tick> = self.removals.range(..=now).map(|(t, _)| *t).collect();
        for t in due {
            for id in self.removals.remove(&t).unwrap_or_default() {
                if self.remove_agent(id) {
                    events.push(FleetEvent::AgentRemoved { id });
                }
            }
        }

        let active = self.active_indices();
        let graph = &self.graph;
        let oracle = &self.oracle;
        let members = &mut self.members;
        let ctx_of = |motion: MotionStatus| TickContext {
            tick: now,
            motion,
            graph,
        };

        // 2. Gossip between in-range pairs.
        let outgoing: BTreeMap<usize, Envelope> =
            active.iter().map(|i| (*i, members[*i].agent.gossip())).collect();
        let mut exchanges = 0;
        for (n, &i) in active.iter().enumerate() {
            for &j in &active[n + 1..] {
                let (pi, pj) = (members[i].agent.position(), members[j].agent.position());
                if !oracle.in_range(pi, pj, graph) {
                    continue;
                }
                for (to, from) in [(i, j), (j, i)] {
                    let ctx = ctx_of(members[to].motion);
                    members[to].agent.receive(outgoing[&from].clone(), &ctx);
                    exchanges += 1;
                }
            }
        }
        self.counters.gossip_exchanges += exchanges;

        // 3. Rendezvous.
        let mut queue: VecDeque<(usize, Envelope)> = VecDeque::new();
        for &i in &active {
            let ctx = ctx_of(members[i].motion);
            for envelope in members[i].agent.open_rendezvous(&ctx) {
                queue.extend(co_located(members, &active, i).map(|to| (to, envelope.clone())));
            }
        }
        deliver(members, &active, &mut queue, now, graph);

        for &i in &active {
            let ctx = ctx_of(members[i].motion);
            for report in members[i].agent.close_rendezvous(&ctx)? {
                queue.extend(co_located(members, &active, i).map(|to| (to, report.clone())));
            }
        }
        deliver(members, &active, &mut queue, now, graph);

        // 4. Routines and 5. movement.
        for &i in &active {
            let ctx = ctx_of(members[i].motion);
            let member = &mut members[i];
            let id = member.agent.id();
            let from = member.agent.position();
            member.motion = match member.agent.tick(&ctx)? {
                AgentIntent::Hold => MotionStatus::Idle,
                AgentIntent::MoveTo(target) => match graph.next_hop(&from, &target) {
                    Some(next) if next == from => MotionStatus::Idle,
                    Some(next) => {
                        member.agent.set_position(next);
                        events.push(FleetEvent::Moved { id, from, to: next });
                        if next == target {
                            MotionStatus::Idle
                        } else {
                            MotionStatus::Moving
                        }
                    }
                    None => {
                        warn!(agent = %id, target = %target, tick = now, "no route");
                        events.push(FleetEvent::Blocked { id, target });
                        MotionStatus::Blocked
                    }
                },
            };
        }

        for &i in &active {
            let id = members[i].agent.id();
            for event in members[i].agent.drain_events() {
                match &event {
                    AgentEvent::MeetingHeld { .. } => self.counters.meetings_held += 1,
                    AgentEvent::MeetingPartiallyMissed { .. } => {
                        self.counters.meetings_partially_missed += 1
                    }
                    AgentEvent::MeetingMissed { .. } => self.counters.meetings_missed += 1,
                    AgentEvent::RedistributionPublished { .. } => self.counters.redistributions += 1,
                    _ => {}
                }
                events.push(FleetEvent::Agent { id, event });
            }
        }

        events.push(FleetEvent::TickComplete {
            tick: now,
            active: active.len(),
            exchanges,
        });
        debug!(tick = now, active = active.len(), exchanges, "tick complete");

        // Removals were recorded by `remove_agent` already.
        self.event_history.extend(
            events
                .iter()
                .filter(|e| !matches!(e, FleetEvent::AgentRemoved { .. }))
                .map(|e| (now, e.clone())),
        );
        self.tick += 1;
        Ok(events)
    }

    /// Run the simulation for N ticks.
    pub fn run(&mut self, ticks: u64) -> Result<Vec<Vec<FleetEvent>>> {
        let mut all = Vec::new();
        for _ in 0..ticks {
            all.push(self.tick()?);
        }
        Ok(all)
    }

    /// Whether all active replicas hold identical entries.
    pub fn replicas_converged(&self) -> bool {
        let mut stores = self.active_agents().map(PatrolAgent::store);
        let Some(first) = stores.next() else {
            return true;
        };
        stores.all(|s| s.same_contents(first))
    }

    /// The partitions active agents currently patrol.
    pub fn patrol_layout(&self) -> BTreeMap<AgentId, PartitionInfo> {
        self.active_agents()
            .filter_map(|a| a.current_partition().map(|p| (a.id(), p)))
            .collect()
    }

    pub fn stats(&self) -> FleetStats {
        let active = self.members.iter().filter(|m| m.active).count();
        FleetStats {
            tick: self.tick,
            agents_total: self.members.len(),
            agents_active: active,
            agents_removed: self.members.len() - active,
            gossip_exchanges: self.counters.gossip_exchanges,
            meetings_held: self.counters.meetings_held,
            meetings_partially_missed: self.counters.meetings_partially_missed,
            meetings_missed: self.counters.meetings_missed,
            redistributions: self.counters.redistributions,
            converged: self.replicas_converged(),
        }
    }

    /// Take a serializable snapshot of the fleet's current state.
    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            tick: self.tick,
            agents: self.active_agents().map(PatrolAgent::snapshot).collect(),
            removed: self
                .members
                .iter()
                .filter(|m| !m.active)
                .map(|m| m.agent.id())
                .collect(),
            meetings: self.meetings.clone(),
            stats: self.stats(),
        }
    }

    /// Get the full event history with tick numbers.
    pub fn event_history(&self) -> &[(Tick, FleetEvent)] {
        &self.event_history
    }

    /// One line per agent.
    pub fn describe(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|m| {
                let mut line = m.agent.debug_summary();
                if !m.active {
                    line.push_str(" [removed]");
                }
                line
            })
            .collect()
    }

    /// Position of an agent, if it exists.
    pub fn position_of(&self, id: AgentId) -> Option<VertexId> {
        self.index_of(id).map(|i| self.members[i].agent.position())
    }
}

/// Active agents other than `from` standing on the same vertex.
fn co_located<'a>(
    members: &'a [Member],
    active: &'a [usize],
    from: usize,
) -> impl Iterator<Item = usize> + 'a {
    let at = members[from].agent.position();
    active
        .iter()
        .copied()
        .filter(move |&j| j != from && members[j].agent.position() == at)
}

/// Deliver queued rendezvous envelopes. Replies go back to the sender
/// until nobody has anything new to say.
fn deliver(
    members: &mut [Member],
    active: &[usize],
    queue: &mut VecDeque<(usize, Envelope)>,
    tick: Tick,
    graph: &PetPatrolGraph,
) {
    while let Some((to, envelope)) = queue.pop_front() {
        let sender = envelope.from;
        let ctx = TickContext {
            tick,
            motion: members[to].motion,
            graph,
        };
        let Some(reply) = members[to].agent.receive(envelope, &ctx) else {
            continue;
        };
        if let Some(&back) = active.iter().find(|&&j| members[j].agent.id() == sender) {
            queue.push_back((back, reply));
        }
    }
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet")
            .field("tick", &self.tick)
            .field("agents", &self.members.len())
            .field("meetings", &self.meetings.len())
            .field("oracle", &self.oracle.name())
            .finish()
    }
}
