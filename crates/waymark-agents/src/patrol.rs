//! Patrol agent: one fleet member.
//!
//! A `PatrolAgent` is a [`PatrolState`] (replica, tracker, coordinator,
//! current partition) plus a [`RoutineScheduler`] running the routines in
//! [`crate::routines`]. The rendezvous handshake itself is driven by the
//! fleet through the [`Agent`] calls and never goes through a routine,
//! because it has to happen at an exact tick.

use crate::routines::{AssignPartitions, PartitionLookup, PatrolPlanner, Reconcile};
use crate::serialize::{AgentSnapshot, MeetingSummary};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};
use waymark_core::prelude::*;

/// Everything a patrol agent knows.
pub struct PatrolState {
    pub(crate) id: AgentId,
    pub(crate) position: VertexId,
    pub(crate) roster: BTreeSet<AgentId>,
    pub(crate) vertices: BTreeSet<VertexId>,
    pub(crate) store: FleetStore,
    pub(crate) tracker: MeetingTracker,
    pub(crate) coordinator: RedistributionCoordinator,
    /// Meetings this agent takes part in.
    pub(crate) meetings: Vec<MeetingPoint>,
    pub(crate) partition: Option<PartitionInfo>,
    /// Loss set the current partition was published for.
    pub(crate) partition_excluded: BTreeSet<AgentId>,
    /// Somebody reported this agent missing.
    pub(crate) declared_lost: bool,
    pub(crate) intent: AgentIntent,
    pub(crate) last_visit: BTreeMap<VertexId, Tick>,
    /// Vertices the simulation refused to route to.
    pub(crate) unreachable: BTreeSet<VertexId>,
    /// Meetings whose exchange round is open this tick.
    pub(crate) open: Vec<MeetingPoint>,
    pub(crate) events: Vec<AgentEvent>,
}

impl PatrolState {
    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn store(&self) -> &FleetStore {
        &self.store
    }

    pub fn tracker(&self) -> &MeetingTracker {
        &self.tracker
    }

    pub fn meetings(&self) -> &[MeetingPoint] {
        &self.meetings
    }

    pub fn intent(&self) -> AgentIntent {
        self.intent
    }

    pub fn is_declared_lost(&self) -> bool {
        self.declared_lost
    }

    /// The assigner is the lowest id in the roster.
    pub fn is_assigner(&self) -> bool {
        self.roster.iter().next() == Some(&self.id)
    }

    fn snapshot_envelope(&self, info: TrackInfo) -> Envelope {
        Envelope::track(self.id, info, self.store.snapshot())
    }
}

impl Observe for PatrolState {
    fn observe(&self, condition: Condition, ctx: &TickContext<'_>) -> u64 {
        match condition {
            Condition::MotionStatusChanged => ctx.motion.token(),
            // Absence keys are never removed, so the count identifies the set.
            Condition::LossSetChanged => self.store.loss_set().len() as u64,
        }
    }
}

/// A fleet member patrolling its partition of the graph.
pub struct PatrolAgent {
    state: PatrolState,
    routines: RoutineScheduler<PatrolState>,
}

impl PatrolAgent {
    /// Create an agent standing on `start`.
    ///
    /// `roster` and `vertices` are the static facts every agent starts
    /// with: who is in the fleet and what has to be patrolled.
    pub fn new(
        id: AgentId,
        start: VertexId,
        roster: BTreeSet<AgentId>,
        vertices: BTreeSet<VertexId>,
    ) -> Self {
        let coordinator =
            RedistributionCoordinator::new(id, roster.clone(), vertices.clone(), Arc::new(EvenSplit));
        let state = PatrolState {
            id,
            position: start,
            roster,
            vertices,
            store: FleetStore::new(id),
            tracker: MeetingTracker::new(id),
            coordinator,
            meetings: Vec::new(),
            partition: None,
            partition_excluded: BTreeSet::new(),
            declared_lost: false,
            intent: AgentIntent::Hold,
            last_visit: BTreeMap::new(),
            unreachable: BTreeSet::new(),
            open: Vec::new(),
            events: Vec::new(),
        };

        let mut routines = RoutineScheduler::new();
        routines.spawn(Box::new(AssignPartitions));
        routines.spawn(Box::new(Reconcile::default()));
        routines.spawn(Box::new(PartitionLookup));
        routines.spawn(Box::new(PatrolPlanner));
        Self { state, routines }
    }

    /// Give the agent the fleet's meeting points; it keeps its own.
    pub fn with_meetings(mut self, meetings: impl IntoIterator<Item = MeetingPoint>) -> Self {
        let id = self.state.id;
        self.state.meetings = meetings.into_iter().filter(|m| m.involves(id)).collect();
        self
    }

    /// Replace the redistribution policy (even split by default).
    pub fn with_policy(mut self, policy: Arc<dyn RedistributionPolicy>) -> Self {
        let s = &self.state;
        self.state.coordinator =
            RedistributionCoordinator::new(s.id, s.roster.clone(), s.vertices.clone(), policy);
        self
    }

    pub fn state(&self) -> &PatrolState {
        &self.state
    }

    pub fn store(&self) -> &FleetStore {
        &self.state.store
    }

    pub fn tracker(&self) -> &MeetingTracker {
        &self.state.tracker
    }

    pub fn active_routines(&self) -> Vec<&'static str> {
        self.routines.active()
    }

    /// Serializable view for reports.
    pub fn snapshot(&self) -> AgentSnapshot {
        let s = &self.state;
        AgentSnapshot {
            id: s.id,
            position: s.position,
            partition: s.partition.clone(),
            loss_set: s.store.loss_set(),
            declared_lost: s.declared_lost,
            store_entries: s.store.len(),
            meetings: s
                .tracker
                .records()
                .map(|(meeting, record)| MeetingSummary {
                    meeting: meeting.clone(),
                    held: record.held_count,
                    missed: record.missed_count,
                    known_absentees: record.known_absentees.clone(),
                })
                .collect(),
        }
    }
}

impl Agent for PatrolAgent {
    fn id(&self) -> AgentId {
        self.state.id
    }

    fn position(&self) -> VertexId {
        self.state.position
    }

    fn set_position(&mut self, position: VertexId) {
        self.state.position = position;
    }

    fn gossip(&self) -> Envelope {
        Envelope::gossip(self.state.id, self.state.store.snapshot())
    }

    fn receive(&mut self, envelope: Envelope, ctx: &TickContext<'_>) -> Option<Envelope> {
        let s = &mut self.state;
        s.store.merge_all(envelope.piggyback);
        let Payload::Track(info) = envelope.payload else {
            return None;
        };
        let mut track = TrackContext {
            receiver: s.id,
            tick: ctx.tick,
            tracker: &mut s.tracker,
        };
        let reply = info.process(&mut track)?;
        Some(s.snapshot_envelope(reply))
    }

    fn open_rendezvous(&mut self, ctx: &TickContext<'_>) -> Vec<Envelope> {
        let s = &mut self.state;
        if s.declared_lost {
            return Vec::new();
        }
        let mut out = Vec::new();
        for meeting in &s.meetings {
            if s.tracker.arrive(meeting, s.position, ctx.tick) {
                debug!(agent = %s.id, meeting = %meeting, tick = ctx.tick, "waiting at rendezvous");
                s.open.push(meeting.clone());
            }
        }
        for meeting in &s.open {
            let hello = TrackInfo::ExchangeInfoAtMeeting {
                meeting: meeting.clone(),
                exchange_at_tick: ctx.tick,
                sender_agent_id: s.id,
            };
            out.push(s.snapshot_envelope(hello));
        }
        out
    }

    fn close_rendezvous(&mut self, ctx: &TickContext<'_>) -> Result<Vec<Envelope>> {
        let s = &mut self.state;
        let mut reports = Vec::new();
        for meeting in std::mem::take(&mut s.open) {
            let lost = s.store.loss_set();
            let Some(outcome) = s.tracker.conclude(&meeting, ctx.tick, &lost) else {
                continue;
            };
            match outcome {
                MeetingOutcome::Held { present } => {
                    s.events.push(AgentEvent::MeetingHeld {
                        vertex: meeting.vertex,
                        tick: ctx.tick,
                        present,
                    });
                }
                MeetingOutcome::PartiallyMissed {
                    absent, reporter, ..
                } => {
                    s.events.push(AgentEvent::MeetingPartiallyMissed {
                        vertex: meeting.vertex,
                        tick: ctx.tick,
                        absent: absent.clone(),
                    });
                    if reporter != s.id {
                        continue;
                    }
                    let outcome = s.coordinator.on_missing_agents_at_meeting(
                        &meeting,
                        &absent,
                        ctx.tick,
                        &mut s.store,
                    )?;
                    s.events.push(match outcome {
                        RedistributionOutcome::Deferred { excluded } => {
                            AgentEvent::RedistributionDeferred { excluded }
                        }
                        RedistributionOutcome::Published { excluded, .. }
                        | RedistributionOutcome::AlreadyPublished { excluded, .. } => {
                            AgentEvent::RedistributionPublished { excluded }
                        }
                    });
                    let report = TrackInfo::MissingRobotsAtMeeting {
                        meeting: meeting.clone(),
                        exchange_at_tick: ctx.tick,
                        sender_agent_id: s.id,
                        missing_agent_ids: absent,
                        reported_by_agent_id: s.id,
                    };
                    reports.push(s.snapshot_envelope(report));
                }
            }
        }
        Ok(reports)
    }

    fn tick(&mut self, ctx: &TickContext<'_>) -> Result<AgentIntent> {
        let s = &mut self.state;
        s.last_visit.insert(s.position, ctx.tick);
        for meeting in &s.meetings {
            for scheduled_tick in s.tracker.catch_up(meeting, ctx.tick) {
                s.events.push(AgentEvent::MeetingMissed {
                    vertex: meeting.vertex,
                    scheduled_tick,
                });
            }
        }
        if !s.declared_lost && s.store.loss_set().contains(&s.id) {
            info!(agent = %s.id, tick = ctx.tick, "reported missing by the fleet, standing down");
            s.declared_lost = true;
            s.partition = None;
            s.intent = AgentIntent::Hold;
        }
        self.routines.run_tick(&mut self.state, ctx)?;
        Ok(self.state.intent)
    }

    fn current_partition(&self) -> Option<PartitionInfo> {
        self.state.partition.clone()
    }

    fn debug_summary(&self) -> String {
        let s = &self.state;
        let partition = s
            .partition
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        let mut line = format!("{} @{} partition={}", s.id, s.position, partition);
        let lost = s.store.loss_set();
        if !lost.is_empty() {
            let ids: Vec<String> = lost.iter().map(|a| a.0.to_string()).collect();
            line.push_str(&format!(" lost={{{}}}", ids.join(",")));
        }
        let meetings = s.tracker.summary();
        if !meetings.is_empty() {
            line.push_str(" | ");
            line.push_str(&meetings);
        }
        line
    }

    fn drain_events(&mut self) -> Vec<AgentEvent> {
        std::mem::take(&mut self.state.events)
    }
}
