//! Meeting planning.
//!
//! Meeting points are static facts derived at setup time from the
//! initial partition layout and the patrol graph. Every agent can derive
//! the same list, so the points are replicated by value.

use crate::error::Result;
use crate::schedule::{MeetingPoint, MeetingSchedule};
use crate::topology::PatrolGraph;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Which scheduling policy new meeting points get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulePolicy {
    Fixed,
    TwoPhase,
}

/// Parameters for meeting point calendars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_policy")]
    pub policy: SchedulePolicy,
    /// Tick of the first rendezvous (before staggering).
    #[serde(default = "default_first_meeting_tick")]
    pub first_meeting_tick: Tick,
    /// Interval of the fixed policy.
    #[serde(default = "default_interval_ticks")]
    pub interval_ticks: Tick,
    /// Steady-state interval of the two-phase policy.
    #[serde(default = "default_steady_interval_ticks")]
    pub steady_interval_ticks: Tick,
}

fn default_policy() -> SchedulePolicy { SchedulePolicy::Fixed }
fn default_first_meeting_tick() -> Tick { 10 }
fn default_interval_ticks() -> Tick { 20 }
fn default_steady_interval_ticks() -> Tick { 30 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            first_meeting_tick: default_first_meeting_tick(),
            interval_ticks: default_interval_ticks(),
            steady_interval_ticks: default_steady_interval_ticks(),
        }
    }
}

impl ScheduleConfig {
    /// The schedule every meeting starts from before staggering.
    pub fn base_schedule(&self) -> Result<MeetingSchedule> {
        match self.policy {
            SchedulePolicy::Fixed => {
                MeetingSchedule::fixed(self.first_meeting_tick, self.interval_ticks)
            }
            SchedulePolicy::TwoPhase => {
                MeetingSchedule::two_phase(self.first_meeting_tick, self.steady_interval_ticks)
            }
        }
    }
}

/// Derive meeting points from a partition layout.
///
/// Every pair of agents whose partitions touch across an edge gets one
/// meeting, placed at the lowest boundary vertex inside the lower-id
/// agent's partition. The k-th of K meetings starts `k * interval / K`
/// ticks late, or later still if one of its participants could not
/// otherwise walk there from its previous meeting. Any agent's
/// consecutive rendezvous are at least the hop distance between their
/// vertices plus one tick apart; when the configured interval is too
/// short for that, every calendar gets the smallest interval that is
/// long enough.
pub fn plan_meetings(
    partitions: &BTreeMap<AgentId, PartitionInfo>,
    graph: &dyn PatrolGraph,
    config: &ScheduleConfig,
) -> Result<Vec<MeetingPoint>> {
    let base = config.base_schedule()?;

    let mut owner_of: BTreeMap<VertexId, AgentId> = BTreeMap::new();
    for (agent, partition) in partitions {
        for v in &partition.vertex_ids {
            owner_of.insert(*v, *agent);
        }
    }

    // (low agent, high agent) -> candidate vertex in low agent's partition
    let mut sites: BTreeMap<(AgentId, AgentId), VertexId> = BTreeMap::new();
    for (u, v) in graph.edges() {
        let (Some(&a), Some(&b)) = (owner_of.get(&u), owner_of.get(&v)) else {
            continue;
        };
        if a == b {
            continue;
        }
        let (low, site) = if a < b { ((a, b), u) } else { ((b, a), v) };
        sites
            .entry(low)
            .and_modify(|current| *current = (*current).min(site))
            .or_insert(site);
    }

    let hops = |from: VertexId, to: VertexId| graph.hop_distance(&from, &to).map_or(0, u64::from);
    let count = sites.len() as u64;
    let stagger = if count == 0 { 0 } else { base.interval() / count };

    let mut visits: BTreeMap<AgentId, Visits> = BTreeMap::new();
    let mut planned: Vec<(VertexId, BTreeSet<AgentId>, Tick)> = Vec::with_capacity(sites.len());
    for (k, ((a, b), vertex)) in sites.into_iter().enumerate() {
        let mut offset = (k as u64).saturating_mul(stagger);
        for agent in [a, b] {
            if let Some(seen) = visits.get(&agent) {
                let walk = hops(seen.last_vertex, vertex).saturating_add(1);
                offset = offset.max(seen.last_offset.saturating_add(walk));
            }
        }
        for agent in [a, b] {
            visits
                .entry(agent)
                .and_modify(|seen| {
                    seen.last_offset = offset;
                    seen.last_vertex = vertex;
                })
                .or_insert(Visits {
                    first_offset: offset,
                    first_vertex: vertex,
                    last_offset: offset,
                    last_vertex: vertex,
                });
        }
        planned.push((vertex, [a, b].into_iter().collect(), offset));
    }

    // One lap of an agent's calendar has to fit its walk back to the
    // first meeting.
    let needed = visits
        .values()
        .map(|seen| {
            (seen.last_offset - seen.first_offset)
                .saturating_add(hops(seen.last_vertex, seen.first_vertex))
                .saturating_add(1)
        })
        .max()
        .unwrap_or(0);
    let base = if needed > base.interval() {
        info!(
            configured = base.interval(),
            stretched = needed,
            "rendezvous interval too short for the walk between meetings"
        );
        base.with_interval(needed)?
    } else {
        base
    };

    planned
        .into_iter()
        .map(|(vertex, participants, offset)| {
            Ok(MeetingPoint {
                vertex,
                schedule: base.offset_by(offset)?,
                participants,
            })
        })
        .collect()
}

/// First and most recent meeting of one agent while planning.
struct Visits {
    first_offset: Tick,
    first_vertex: VertexId,
    last_offset: Tick,
    last_vertex: VertexId,
}

/// Shift every calendar so that each agent can walk from `starts` to
/// its first rendezvous in time.
///
/// All meetings move by the same amount, which keeps the spacing
/// [`plan_meetings`] established.
pub fn delay_for_starts(
    meetings: Vec<MeetingPoint>,
    starts: &BTreeMap<AgentId, VertexId>,
    graph: &dyn PatrolGraph,
) -> Result<Vec<MeetingPoint>> {
    let mut delay: Tick = 0;
    for (agent, start) in starts {
        let first = meetings
            .iter()
            .filter(|m| m.involves(*agent))
            .filter_map(|m| Some((m.tick_of(0)?, m.vertex)))
            .min();
        let Some((at, vertex)) = first else {
            continue;
        };
        let walk = graph.hop_distance(start, &vertex).map_or(0, u64::from);
        delay = delay.max(walk.saturating_sub(at));
    }
    if delay == 0 {
        return Ok(meetings);
    }
    debug!(delay, "delaying rendezvous calendars until every agent can arrive");
    meetings
        .into_iter()
        .map(|m| {
            Ok(MeetingPoint {
                schedule: m.schedule.offset_by(delay)?,
                ..m
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Minimal line graph `0 - 1 - ... - n-1`.
    struct Line(u32);

    impl PatrolGraph for Line {
        fn vertices(&self) -> Vec<VertexId> {
            (0..self.0).map(VertexId).collect()
        }
        fn contains(&self, v: &VertexId) -> bool {
            v.0 < self.0
        }
        fn neighbors(&self, v: &VertexId) -> Vec<VertexId> {
            let mut n = Vec::new();
            if v.0 > 0 {
                n.push(VertexId(v.0 - 1));
            }
            if v.0 + 1 < self.0 {
                n.push(VertexId(v.0 + 1));
            }
            n
        }
        fn edges(&self) -> Vec<(VertexId, VertexId)> {
            (1..self.0).map(|i| (VertexId(i - 1), VertexId(i))).collect()
        }
        fn hop_distance(&self, a: &VertexId, b: &VertexId) -> Option<u32> {
            Some(a.0.abs_diff(b.0))
        }
        fn next_hop(&self, a: &VertexId, b: &VertexId) -> Option<VertexId> {
            Some(match a.0.cmp(&b.0) {
                std::cmp::Ordering::Less => VertexId(a.0 + 1),
                std::cmp::Ordering::Greater => VertexId(a.0 - 1),
                std::cmp::Ordering::Equal => *a,
            })
        }
    }

    /// Ring `0 - 1 - ... - n-1 - 0`.
    struct Cycle(u32);

    impl PatrolGraph for Cycle {
        fn vertices(&self) -> Vec<VertexId> {
            (0..self.0).map(VertexId).collect()
        }
        fn contains(&self, v: &VertexId) -> bool {
            v.0 < self.0
        }
        fn neighbors(&self, v: &VertexId) -> Vec<VertexId> {
            vec![VertexId((v.0 + self.0 - 1) % self.0), VertexId((v.0 + 1) % self.0)]
        }
        fn edges(&self) -> Vec<(VertexId, VertexId)> {
            (0..self.0).map(|i| (VertexId(i), VertexId((i + 1) % self.0))).collect()
        }
        fn hop_distance(&self, a: &VertexId, b: &VertexId) -> Option<u32> {
            let d = a.0.abs_diff(b.0);
            Some(d.min(self.0 - d))
        }
        fn next_hop(&self, a: &VertexId, b: &VertexId) -> Option<VertexId> {
            self.neighbors(a)
                .into_iter()
                .min_by_key(|n| self.hop_distance(n, b))
        }
    }

    fn assign(agents: u32, graph: &dyn PatrolGraph) -> BTreeMap<AgentId, PartitionInfo> {
        let roster: BTreeSet<AgentId> = (1..=agents).map(AgentId).collect();
        let vertices: BTreeSet<VertexId> = graph.vertices().into_iter().collect();
        crate::partition::PartitionAssigner::new()
            .assign(&roster, &vertices)
            .unwrap()
    }

    /// Every agent's rendezvous over a few laps, in calendar order.
    fn agenda(meetings: &[MeetingPoint], agent: AgentId, laps: u64) -> Vec<(Tick, VertexId)> {
        let mut agenda: Vec<(Tick, VertexId)> = meetings
            .iter()
            .filter(|m| m.involves(agent))
            .flat_map(|m| (0..laps).filter_map(move |n| Some((m.tick_of(n)?, m.vertex))))
            .collect();
        agenda.sort();
        agenda
    }

    fn assert_walkable(meetings: &[MeetingPoint], agents: u32, graph: &dyn PatrolGraph) {
        for agent in (1..=agents).map(AgentId) {
            for pair in agenda(meetings, agent, 4).windows(2) {
                let ((t0, v0), (t1, v1)) = (pair[0], pair[1]);
                let walk = u64::from(graph.hop_distance(&v0, &v1).unwrap());
                assert!(
                    t1 - t0 >= walk + 1,
                    "{} cannot get from {}@{} to {}@{}",
                    agent,
                    v0,
                    t0,
                    v1,
                    t1
                );
            }
        }
    }

    fn layout() -> BTreeMap<AgentId, PartitionInfo> {
        [
            (AgentId(1), PartitionInfo::new(0, (0..3).map(VertexId))),
            (AgentId(2), PartitionInfo::new(1, (3..6).map(VertexId))),
            (AgentId(3), PartitionInfo::new(2, (6..9).map(VertexId))),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn line_layout_gets_one_meeting_per_border() {
        let meetings = plan_meetings(&layout(), &Line(9), &ScheduleConfig::default()).unwrap();
        assert_eq!(meetings.len(), 2);

        assert_eq!(meetings[0].vertex, VertexId(2));
        assert!(meetings[0].involves(AgentId(1)) && meetings[0].involves(AgentId(2)));
        assert_eq!(meetings[0].tick_of(0), Some(10));

        assert_eq!(meetings[1].vertex, VertexId(5));
        assert!(meetings[1].involves(AgentId(2)) && meetings[1].involves(AgentId(3)));
        // Staggered by half an interval.
        assert_eq!(meetings[1].tick_of(0), Some(20));
        assert_eq!(meetings[1].tick_of(1), Some(40));
    }

    #[test]
    fn two_phase_policy_uses_steady_interval() {
        let config = ScheduleConfig {
            policy: SchedulePolicy::TwoPhase,
            first_meeting_tick: 4,
            interval_ticks: 20,
            steady_interval_ticks: 12,
        };
        let meetings = plan_meetings(&layout(), &Line(9), &config).unwrap();
        assert_eq!(meetings[0].tick_of(0), Some(4));
        assert_eq!(meetings[0].tick_of(1), Some(16));
        assert_eq!(meetings[1].tick_of(0), Some(10));
    }

    #[test]
    fn ring_meetings_leave_time_to_walk_between_them() {
        let graph = Cycle(20);
        let meetings = plan_meetings(&assign(3, &graph), &graph, &ScheduleConfig::default()).unwrap();
        assert_eq!(meetings.len(), 3);

        let sites: Vec<(VertexId, Option<Tick>)> =
            meetings.iter().map(|m| (m.vertex, m.tick_of(0))).collect();
        assert_eq!(
            sites,
            vec![(VertexId(6), Some(10)), (VertexId(0), Some(17)), (VertexId(13), Some(25))]
        );
        // Agent 2 walks 7 hops from v13 back to v6: the interval grows
        // from 20 to 23.
        assert!(meetings.iter().all(|m| m.schedule.interval() == 23));
        assert_walkable(&meetings, 3, &graph);
    }

    #[test]
    fn short_intervals_are_stretched() {
        let graph = Cycle(12);
        let config = ScheduleConfig {
            interval_ticks: 8,
            ..ScheduleConfig::default()
        };
        let meetings = plan_meetings(&assign(3, &graph), &graph, &config).unwrap();
        assert!(meetings.iter().all(|m| m.schedule.interval() > 8));
        assert_walkable(&meetings, 3, &graph);
    }

    #[test]
    fn generous_intervals_are_kept() {
        let meetings = plan_meetings(&layout(), &Line(9), &ScheduleConfig::default()).unwrap();
        assert!(meetings.iter().all(|m| m.schedule.interval() == 20));
        assert_walkable(&meetings, 3, &Line(9));
    }

    #[test]
    fn calendars_wait_for_far_starts() {
        let graph = Line(9);
        let config = ScheduleConfig {
            first_meeting_tick: 2,
            ..ScheduleConfig::default()
        };
        let meetings = plan_meetings(&layout(), &graph, &config).unwrap();
        // Agent 3 is 5 hops from its first rendezvous (v5, tick 12): in time.
        let starts: BTreeMap<AgentId, VertexId> =
            [(AgentId(1), VertexId(2)), (AgentId(2), VertexId(2)), (AgentId(3), VertexId(0))]
                .into_iter()
                .collect();
        let delayed = delay_for_starts(meetings.clone(), &starts, &graph).unwrap();
        assert_eq!(delayed[0].tick_of(0), Some(2));
        assert_eq!(delayed[1].tick_of(0), Some(12));
        assert_eq!(delayed, meetings);

        let far: BTreeMap<AgentId, VertexId> = [(AgentId(1), VertexId(8))].into_iter().collect();
        let delayed = delay_for_starts(meetings.clone(), &far, &graph).unwrap();
        assert_eq!(delayed[0].tick_of(0), Some(6));
        assert_eq!(delayed[1].tick_of(0), Some(16));
        assert_walkable(&delayed, 3, &graph);
    }

    #[test]
    fn planning_is_deterministic() {
        let a = plan_meetings(&layout(), &Line(9), &ScheduleConfig::default()).unwrap();
        let b = plan_meetings(&layout(), &Line(9), &ScheduleConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn every_agent_can_reach_its_next_rendezvous(
            n in 3u32..40,
            agents in 1u32..7,
            first in 0u64..20,
            interval in 1u64..40,
            ring in any::<bool>(),
        ) {
            let agents = agents.min(n);
            let config = ScheduleConfig {
                first_meeting_tick: first,
                interval_ticks: interval,
                ..ScheduleConfig::default()
            };
            if ring {
                let graph = Cycle(n);
                let meetings = plan_meetings(&assign(agents, &graph), &graph, &config).unwrap();
                assert_walkable(&meetings, agents, &graph);
            } else {
                let graph = Line(n);
                let meetings = plan_meetings(&assign(agents, &graph), &graph, &config).unwrap();
                assert_walkable(&meetings, agents, &graph);
            }
        }
    }
}
