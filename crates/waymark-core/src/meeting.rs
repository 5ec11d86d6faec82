//! Meeting tracking.
//!
//! Each agent keeps one [`MeetingOccurrenceRecord`] per meeting point it
//! takes part in. Within a tick the record walks
//! `Idle -> AtVertexWaitingForPeers -> Held | PartiallyMissed`:
//!
//! 1. [`MeetingTracker::arrive`] when the agent stands on the meeting
//!    vertex at the scheduled tick.
//! 2. [`MeetingTracker::record_presence`] for every participant whose
//!    exchange record arrives during that tick.
//! 3. [`MeetingTracker::conclude`] once the exchange round is over.
//!
//! A meeting that fires with absentees still counts as held, so the
//! calendar keeps advancing.

use crate::schedule::MeetingPoint;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Where a record stands within the current occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeetingPhase {
    Idle,
    AtVertexWaitingForPeers { tick: Tick, present: BTreeSet<AgentId> },
    Held { tick: Tick },
    PartiallyMissed { tick: Tick, absent: BTreeSet<AgentId> },
}

/// Per-agent progress through one meeting point's calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingOccurrenceRecord {
    pub held_count: u64,
    /// Occurrences this agent did not attend itself.
    pub missed_count: u64,
    pub last_attended_tick: Option<Tick>,
    pub known_absentees: BTreeSet<AgentId>,
    pub phase: MeetingPhase,
}

impl MeetingOccurrenceRecord {
    fn new() -> Self {
        Self {
            held_count: 0,
            missed_count: 0,
            last_attended_tick: None,
            known_absentees: BTreeSet::new(),
            phase: MeetingPhase::Idle,
        }
    }

    /// Index of the next occurrence this record expects.
    pub fn next_index(&self) -> u64 {
        self.held_count + self.missed_count
    }

    fn waiting_at(&self, tick: Tick) -> bool {
        matches!(self.phase, MeetingPhase::AtVertexWaitingForPeers { tick: t, .. } if t == tick)
    }
}

/// How a rendezvous ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingOutcome {
    /// Every expected participant was there.
    Held { present: BTreeSet<AgentId> },
    /// Some expected participants did not show up.
    PartiallyMissed {
        present: BTreeSet<AgentId>,
        absent: BTreeSet<AgentId>,
        /// The present agent designated to report (lowest id).
        reporter: AgentId,
    },
}

/// One agent's meeting records.
#[derive(Debug, Clone)]
pub struct MeetingTracker {
    owner: AgentId,
    records: BTreeMap<MeetingPoint, MeetingOccurrenceRecord>,
}

impl MeetingTracker {
    pub fn new(owner: AgentId) -> Self {
        Self {
            owner,
            records: BTreeMap::new(),
        }
    }

    pub fn owner(&self) -> AgentId {
        self.owner
    }

    /// Record for a meeting, if it has been encountered.
    pub fn record(&self, meeting: &MeetingPoint) -> Option<&MeetingOccurrenceRecord> {
        self.records.get(meeting)
    }

    pub fn records(&self) -> impl Iterator<Item = (&MeetingPoint, &MeetingOccurrenceRecord)> {
        self.records.iter()
    }

    fn entry(&mut self, meeting: &MeetingPoint) -> &mut MeetingOccurrenceRecord {
        self.records
            .entry(meeting.clone())
            .or_insert_with(MeetingOccurrenceRecord::new)
    }

    /// Tick of the next occurrence this agent is expected at, if the
    /// calendar has one.
    pub fn next_rendezvous(&self, meeting: &MeetingPoint) -> Option<Tick> {
        let index = self.record(meeting).map_or(0, MeetingOccurrenceRecord::next_index);
        meeting.tick_of(index)
    }

    /// Count every occurrence scheduled before `now` that this agent did
    /// not attend. Returns the ticks of the newly missed occurrences.
    pub fn catch_up(&mut self, meeting: &MeetingPoint, now: Tick) -> Vec<Tick> {
        let target = meeting.schedule.first_index_at_or_after(now);
        let record = self.entry(meeting);
        let mut missed = Vec::new();
        while record.next_index() < target {
            missed.extend(meeting.tick_of(record.next_index()));
            record.missed_count += 1;
        }
        missed
    }

    /// Enter `AtVertexWaitingForPeers` if the agent is on the meeting
    /// vertex at the scheduled tick. Returns whether it did.
    pub fn arrive(&mut self, meeting: &MeetingPoint, position: VertexId, now: Tick) -> bool {
        if !meeting.involves(self.owner) {
            return false;
        }
        self.catch_up(meeting, now);
        let owner = self.owner;
        let record = self.entry(meeting);
        if record.waiting_at(now) {
            return true;
        }
        if position != meeting.vertex || meeting.tick_of(record.next_index()) != Some(now) {
            return false;
        }
        record.phase = MeetingPhase::AtVertexWaitingForPeers {
            tick: now,
            present: [owner].into_iter().collect(),
        };
        true
    }

    /// Whether the agent is waiting at this meeting during `now`.
    pub fn is_waiting(&self, meeting: &MeetingPoint, now: Tick) -> bool {
        self.record(meeting).is_some_and(|r| r.waiting_at(now))
    }

    /// Note a participant whose exchange record arrived this tick.
    pub fn record_presence(&mut self, meeting: &MeetingPoint, peer: AgentId, now: Tick) -> bool {
        if !meeting.involves(peer) {
            return false;
        }
        match self.records.get_mut(meeting) {
            Some(MeetingOccurrenceRecord {
                phase: MeetingPhase::AtVertexWaitingForPeers { tick, present },
                ..
            }) if *tick == now => {
                present.insert(peer);
                true
            }
            _ => false,
        }
    }

    /// Close the exchange round of the current occurrence.
    ///
    /// `lost` are agents already known to be gone; they are not expected.
    pub fn conclude(
        &mut self,
        meeting: &MeetingPoint,
        now: Tick,
        lost: &BTreeSet<AgentId>,
    ) -> Option<MeetingOutcome> {
        let record = self.records.get_mut(meeting)?;
        let present = match &record.phase {
            MeetingPhase::AtVertexWaitingForPeers { tick, present } if *tick == now => present.clone(),
            _ => return None,
        };

        let absent: BTreeSet<AgentId> = meeting
            .participants
            .iter()
            .filter(|a| !present.contains(a))
            .filter(|a| !record.known_absentees.contains(a) && !lost.contains(a))
            .copied()
            .collect();

        record.held_count += 1;
        record.last_attended_tick = Some(now);

        if absent.is_empty() {
            record.phase = MeetingPhase::Held { tick: now };
            return Some(MeetingOutcome::Held { present });
        }

        record.known_absentees.extend(absent.iter().copied());
        record.phase = MeetingPhase::PartiallyMissed {
            tick: now,
            absent: absent.clone(),
        };
        let reporter = present.iter().next().copied().unwrap_or(self.owner);
        Some(MeetingOutcome::PartiallyMissed {
            present,
            absent,
            reporter,
        })
    }

    /// Remember absentees somebody else reported for this meeting.
    pub fn note_absentees(&mut self, meeting: &MeetingPoint, absent: &BTreeSet<AgentId>) -> bool {
        if !meeting.involves(self.owner) {
            return false;
        }
        let record = self.entry(meeting);
        let before = record.known_absentees.len();
        record.known_absentees.extend(absent.iter().copied());
        record.known_absentees.len() != before
    }

    /// One line per meeting: vertex, participants, counts.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (meeting, record) in &self.records {
            let _ = write!(
                out,
                "{} held={} missed={}",
                meeting, record.held_count, record.missed_count
            );
            if !record.known_absentees.is_empty() {
                let ids: Vec<String> =
                    record.known_absentees.iter().map(|a| a.0.to_string()).collect();
                let _ = write!(out, " absent={{{}}}", ids.join(","));
            }
            out.push_str("; ");
        }
        out.trim_end_matches("; ").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::MeetingSchedule;

    fn meeting() -> MeetingPoint {
        MeetingPoint::new(
            VertexId(2),
            [AgentId(1), AgentId(2)],
            MeetingSchedule::fixed(10, 20).unwrap(),
        )
    }

    fn none() -> BTreeSet<AgentId> {
        BTreeSet::new()
    }

    #[test]
    fn arrive_requires_vertex_and_tick() {
        let m = meeting();
        let mut t = MeetingTracker::new(AgentId(1));
        assert!(!t.arrive(&m, VertexId(2), 9));
        assert!(!t.arrive(&m, VertexId(3), 10));
        assert!(t.arrive(&m, VertexId(2), 10));
        assert!(t.is_waiting(&m, 10));
    }

    #[test]
    fn non_participant_never_arrives() {
        let m = meeting();
        let mut t = MeetingTracker::new(AgentId(7));
        assert!(!t.arrive(&m, VertexId(2), 10));
    }

    #[test]
    fn full_attendance_is_held() {
        let m = meeting();
        let mut t = MeetingTracker::new(AgentId(1));
        t.arrive(&m, VertexId(2), 10);
        assert!(t.record_presence(&m, AgentId(2), 10));
        let outcome = t.conclude(&m, 10, &none()).unwrap();
        assert!(matches!(outcome, MeetingOutcome::Held { .. }));
        assert_eq!(t.record(&m).unwrap().held_count, 1);
        assert_eq!(t.next_rendezvous(&m), Some(30));
    }

    #[test]
    fn absentee_still_advances_schedule() {
        let m = meeting();
        let mut t = MeetingTracker::new(AgentId(1));
        t.arrive(&m, VertexId(2), 10);
        let outcome = t.conclude(&m, 10, &none()).unwrap();
        match outcome {
            MeetingOutcome::PartiallyMissed { absent, reporter, .. } => {
                assert_eq!(absent, BTreeSet::from([AgentId(2)]));
                assert_eq!(reporter, AgentId(1));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let record = t.record(&m).unwrap();
        assert_eq!(record.held_count, 1);
        assert!(record.known_absentees.contains(&AgentId(2)));

        // Next time the known absentee is no longer expected.
        t.arrive(&m, VertexId(2), 30);
        assert!(matches!(t.conclude(&m, 30, &none()), Some(MeetingOutcome::Held { .. })));
    }

    #[test]
    fn lost_agents_are_not_expected() {
        let m = meeting();
        let mut t = MeetingTracker::new(AgentId(1));
        t.arrive(&m, VertexId(2), 10);
        let lost = [AgentId(2)].into_iter().collect();
        assert!(matches!(t.conclude(&m, 10, &lost), Some(MeetingOutcome::Held { .. })));
    }

    #[test]
    fn late_agent_counts_misses_and_catches_up() {
        let m = meeting();
        let mut t = MeetingTracker::new(AgentId(2));
        assert!(!t.arrive(&m, VertexId(2), 35));
        let record = t.record(&m).unwrap();
        assert_eq!(record.missed_count, 2);
        assert_eq!(t.next_rendezvous(&m), Some(50));
        assert!(t.arrive(&m, VertexId(2), 50));
    }

    #[test]
    fn conclude_without_arrival_is_none() {
        let m = meeting();
        let mut t = MeetingTracker::new(AgentId(1));
        assert!(t.conclude(&m, 10, &none()).is_none());
    }

    #[test]
    fn presence_outside_the_round_is_ignored() {
        let m = meeting();
        let mut t = MeetingTracker::new(AgentId(1));
        assert!(!t.record_presence(&m, AgentId(2), 10));
        t.arrive(&m, VertexId(2), 10);
        assert!(!t.record_presence(&m, AgentId(2), 11));
        assert!(!t.record_presence(&m, AgentId(9), 10));
    }

    #[test]
    fn summary_mentions_counts() {
        let m = meeting();
        let mut t = MeetingTracker::new(AgentId(1));
        t.arrive(&m, VertexId(2), 10);
        t.conclude(&m, 10, &none());
        assert_eq!(t.summary(), "v2{1,2} held=1 missed=0 absent={2}");
    }
}
