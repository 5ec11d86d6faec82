//! Rendezvous scheduling.
//!
//! A meeting point's calendar is a pure function of its stored
//! parameters: `tick_of(n)` never depends on network state, call order or
//! on how often it was asked before. There is no mutable scheduler state
//! anywhere; the per-agent progress through a calendar lives in the
//! [`MeetingTracker`](crate::meeting::MeetingTracker).

use crate::error::{PreconditionViolation, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Scheduling policy of a meeting point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MeetingSchedule {
    /// `tick(n) = first_meeting_tick + n * interval_ticks`.
    FixedInterval {
        first_meeting_tick: Tick,
        interval_ticks: Tick,
    },
    /// `tick(n) = current_next_tick + n * next_next_interval_ticks`.
    ///
    /// The first occurrence is pinned independently of the steady-state
    /// cadence, so a calendar can be re-anchored after its first meeting.
    TwoPhase {
        current_next_tick: Tick,
        next_next_interval_ticks: Tick,
    },
}

impl MeetingSchedule {
    pub fn fixed(first_meeting_tick: Tick, interval_ticks: Tick) -> Result<Self> {
        Self::checked(MeetingSchedule::FixedInterval {
            first_meeting_tick,
            interval_ticks,
        })
    }

    pub fn two_phase(current_next_tick: Tick, next_next_interval_ticks: Tick) -> Result<Self> {
        Self::checked(MeetingSchedule::TwoPhase {
            current_next_tick,
            next_next_interval_ticks,
        })
    }

    /// A calendar needs a non-zero interval and at least two
    /// representable occurrences.
    fn checked(schedule: Self) -> Result<Self> {
        let (anchor, interval) = schedule.anchor_and_interval();
        if interval == 0 {
            return Err(PreconditionViolation::ZeroInterval.into());
        }
        if anchor.checked_add(interval).is_none() {
            return Err(PreconditionViolation::ScheduleOverflow { anchor, interval }.into());
        }
        Ok(schedule)
    }

    fn anchor_and_interval(&self) -> (Tick, Tick) {
        match *self {
            MeetingSchedule::FixedInterval {
                first_meeting_tick,
                interval_ticks,
            } => (first_meeting_tick, interval_ticks),
            MeetingSchedule::TwoPhase {
                current_next_tick,
                next_next_interval_ticks,
            } => (current_next_tick, next_next_interval_ticks),
        }
    }

    /// Tick of the `n`-th occurrence (zero based), or `None` once the
    /// calendar has run past the last representable tick.
    pub fn tick_of(&self, n: u64) -> Option<Tick> {
        let (anchor, interval) = self.anchor_and_interval();
        n.checked_mul(interval)?.checked_add(anchor)
    }

    /// Index of the first occurrence at or after `tick`.
    pub fn first_index_at_or_after(&self, tick: Tick) -> u64 {
        let (anchor, interval) = self.anchor_and_interval();
        if tick <= anchor || interval == 0 {
            return 0;
        }
        (tick - anchor).div_ceil(interval)
    }

    /// Steady-state interval between occurrences.
    pub fn interval(&self) -> Tick {
        self.anchor_and_interval().1
    }

    /// Copy of this schedule shifted later by `offset` ticks.
    pub fn offset_by(&self, offset: Tick) -> Result<Self> {
        let (anchor, interval) = self.anchor_and_interval();
        let shifted = anchor
            .checked_add(offset)
            .ok_or(PreconditionViolation::ScheduleOverflow { anchor, interval })?;
        self.rebuilt(shifted, interval)
    }

    /// Copy of this schedule with a different steady-state interval.
    pub fn with_interval(&self, interval: Tick) -> Result<Self> {
        let (anchor, _) = self.anchor_and_interval();
        self.rebuilt(anchor, interval)
    }

    fn rebuilt(&self, anchor: Tick, interval: Tick) -> Result<Self> {
        match self {
            MeetingSchedule::FixedInterval { .. } => MeetingSchedule::fixed(anchor, interval),
            MeetingSchedule::TwoPhase { .. } => MeetingSchedule::two_phase(anchor, interval),
        }
    }
}

/// A scheduled co-location of a fixed group of agents at one vertex.
///
/// Equality, ordering and hashing are structural over
/// `(vertex, schedule, participants)`. Participants are a sorted set, so
/// the order in which they were discovered does not affect identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MeetingPoint {
    pub vertex: VertexId,
    pub schedule: MeetingSchedule,
    pub participants: BTreeSet<AgentId>,
}

impl MeetingPoint {
    pub fn new(
        vertex: VertexId,
        participants: impl IntoIterator<Item = AgentId>,
        schedule: MeetingSchedule,
    ) -> Self {
        Self {
            vertex,
            schedule,
            participants: participants.into_iter().collect(),
        }
    }

    pub fn tick_of(&self, n: u64) -> Option<Tick> {
        self.schedule.tick_of(n)
    }

    pub fn involves(&self, agent: AgentId) -> bool {
        self.participants.contains(&agent)
    }
}

impl fmt::Display for MeetingPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.participants.iter().map(|a| a.0.to_string()).collect();
        write!(f, "{}{{{}}}", self.vertex, ids.join(","))
    }
}

/// The first `count` rendezvous ticks of a meeting point.
pub fn calendar(meeting: &MeetingPoint, count: usize) -> Vec<Tick> {
    (0..count as u64).map_while(|n| meeting.tick_of(n)).collect()
}
