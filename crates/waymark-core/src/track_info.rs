//! Rendezvous messages.
//!
//! Track info records are built at the tick a rendezvous fires and are
//! consumed by co-present agents that tick. [`Envelope`] is the only
//! thing agents ever send each other; every envelope piggybacks the
//! sender's stigmergy replica.

use crate::meeting::{MeetingPhase, MeetingTracker};
use crate::schedule::MeetingPoint;
use crate::stigmergy::FleetEntry;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Attendance payload exchanged at a rendezvous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackInfo {
    /// "I am here for this meeting."
    ExchangeInfoAtMeeting {
        meeting: MeetingPoint,
        exchange_at_tick: Tick,
        sender_agent_id: AgentId,
    },
    /// "These participants did not show up."
    MissingRobotsAtMeeting {
        meeting: MeetingPoint,
        exchange_at_tick: Tick,
        sender_agent_id: AgentId,
        missing_agent_ids: BTreeSet<AgentId>,
        reported_by_agent_id: AgentId,
    },
}

/// The receiving side of [`TrackInfo::process`].
pub struct TrackContext<'a> {
    pub receiver: AgentId,
    pub tick: Tick,
    pub tracker: &'a mut MeetingTracker,
}

impl TrackInfo {
    pub fn meeting(&self) -> &MeetingPoint {
        match self {
            TrackInfo::ExchangeInfoAtMeeting { meeting, .. }
            | TrackInfo::MissingRobotsAtMeeting { meeting, .. } => meeting,
        }
    }

    pub fn sender(&self) -> AgentId {
        match self {
            TrackInfo::ExchangeInfoAtMeeting { sender_agent_id, .. }
            | TrackInfo::MissingRobotsAtMeeting { sender_agent_id, .. } => *sender_agent_id,
        }
    }

    /// Apply this record to the receiver's tracker.
    ///
    /// An exchange record from a participant the receiver had not yet
    /// noted is answered with the receiver's own exchange record, so a
    /// one-sided greeting still becomes mutual. Everything else, and any
    /// record for a meeting the receiver is not part of, yields `None`.
    pub fn process(self, ctx: &mut TrackContext<'_>) -> Option<TrackInfo> {
        match self {
            TrackInfo::ExchangeInfoAtMeeting {
                meeting,
                exchange_at_tick,
                sender_agent_id,
            } => {
                if exchange_at_tick != ctx.tick
                    || !meeting.involves(ctx.receiver)
                    || !ctx.tracker.is_waiting(&meeting, ctx.tick)
                {
                    return None;
                }
                let newly_seen = !ctx
                    .tracker
                    .record(&meeting)
                    .is_some_and(|r| match &r.phase {
                        MeetingPhase::AtVertexWaitingForPeers { present, .. } => {
                            present.contains(&sender_agent_id)
                        }
                        _ => false,
                    });
                ctx.tracker.record_presence(&meeting, sender_agent_id, ctx.tick);
                newly_seen.then(|| TrackInfo::ExchangeInfoAtMeeting {
                    meeting,
                    exchange_at_tick,
                    sender_agent_id: ctx.receiver,
                })
            }
            TrackInfo::MissingRobotsAtMeeting {
                meeting,
                missing_agent_ids,
                reported_by_agent_id,
                ..
            } => {
                if ctx.tracker.note_absentees(&meeting, &missing_agent_ids) {
                    debug!(
                        receiver = %ctx.receiver,
                        reporter = %reported_by_agent_id,
                        meeting = %meeting,
                        missing = ?missing_agent_ids,
                        "noted absentees"
                    );
                }
                None
            }
        }
    }
}

/// What an envelope carries besides the piggybacked replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Plain replica exchange between agents in range.
    Gossip,
    /// Rendezvous record.
    Track(TrackInfo),
}

/// A message between two agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: AgentId,
    pub payload: Payload,
    pub piggyback: Vec<FleetEntry>,
}

impl Envelope {
    pub fn gossip(from: AgentId, piggyback: Vec<FleetEntry>) -> Self {
        Self {
            from,
            payload: Payload::Gossip,
            piggyback,
        }
    }

    pub fn track(from: AgentId, info: TrackInfo, piggyback: Vec<FleetEntry>) -> Self {
        Self {
            from,
            payload: Payload::Track(info),
            piggyback,
        }
    }
}
