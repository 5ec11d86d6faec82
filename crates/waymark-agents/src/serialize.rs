//! Serializable agent state for run reports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use waymark_core::prelude::*;

/// Attendance of one meeting point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingSummary {
    pub meeting: MeetingPoint,
    pub held: u64,
    pub missed: u64,
    pub known_absentees: BTreeSet<AgentId>,
}

/// Point-in-time view of one patrol agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub position: VertexId,
    pub partition: Option<PartitionInfo>,
    pub loss_set: BTreeSet<AgentId>,
    pub declared_lost: bool,
    pub store_entries: usize,
    pub meetings: Vec<MeetingSummary>,
}

impl AgentSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
