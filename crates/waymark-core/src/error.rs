//! Error types for Waymark operations.
//!
//! Only configuration and precondition violations are errors. Transient
//! states (a key not yet replicated, a peer that has not arrived) are
//! ordinary values and never show up here.

use crate::types::{AgentId, Tick, VertexId};
use thiserror::Error;

/// Result type for Waymark operations.
pub type Result<T> = std::result::Result<T, WaymarkError>;

/// Errors that can occur during Waymark operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WaymarkError {
    /// A caller or configuration defect. Setup must abort.
    #[error("precondition violated: {0}")]
    Precondition(#[from] PreconditionViolation),

    /// Invalid configuration value.
    #[error("invalid value for {field}: {value} ({reason})")]
    Config {
        field: String,
        value: String,
        reason: String,
    },

    /// Serialization errors.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The invariant a fatal error violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionViolation {
    #[error("no agents to assign partitions to")]
    NoAgents,

    #[error("{vertices} patrol vertices cannot be split among {agents} agents")]
    TooFewVertices { vertices: usize, agents: usize },

    #[error("generated {partitions} partitions for {agents} agents")]
    PartitionCountMismatch { partitions: usize, agents: usize },

    #[error("vertex {vertex} assigned to both {first} and {second}")]
    OverlappingPartitions {
        vertex: VertexId,
        first: AgentId,
        second: AgentId,
    },

    #[error("vertex {0} is not covered by any partition")]
    UncoveredVertex(VertexId),

    #[error("partition of {agent} contains {vertex}, which is not a patrol vertex")]
    ForeignVertex { agent: AgentId, vertex: VertexId },

    #[error("agent {0} registered twice")]
    DuplicateAgent(AgentId),

    #[error("vertex {0} is not part of the patrol graph")]
    UnknownVertex(VertexId),

    #[error("rendezvous interval must be at least one tick")]
    ZeroInterval,

    #[error("calendar starting at tick {anchor} every {interval} ticks runs past the last tick")]
    ScheduleOverflow { anchor: Tick, interval: Tick },

    #[error("every known agent is lost; nobody is left to patrol")]
    NoSurvivors,
}

impl From<serde_json::Error> for WaymarkError {
    fn from(e: serde_json::Error) -> Self {
        WaymarkError::Serialization(e.to_string())
    }
}

// Convenience constructors
impl WaymarkError {
    pub fn invalid_config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        WaymarkError::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error must halt the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WaymarkError::Precondition(_) | WaymarkError::Config { .. })
    }
}
