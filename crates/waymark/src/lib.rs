//! # Waymark
//!
//! Stigmergic coordination for fleets of patrolling agents that only
//! talk to each other when they happen to be close.
//!
//! Agents share a gossip-replicated key/value store. The lowest-id agent
//! publishes an initial partition of the patrol graph into it, and every
//! pair of agents with adjacent partitions meets on a fixed schedule at
//! a boundary vertex. When somebody fails to turn up, whoever is present
//! reports the absence and publishes a new layout keyed by the set of
//! lost agents, so independent reporters always agree on the result.
//!
//! ## Quick Start
//!
//! ```rust
//! use waymark::prelude::*;
//!
//! let mut fleet = FleetBuilder::new()
//!     .with_graph(PetPatrolGraph::line(9))
//!     .agent(AgentId(1), VertexId(0))
//!     .agent(AgentId(2), VertexId(4))
//!     .agent(AgentId(3), VertexId(8))
//!     .remove_at(AgentId(2), 5)
//!     .build()
//!     .unwrap();
//!
//! fleet.run(100).unwrap();
//!
//! for line in fleet.describe() {
//!     println!("{line}");
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`waymark_core`] - store, partitions, meeting schedules, redistribution, routines
//! - [`waymark_agents`] - the patrol agent and its routines
//! - [`waymark_runtime`] - fleet driver, petgraph-backed graph, communication range
//!
//! ## Key Concepts
//!
//! | Piece | What It Does |
//! |-------|--------------|
//! | Virtual stigmergy | Replicated store, merged on contact, lowest owner wins |
//! | Partition key | `(agent, excluded agents)`: one layout per loss set |
//! | Meeting point | Vertex, schedule and participants of a recurring rendezvous |
//! | Track info | Handshake and absence report exchanged at a rendezvous |
//! | Routine | Cooperative task resumed by the agent's tick |

// Re-export all subcrates
pub use waymark_agents as agents;
pub use waymark_core as core;
pub use waymark_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust
/// use waymark::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use waymark_core::types::{
        AbsenceReport, AgentEvent, AgentId, AgentIntent, MotionStatus, PartitionInfo,
        PartitionKey, SharedKey, SharedValue, Tick, VertexId,
    };

    // Core traits
    pub use waymark_core::agent::{Agent, TickContext};
    pub use waymark_core::redistribution::RedistributionPolicy;
    pub use waymark_core::routine::Routine;
    pub use waymark_core::topology::PatrolGraph;

    // Error types
    pub use waymark_core::error::{PreconditionViolation, Result, WaymarkError};

    // Coordination
    pub use waymark_core::meeting::{MeetingOutcome, MeetingTracker};
    pub use waymark_core::partition::PartitionAssigner;
    pub use waymark_core::planner::{delay_for_starts, plan_meetings, ScheduleConfig, SchedulePolicy};
    pub use waymark_core::redistribution::{PolicyKind, RedistributionCoordinator};
    pub use waymark_core::schedule::{calendar, MeetingPoint, MeetingSchedule};
    pub use waymark_core::stigmergy::FleetStore;

    // Agents
    pub use waymark_agents::patrol::PatrolAgent;
    pub use waymark_agents::serialize::AgentSnapshot;

    // Runtime
    pub use waymark_runtime::comm::CommConfig;
    pub use waymark_runtime::fleet::{Fleet, FleetConfig, FleetEvent, FleetSnapshot, FleetStats};
    pub use waymark_runtime::fleet_builder::FleetBuilder;
    pub use waymark_runtime::topology_impl::PetPatrolGraph;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
