//! Waymark Core Prelude: convenient imports for common usage.
//!
//! ```rust
//! use waymark_core::prelude::*;
//! ```

pub use crate::types::{
    AbsenceReport, AgentEvent, AgentId, AgentIntent, MotionStatus, PartitionInfo, PartitionKey,
    SharedKey, SharedValue, Tick, VertexId,
};

pub use crate::agent::{Agent, TickContext};
pub use crate::error::{PreconditionViolation, Result, WaymarkError};
pub use crate::meeting::{MeetingOccurrenceRecord, MeetingOutcome, MeetingPhase, MeetingTracker};
pub use crate::partition::PartitionAssigner;
pub use crate::planner::{delay_for_starts, plan_meetings, ScheduleConfig, SchedulePolicy};
pub use crate::redistribution::{
    EvenSplit, GlobalRepartition, NearestNeighbor, PolicyKind, RedistributionCoordinator,
    RedistributionOutcome, RedistributionPolicy,
};
pub use crate::routine::{Condition, Observe, Routine, RoutineScheduler, Suspend};
pub use crate::schedule::{calendar, MeetingPoint, MeetingSchedule};
pub use crate::stigmergy::{
    lowest_owner_wins, FleetEntry, FleetStore, MergeOutcome, Resolution, StigmergyEntry,
    StigmergyStore,
};
pub use crate::topology::PatrolGraph;
pub use crate::track_info::{Envelope, Payload, TrackContext, TrackInfo};
