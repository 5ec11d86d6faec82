//! Waymark Agents Prelude: convenient imports for common usage.
//!
//! ```rust
//! use waymark_agents::prelude::*;
//! ```

pub use crate::patrol::{PatrolAgent, PatrolState};
pub use crate::routines::{AssignPartitions, PartitionLookup, PatrolPlanner, Reconcile};
pub use crate::serialize::{AgentSnapshot, MeetingSummary};

// Re-export from core
pub use waymark_core::prelude::*;
