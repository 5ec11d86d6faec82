//! # Waymark Core
//!
//! Coordination primitives for a fleet of patrolling agents that only
//! talk when they happen to be in range:
//!
//! - **StigmergyStore**: per-agent replica, merged with a static-priority rule
//! - **PartitionAssigner**: one disjoint slice of the patrol graph per agent
//! - **RendezvousScheduler**: pure `tick_of(n)` calendars for meeting points
//! - **MeetingTracker**: per-agent attendance of each meeting point
//! - **RedistributionCoordinator**: hands a lost agent's vertices to survivors
//!
//! ## Quick Start
//!
//! ```rust
//! use waymark_core::prelude::*;
//!
//! let store = FleetStore::new(AgentId::new(1));
//! assert!(store.partition_for(AgentId::new(1)).is_none());
//!
//! let schedule = MeetingSchedule::fixed(10, 20).unwrap();
//! assert_eq!(schedule.tick_of(2), Some(50));
//! ```

pub mod agent;
pub mod error;
pub mod meeting;
pub mod partition;
pub mod planner;
pub mod redistribution;
pub mod routine;
pub mod schedule;
pub mod stigmergy;
pub mod topology;
pub mod track_info;
pub mod types;
pub mod prelude;
