//! # Waymark Agents
//!
//! The patrol agent and the routines it runs every tick:
//!
//! - **AssignPartitions**: the lowest-id agent publishes the initial layout
//! - **Reconcile**: publishes layouts for loss sets nobody has covered yet
//! - **PartitionLookup**: polls the replica for the agent's own partition
//! - **PatrolPlanner**: picks the next vertex, or heads to a rendezvous

pub mod patrol;
pub mod routines;
pub mod serialize;
pub mod prelude;
