//! # Waymark Runtime
//!
//! The fleet driver and the pieces of the world it simulates.
//!
//! The runtime owns the patrol graph and the communication model, and
//! drives agents one tick at a time, including scripted removals. Agents
//! only ever see envelopes and a read-only view of the graph.

pub mod topology_impl;
pub mod comm;
pub mod fleet;
pub mod fleet_builder;
pub mod prelude;
