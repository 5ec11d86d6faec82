//! Waymark Runtime Prelude: convenient imports for common usage.
//!
//! ```rust
//! use waymark_runtime::prelude::*;
//! ```

// Re-export fleet
pub use crate::fleet::{Fleet, FleetConfig, FleetEvent, FleetSnapshot, FleetStats};

// Re-export fleet builder
pub use crate::fleet_builder::FleetBuilder;

// Re-export graph and communication model
pub use crate::comm::{CoLocated, CommConfig, FullMesh, HopRange, RangeOracle};
pub use crate::topology_impl::PetPatrolGraph;

// Re-export from agents
pub use waymark_agents::prelude::*;
