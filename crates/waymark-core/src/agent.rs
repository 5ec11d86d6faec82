//! The agent contract the fleet driver talks to.
//!
//! An agent owns its replica, its meeting tracker and its routines. The
//! driver never reaches into that state; every interaction is one of the
//! calls below, and agents never share memory with each other, only
//! [`Envelope`]s.

use crate::error::Result;
use crate::topology::PatrolGraph;
use crate::track_info::Envelope;
use crate::types::*;

/// What an agent can see of the world during one tick.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    pub tick: Tick,
    pub motion: MotionStatus,
    pub graph: &'a dyn PatrolGraph,
}

/// A patrolling agent.
///
/// Within one fleet tick the driver calls, in order: `gossip`/`receive`
/// for agents in range, `open_rendezvous`, `receive` for the exchange
/// records, `close_rendezvous`, `receive` for absence reports, and finally
/// `tick` to obtain a movement intent.
pub trait Agent {
    fn id(&self) -> AgentId;

    /// The vertex the agent stands on.
    fn position(&self) -> VertexId;

    fn set_position(&mut self, position: VertexId);

    /// A replica exchange for every agent in range.
    fn gossip(&self) -> Envelope;

    /// Merge an incoming envelope. May produce a direct reply.
    fn receive(&mut self, envelope: Envelope, ctx: &TickContext<'_>) -> Option<Envelope>;

    /// Exchange records for every rendezvous firing at the agent's vertex
    /// this tick.
    fn open_rendezvous(&mut self, ctx: &TickContext<'_>) -> Vec<Envelope>;

    /// Conclude this tick's rendezvous. The designated reporter returns the
    /// absence reports to hand to co-located agents.
    fn close_rendezvous(&mut self, ctx: &TickContext<'_>) -> Result<Vec<Envelope>>;

    /// Run the agent's routines for this tick.
    fn tick(&mut self, ctx: &TickContext<'_>) -> Result<AgentIntent>;

    /// The partition the agent currently patrols.
    fn current_partition(&self) -> Option<PartitionInfo>;

    /// One-line human readable status.
    fn debug_summary(&self) -> String;

    /// Events produced since the last drain.
    fn drain_events(&mut self) -> Vec<AgentEvent>;
}
