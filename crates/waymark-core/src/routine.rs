//! Cooperative routines.
//!
//! An agent's behaviour is a handful of small routines that run inside
//! its tick. A routine never blocks: it does a bounded amount of work and
//! says when it wants to run again. Polling a replica key "until it shows
//! up" is a routine that keeps answering [`Suspend::NextTick`].

use crate::agent::TickContext;
use crate::error::Result;
use crate::types::Tick;
use tracing::trace;

/// Something a suspended routine can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// The motion status reported by the simulation changed.
    MotionStatusChanged,
    /// The replica learned about another lost agent.
    LossSetChanged,
}

/// When a routine wants to be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    NextTick,
    /// Resume `n` ticks from now (`0` is treated as `1`).
    After(Tick),
    Until(Condition),
    Finished,
}

/// State a scheduler can watch for conditions.
pub trait Observe {
    /// A token that changes whenever `condition` would fire.
    fn observe(&self, condition: Condition, ctx: &TickContext<'_>) -> u64;
}

/// A unit of per-tick agent behaviour over state `S`.
pub trait Routine<S> {
    fn name(&self) -> &'static str;

    /// Lower runs first within a tick.
    fn priority(&self) -> u8;

    fn advance(&mut self, state: &mut S, ctx: &TickContext<'_>) -> Result<Suspend>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Ready,
    AtTick(Tick),
    OnChange { condition: Condition, token: u64 },
    Done,
}

struct Slot<S> {
    routine: Box<dyn Routine<S>>,
    wake: Wake,
}

/// Runs ready routines in ascending priority, once per tick.
pub struct RoutineScheduler<S> {
    slots: Vec<Slot<S>>,
}

impl<S> Default for RoutineScheduler<S> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<S: Observe> RoutineScheduler<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a routine; it runs on the next call to [`run_tick`](Self::run_tick).
    ///
    /// Routines of equal priority keep their spawn order.
    pub fn spawn(&mut self, routine: Box<dyn Routine<S>>) {
        let at = self
            .slots
            .iter()
            .position(|s| s.routine.priority() > routine.priority())
            .unwrap_or(self.slots.len());
        self.slots.insert(
            at,
            Slot {
                routine,
                wake: Wake::Ready,
            },
        );
    }

    /// Run every routine that is due. Returns how many ran.
    pub fn run_tick(&mut self, state: &mut S, ctx: &TickContext<'_>) -> Result<usize> {
        let mut ran = 0;
        for slot in &mut self.slots {
            let due = match slot.wake {
                Wake::Ready => true,
                Wake::AtTick(t) => ctx.tick >= t,
                Wake::OnChange { condition, token } => state.observe(condition, ctx) != token,
                Wake::Done => false,
            };
            if !due {
                continue;
            }

            let suspend = slot.routine.advance(state, ctx)?;
            ran += 1;
            slot.wake = match suspend {
                Suspend::NextTick => Wake::AtTick(ctx.tick + 1),
                Suspend::After(n) => Wake::AtTick(ctx.tick + n.max(1)),
                Suspend::Until(condition) => Wake::OnChange {
                    condition,
                    token: state.observe(condition, ctx),
                },
                Suspend::Finished => Wake::Done,
            };
            trace!(routine = slot.routine.name(), tick = ctx.tick, wake = ?slot.wake, "routine suspended");
        }
        Ok(ran)
    }

    pub fn is_finished(&self, name: &str) -> bool {
        self.slots
            .iter()
            .any(|s| s.routine.name() == name && s.wake == Wake::Done)
    }

    /// Routines that have not finished.
    pub fn active(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|s| s.wake != Wake::Done)
            .map(|s| s.routine.name())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
