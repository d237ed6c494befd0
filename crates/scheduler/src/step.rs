use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::error::SchedulerError;
use crate::visualizer::{ReadySender, Visualizer};

pub type StepId = String;

/// Which neighbour counts as "next" when walking the sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Timings gathered for one execution of a step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub id: StepId,
    /// Wall time spent inside the executor.
    pub execution: Duration,
    /// Wait between the execution request and the executor starting.
    /// Non-zero only when the step was still preparing.
    pub execution_delay: Duration,
    pub preparation: Option<Duration>,
    /// Time since the predecessor signalled the trigger.
    pub trigger_delay: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepPhase { Preparing, Ready }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Execution {
    Idle,
    /// Requested by a predecessor that has not finished executing itself.
    Queued,
    /// Requested while preparation is still running.
    Waiting { requested_at: Instant, trigger_at: Instant },
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Trigger {
    pub(crate) successor: usize,
    pub(crate) at: Instant,
}

/// A unit of deferred work: prepared once at construction, executed on demand.
///
/// Neighbours are positions in the owning scheduler's sequence; a step never owns them.
#[derive(Debug)]
pub struct Step {
    id: StepId,
    action: String,
    predecessor: Option<usize>,
    successor: Option<usize>,
    prepared: Option<Value>,
    prepare_started: Instant,
    preparation: Option<Duration>,
    execution: Execution,
    executions: u32,
    pending_trigger: Option<Trigger>,
}

impl Step {
    /// Builds the step and starts its preparation right away.
    pub(crate) fn start<V: Visualizer>(
        id: StepId,
        action: String,
        data: Value,
        index: usize,
        visualizer: &mut V,
        ready: &ReadySender,
        now: Instant,
    ) -> Result<Self, SchedulerError> {
        if !visualizer.supports(&action) {
            return Err(SchedulerError::UnregisteredAction { id, action });
        }
        visualizer.prepare(&action, data, ready.handle(index, &id));
        Ok(Self {
            id,
            action,
            predecessor: None,
            successor: None,
            prepared: None,
            prepare_started: now,
            preparation: None,
            execution: Execution::Idle,
            executions: 0,
            pending_trigger: None,
        })
    }

    pub fn id(&self) -> &str { &self.id }

    pub fn action(&self) -> &str { &self.action }

    pub fn phase(&self) -> StepPhase {
        if self.prepared.is_some() { StepPhase::Ready } else { StepPhase::Preparing }
    }

    pub fn is_ready(&self) -> bool { self.prepared.is_some() }

    pub fn prepared(&self) -> Option<&Value> { self.prepared.as_ref() }

    pub fn preparation(&self) -> Option<Duration> { self.preparation }

    /// True once the latest execution request has completed.
    pub fn executed(&self) -> bool { self.execution == Execution::Done }

    /// How many times the executor ran for this step.
    pub fn executions(&self) -> u32 { self.executions }

    pub fn neighbor(&self, direction: Direction) -> Option<usize> {
        match direction {
            Direction::Forward => self.successor,
            Direction::Backward => self.predecessor,
        }
    }

    pub fn has_successor(&self, direction: Direction) -> bool { self.neighbor(direction).is_some() }

    pub fn has_predecessor(&self, direction: Direction) -> bool { self.neighbor(direction.reversed()).is_some() }

    pub(crate) fn link_successor(&mut self, index: usize) { self.successor = Some(index); }

    pub(crate) fn link_predecessor(&mut self, index: usize) { self.predecessor = Some(index); }

    /// Stores the prepared payload. Returns the parked request, if execution was waiting.
    pub(crate) fn on_ready(&mut self, prepared: Value, now: Instant) -> Option<(Instant, Instant)> {
        if self.prepared.is_some() {
            tracing::warn!(step = %self.id, "preparation completed twice, keeping the first payload");
            return None;
        }
        self.preparation = Some(now.saturating_duration_since(self.prepare_started));
        self.prepared = Some(prepared);
        match self.execution {
            Execution::Waiting { requested_at, trigger_at } => Some((requested_at, trigger_at)),
            _ => None,
        }
    }

    /// Returns true when the executor can run now; otherwise parks the request until `on_ready`.
    pub(crate) fn request_execution(&mut self, trigger_at: Instant, now: Instant) -> bool {
        if self.prepared.is_some() {
            return true;
        }
        self.execution = Execution::Waiting { requested_at: now, trigger_at };
        false
    }

    pub(crate) fn run<V: Visualizer, C: Clock>(
        &mut self,
        visualizer: &mut V,
        clock: &C,
        requested_at: Instant,
        trigger_at: Instant,
    ) -> Option<StepReport> {
        let prepared = self.prepared.as_ref()?;
        let started = clock.now();
        visualizer.execute(&self.action, prepared, &self.id);
        let finished = clock.now();
        self.execution = Execution::Done;
        self.executions += 1;
        Some(StepReport {
            id: self.id.clone(),
            execution: finished.saturating_duration_since(started),
            execution_delay: started.saturating_duration_since(requested_at),
            preparation: self.preparation,
            trigger_delay: finished.saturating_duration_since(trigger_at),
        })
    }

    /// Busy steps have an execution request that has not run yet.
    pub(crate) fn is_busy(&self) -> bool {
        matches!(self.execution, Execution::Queued | Execution::Waiting { .. })
    }

    pub(crate) fn queue(&mut self) { self.execution = Execution::Queued; }

    /// Drops an execution request that has not run yet.
    pub(crate) fn cancel_request(&mut self) {
        if self.is_busy() { self.execution = Execution::Idle; }
    }

    pub(crate) fn defer_trigger(&mut self, trigger: Trigger) -> Option<Trigger> { self.pending_trigger.replace(trigger) }

    pub(crate) fn take_pending_trigger(&mut self) -> Option<Trigger> { self.pending_trigger.take() }
}
