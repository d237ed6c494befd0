use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

/// Capability provider for a scheduler: knows how to prepare and execute each action.
///
/// Preparation is asynchronous. `prepare` must hand the prepared payload back through
/// `done` exactly once, even when the underlying work fails (use a best-effort or
/// empty payload), otherwise the chain stalls at that step. Execution is synchronous.
pub trait Visualizer {
    /// Whether both a preparator and an executor exist for `action`.
    fn supports(&self, action: &str) -> bool;

    fn prepare(&mut self, action: &str, data: Value, done: PrepareDone);

    fn execute(&mut self, action: &str, prepared: &Value, id: &str);

    /// `Some(excess)` when execution ran longer than the playback delay, `None` to clear.
    fn notify_overtime(&mut self, _overtime: Option<Duration>) {}

    /// Called once the scheduler dropped every step, before a new session starts.
    fn on_reset(&mut self) {}
}

/// Preparation result travelling back to the scheduler.
#[derive(Debug)]
pub struct Ready {
    pub(crate) session: u64,
    pub(crate) index: usize,
    pub(crate) prepared: Value,
}

#[derive(Clone, Debug)]
pub(crate) struct ReadySender {
    tx: UnboundedSender<Ready>,
    session: u64,
}

impl ReadySender {
    pub(crate) fn new(tx: UnboundedSender<Ready>) -> Self { Self { tx, session: 0 } }

    pub(crate) fn session(&self) -> u64 { self.session }

    pub(crate) fn next_session(&mut self) { self.session += 1; }

    pub(crate) fn handle(&self, index: usize, id: &str) -> PrepareDone {
        PrepareDone { tx: Some(self.tx.clone()), session: self.session, index, id: id.to_owned() }
    }
}

/// One-shot completion handle given to a preparator.
pub struct PrepareDone {
    tx: Option<UnboundedSender<Ready>>,
    session: u64,
    index: usize,
    id: String,
}

impl PrepareDone {
    pub fn step_id(&self) -> &str { &self.id }

    pub fn done(mut self, prepared: Value) {
        let Some(tx) = self.tx.take() else { return };
        if tx.send(Ready { session: self.session, index: self.index, prepared }).is_err() {
            tracing::debug!(step = %self.id, "scheduler is gone, dropping prepared data");
        }
    }
}

impl Drop for PrepareDone {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(step = %self.id, "preparation dropped without calling done; the step will never execute");
        }
    }
}

impl fmt::Debug for PrepareDone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrepareDone")
            .field("id", &self.id)
            .field("session", &self.session)
            .field("pending", &self.tx.is_some())
            .finish()
    }
}

type PrepareFn = Box<dyn FnMut(Value, PrepareDone) + Send>;
type ExecuteFn = Box<dyn FnMut(&Value, &str) + Send>;
type OvertimeFn = Box<dyn FnMut(Option<Duration>) + Send>;

/// Visualizer assembled from per-action closures.
#[derive(Default)]
pub struct ActionTable {
    preparators: HashMap<String, PrepareFn>,
    executors: HashMap<String, ExecuteFn>,
    overtime: Option<OvertimeFn>,
}

impl ActionTable {
    pub fn new() -> Self { Self::default() }

    pub fn action<P, E>(mut self, name: impl Into<String>, prepare: P, execute: E) -> Self
    where
        P: FnMut(Value, PrepareDone) + Send + 'static,
        E: FnMut(&Value, &str) + Send + 'static,
    {
        let name = name.into();
        self.preparators.insert(name.clone(), Box::new(prepare));
        self.executors.insert(name, Box::new(execute));
        self
    }

    pub fn on_overtime(mut self, f: impl FnMut(Option<Duration>) + Send + 'static) -> Self {
        self.overtime = Some(Box::new(f));
        self
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> { self.preparators.keys().map(String::as_str) }
}

impl Visualizer for ActionTable {
    fn supports(&self, action: &str) -> bool {
        self.preparators.contains_key(action) && self.executors.contains_key(action)
    }

    fn prepare(&mut self, action: &str, data: Value, done: PrepareDone) {
        if let Some(prepare) = self.preparators.get_mut(action) { prepare(data, done); }
    }

    fn execute(&mut self, action: &str, prepared: &Value, id: &str) {
        if let Some(execute) = self.executors.get_mut(action) { execute(prepared, id); }
    }

    fn notify_overtime(&mut self, overtime: Option<Duration>) {
        if let Some(f) = self.overtime.as_mut() { f(overtime); }
    }
}

impl fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<&str> = self.actions().collect();
        actions.sort_unstable();
        f.debug_struct("ActionTable").field("actions", &actions).finish()
    }
}
