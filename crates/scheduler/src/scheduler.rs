use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::step::{Direction, Step, StepId, StepReport, Trigger};
use crate::visualizer::{Ready, ReadySender, Visualizer};

type ReportSink = Box<dyn FnMut(&StepReport) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState { Idle, Playing, Paused }

/// Plays an append-only sequence of steps at a fixed cadence.
///
/// The scheduler never sleeps: it keeps an armed deadline (`next_deadline`) that the
/// owner fires with `poll`/`on_timer`, and it receives preparation completions as
/// [`Ready`] messages (`next_ready` + `on_prepared`, or drained by `poll`).
pub struct Scheduler<V, C = SystemClock> {
    visualizer: V,
    clock: C,
    config: SchedulerConfig,
    delay: Duration,
    steps: Vec<Step>,
    positions: HashMap<StepId, usize>,
    cursor: Option<usize>,
    direction: Direction,
    reverse_lock: bool,
    playing: bool,
    deadline: Option<Instant>,
    // Step whose execution re-arms the timer.
    rearm_after: Option<usize>,
    ready: ReadySender,
    ready_rx: UnboundedReceiver<Ready>,
    reports: VecDeque<StepReport>,
    report_sink: Option<ReportSink>,
}

impl<V: Visualizer> Scheduler<V, SystemClock> {
    pub fn new(visualizer: V, config: SchedulerConfig) -> Self { Self::with_clock(visualizer, config, SystemClock) }
}

impl<V: Visualizer, C: Clock> Scheduler<V, C> {
    pub fn with_clock(visualizer: V, config: SchedulerConfig, clock: C) -> Self {
        let (tx, ready_rx) = mpsc::unbounded_channel();
        let delay = config.clamp(config.delay());
        Self {
            visualizer,
            clock,
            delay,
            config,
            steps: Vec::new(),
            positions: HashMap::new(),
            cursor: None,
            direction: Direction::Forward,
            reverse_lock: false,
            playing: false,
            deadline: None,
            rearm_after: None,
            ready: ReadySender::new(tx),
            ready_rx,
            reports: VecDeque::new(),
            report_sink: None,
        }
    }

    /// Appends a step behind the current tail and starts preparing it.
    ///
    /// Ids may repeat; `goto` resolves to the first step stored under an id.
    pub fn schedule_next_step(
        &mut self,
        id: impl Into<StepId>,
        action: impl Into<String>,
        data: Value,
    ) -> Result<(), SchedulerError> {
        let index = self.steps.len();
        let now = self.clock.now();
        let mut step = Step::start(id.into(), action.into(), data, index, &mut self.visualizer, &self.ready, now)?;
        if let Some(tail) = index.checked_sub(1) {
            self.steps[tail].link_successor(index);
            step.link_predecessor(tail);
        }
        tracing::trace!(step = step.id(), action = step.action(), index, "scheduled");
        self.positions.entry(step.id().to_owned()).or_insert(index);
        self.steps.push(step);
        self.drain_ready();
        Ok(())
    }

    /// Receives every execution report as it is produced, whatever `report_backlog` keeps.
    pub fn on_report(&mut self, sink: impl FnMut(&StepReport) + Send + 'static) {
        self.report_sink = Some(Box::new(sink));
    }

    pub fn play(&mut self) {
        self.drain_ready();
        self.disarm();
        self.playing = true;
        self.advance(true, false);
    }

    /// Stops the timer. The cursor and in-flight preparations are left alone.
    pub fn pause(&mut self) {
        self.drain_ready();
        self.playing = false;
        self.disarm();
    }

    /// Single-step advance. Keeps playing afterwards if playback was running.
    pub fn step(&mut self, reverse: bool) {
        self.drain_ready();
        if self.playing {
            self.disarm();
            self.advance(true, reverse);
        } else {
            self.advance(false, reverse);
        }
    }

    /// Toggles the reverse lock and returns its new value.
    pub fn reverse(&mut self) -> bool {
        self.drain_ready();
        self.reverse_lock = !self.reverse_lock;
        self.direction = self.locked_direction();
        self.reverse_lock
    }

    /// Jumps to the first step stored under `id` and executes it right away.
    ///
    /// Pending chain requests are dropped. The playing/paused status does not change.
    pub fn goto(&mut self, id: &str) -> Result<(), SchedulerError> {
        self.drain_ready();
        let Some(&index) = self.positions.get(id) else {
            tracing::warn!(step = id, "unable to find step");
            return Err(SchedulerError::UnknownStep(id.to_owned()));
        };
        for step in &mut self.steps {
            step.take_pending_trigger();
            step.cancel_request();
        }
        self.cursor = Some(index);
        if self.playing && self.deadline.is_none() {
            self.rearm_after = Some(index);
        } else {
            self.rearm_after = None;
        }
        let now = self.clock.now();
        self.execute(index, now);
        Ok(())
    }

    /// Drops every step and returns to idle. Completions from earlier steps are ignored.
    pub fn reset(&mut self) {
        self.ready.next_session();
        self.drain_ready();
        self.steps.clear();
        self.positions.clear();
        self.reports.clear();
        self.cursor = None;
        self.playing = false;
        self.disarm();
        self.direction = self.locked_direction();
        self.visualizer.notify_overtime(None);
        self.visualizer.on_reset();
        tracing::debug!(session = self.ready.session(), "scheduler reset");
    }

    pub fn speed_up(&mut self) -> Duration {
        self.set_delay(self.delay / 2)
    }

    pub fn speed_down(&mut self) -> Duration {
        self.set_delay(self.delay.saturating_mul(2))
    }

    fn set_delay(&mut self, delay: Duration) -> Duration {
        self.delay = self.config.clamp(delay);
        tracing::debug!(delay_ms = self.delay.as_millis() as u64, "delay changed");
        self.delay
    }

    /// Applies delivered completions, then fires the timer if it is due.
    pub fn poll(&mut self) {
        self.drain_ready();
        if self.deadline.is_some_and(|at| self.clock.now() >= at) {
            self.on_timer();
        }
    }

    pub fn on_timer(&mut self) {
        self.deadline = None;
        if self.playing {
            self.advance(true, false);
        }
    }

    pub fn on_prepared(&mut self, ready: Ready) {
        if ready.session != self.ready.session() {
            tracing::trace!(index = ready.index, "ignoring completion from a previous session");
            return;
        }
        let now = self.clock.now();
        let Some(step) = self.steps.get_mut(ready.index) else { return };
        if let Some((requested_at, trigger_at)) = step.on_ready(ready.prepared, now) {
            self.run_from(ready.index, requested_at, trigger_at);
        }
    }

    /// Waits for the next preparation completion. Cancel safe.
    pub async fn next_ready(&mut self) -> Option<Ready> { self.ready_rx.recv().await }

    pub fn next_deadline(&self) -> Option<Instant> { self.deadline }

    pub fn state(&self) -> PlaybackState {
        if self.playing {
            PlaybackState::Playing
        } else if self.cursor.is_none() {
            PlaybackState::Idle
        } else {
            PlaybackState::Paused
        }
    }

    pub fn is_playing(&self) -> bool { self.playing }

    pub fn delay(&self) -> Duration { self.delay }

    pub fn config(&self) -> &SchedulerConfig { &self.config }

    pub fn cursor(&self) -> Option<&Step> { self.cursor.map(|i| &self.steps[i]) }

    pub fn cursor_position(&self) -> Option<usize> { self.cursor }

    pub fn position(&self, id: &str) -> Option<usize> { self.positions.get(id).copied() }

    pub fn direction(&self) -> Direction { self.direction }

    pub fn reverse_locked(&self) -> bool { self.reverse_lock }

    pub fn len(&self) -> usize { self.steps.len() }

    pub fn is_empty(&self) -> bool { self.steps.is_empty() }

    pub fn steps(&self) -> &[Step] { &self.steps }

    pub fn get(&self, id: &str) -> Option<&Step> { self.position(id).map(|i| &self.steps[i]) }

    /// Execution reports gathered since the last call, oldest first.
    pub fn take_reports(&mut self) -> Vec<StepReport> { self.reports.drain(..).collect() }

    pub fn visualizer(&self) -> &V { &self.visualizer }

    pub fn visualizer_mut(&mut self) -> &mut V { &mut self.visualizer }

    pub fn into_visualizer(self) -> V { self.visualizer }

    fn locked_direction(&self) -> Direction {
        if self.reverse_lock { Direction::Backward } else { Direction::Forward }
    }

    fn advance(&mut self, reschedule: bool, reverse_requested: bool) {
        self.direction = if reverse_requested { Direction::Backward } else { self.locked_direction() };
        let now = self.clock.now();
        match self.cursor {
            Some(current) => {
                let Some(next) = self.steps[current].neighbor(self.direction) else {
                    // End of the chain: keep ticking until a successor shows up.
                    if reschedule { self.arm(now); }
                    return;
                };
                self.cursor = Some(next);
                if reschedule { self.rearm_after = Some(next); }
                self.trigger(current, next, now);
            }
            None if !self.steps.is_empty() => {
                self.cursor = Some(0);
                if reschedule { self.rearm_after = Some(0); }
                self.execute(0, now);
            }
            None => {
                if reschedule { self.arm(now); }
            }
        }
    }

    fn trigger(&mut self, from: usize, to: usize, now: Instant) {
        if self.steps[from].is_busy() {
            // `from` has not run yet: `to` runs right after it.
            self.steps[to].queue();
            if let Some(replaced) = self.steps[from].defer_trigger(Trigger { successor: to, at: now }) {
                if replaced.successor != to { self.steps[replaced.successor].cancel_request(); }
            }
            return;
        }
        self.execute(to, now);
    }

    fn execute(&mut self, index: usize, trigger_at: Instant) {
        let now = self.clock.now();
        if self.steps[index].request_execution(trigger_at, now) {
            self.run_from(index, now, trigger_at);
        } else {
            tracing::debug!(step = self.steps[index].id(), "waiting for preparation");
        }
    }

    // Runs `index`, then every trigger that was deferred behind it.
    fn run_from(&mut self, mut index: usize, mut requested_at: Instant, mut trigger_at: Instant) {
        loop {
            let Some(report) = self.steps[index].run(&mut self.visualizer, &self.clock, requested_at, trigger_at) else {
                return;
            };
            self.on_step_report(report);
            if self.rearm_after == Some(index) {
                self.rearm_after = None;
                let now = self.clock.now();
                self.arm(now);
            }
            let Some(Trigger { successor, at }) = self.steps[index].take_pending_trigger() else { return };
            let now = self.clock.now();
            if !self.steps[successor].request_execution(at, now) {
                return;
            }
            index = successor;
            requested_at = now;
            trigger_at = at;
        }
    }

    fn arm(&mut self, from: Instant) { self.deadline = Some(from + self.delay); }

    fn disarm(&mut self) {
        self.deadline = None;
        self.rearm_after = None;
    }

    fn drain_ready(&mut self) {
        while let Ok(ready) = self.ready_rx.try_recv() {
            self.on_prepared(ready);
        }
    }

    fn on_step_report(&mut self, report: StepReport) {
        tracing::debug!(
            step = %report.id,
            execution_ms = report.execution.as_millis() as u64,
            execution_delay_ms = report.execution_delay.as_millis() as u64,
            trigger_delay_ms = report.trigger_delay.as_millis() as u64,
            "executed"
        );
        let busy = report.execution + report.execution_delay;
        let overtime = if busy > self.delay {
            Some(busy - self.delay)
        } else if report.trigger_delay > self.delay {
            Some(report.trigger_delay - self.delay)
        } else {
            None
        };
        if let Some(excess) = overtime {
            tracing::warn!(step = %report.id, excess_ms = excess.as_millis() as u64, "step ran over the playback delay");
        }
        self.visualizer.notify_overtime(overtime);
        if let Some(sink) = self.report_sink.as_mut() {
            sink(&report);
        }
        if self.config.report_backlog == 0 {
            return;
        }
        while self.reports.len() >= self.config.report_backlog {
            self.reports.pop_front();
        }
        self.reports.push_back(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::visualizer::PrepareDone;
    use serde_json::json;
    use std::collections::HashSet;

    #[derive(Default)]
    struct Probe {
        hold: HashSet<String>,
        pending: HashMap<String, PrepareDone>,
        prepare_calls: HashMap<String, u32>,
        executed: Vec<String>,
        payloads: Vec<Value>,
        overtime: Vec<Option<Duration>>,
        resets: u32,
    }

    impl Visualizer for Probe {
        fn supports(&self, action: &str) -> bool { action == "display" }

        fn prepare(&mut self, _action: &str, data: Value, done: PrepareDone) {
            let id = done.step_id().to_owned();
            *self.prepare_calls.entry(id.clone()).or_default() += 1;
            if self.hold.contains(&id) {
                self.pending.insert(id, done);
            } else {
                done.done(data);
            }
        }

        fn execute(&mut self, _action: &str, prepared: &Value, id: &str) {
            self.executed.push(id.to_owned());
            self.payloads.push(prepared.clone());
        }

        fn notify_overtime(&mut self, overtime: Option<Duration>) { self.overtime.push(overtime); }

        fn on_reset(&mut self) { self.resets += 1; }
    }

    type TestScheduler = Scheduler<Probe, ManualClock>;

    fn scheduler(hold: &[&str]) -> (TestScheduler, ManualClock) {
        let clock = ManualClock::new();
        let probe = Probe { hold: hold.iter().map(|s| s.to_string()).collect(), ..Probe::default() };
        let config = SchedulerConfig::with_delay(Duration::from_millis(100));
        (Scheduler::with_clock(probe, config, clock.clone()), clock)
    }

    fn add(s: &mut TestScheduler, ids: &[&str]) {
        for id in ids {
            s.schedule_next_step(*id, "display", json!(id)).unwrap();
        }
    }

    fn release(s: &mut TestScheduler, id: &str) {
        let done = s.visualizer_mut().pending.remove(id).unwrap();
        done.done(json!(id));
        s.poll();
    }

    fn tick(s: &mut TestScheduler, clock: &ManualClock, ms: u64) {
        clock.advance(Duration::from_millis(ms));
        s.poll();
    }

    fn executed(s: &TestScheduler) -> Vec<&str> { s.visualizer().executed.iter().map(String::as_str).collect() }

    #[test]
    fn test_order_survives_out_of_order_preparation() {
        let (mut s, clock) = scheduler(&["f1"]);
        add(&mut s, &["f0", "f1", "f2"]);
        assert!(s.get("f2").unwrap().is_ready());
        s.play();
        assert_eq!(executed(&s), ["f0"]);
        tick(&mut s, &clock, 100);
        tick(&mut s, &clock, 100);
        assert_eq!(executed(&s), ["f0"]);
        release(&mut s, "f1");
        assert_eq!(executed(&s), ["f0", "f1"]);
        tick(&mut s, &clock, 100);
        assert_eq!(executed(&s), ["f0", "f1", "f2"]);
    }

    #[test]
    fn test_unprepared_step_never_executes() {
        let (mut s, clock) = scheduler(&["b"]);
        add(&mut s, &["a", "b", "c"]);
        s.play();
        for _ in 0..20 {
            tick(&mut s, &clock, 100);
        }
        assert_eq!(executed(&s), ["a"]);
        assert!(!s.get("b").unwrap().executed());
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn test_goto_reuses_prepared_data() {
        let (mut s, clock) = scheduler(&[]);
        add(&mut s, &["a", "b"]);
        s.play();
        tick(&mut s, &clock, 100);
        s.goto("a").unwrap();
        s.goto("a").unwrap();
        assert_eq!(executed(&s), ["a", "b", "a", "a"]);
        assert_eq!(s.visualizer().prepare_calls["a"], 1);
        assert_eq!(s.get("a").unwrap().executions(), 3);
        assert_eq!(s.cursor().unwrap().id(), "a");
        assert!(s.visualizer().payloads.iter().all(|p| p == "a" || p == "b"));
    }

    #[test]
    fn test_reverse_walks_back() {
        let (mut s, clock) = scheduler(&[]);
        add(&mut s, &["a", "b", "c"]);
        s.play();
        tick(&mut s, &clock, 100);
        tick(&mut s, &clock, 100);
        assert!(s.reverse());
        assert_eq!(s.direction(), Direction::Backward);
        tick(&mut s, &clock, 100);
        tick(&mut s, &clock, 100);
        tick(&mut s, &clock, 100);
        assert_eq!(executed(&s), ["a", "b", "c", "b", "a"]);
        assert!(!s.reverse());
        tick(&mut s, &clock, 100);
        assert_eq!(executed(&s), ["a", "b", "c", "b", "a", "b"]);
    }

    #[test]
    fn test_speed_controls_change_the_interval() {
        let (mut s, clock) = scheduler(&[]);
        add(&mut s, &["a", "b", "c"]);
        s.play();
        assert_eq!(s.speed_up(), Duration::from_millis(50));
        tick(&mut s, &clock, 100);
        assert_eq!(executed(&s), ["a", "b"]);
        assert_eq!(s.next_deadline().unwrap() - clock.now(), Duration::from_millis(50));
        assert_eq!(s.speed_down(), Duration::from_millis(100));
        assert_eq!(s.speed_down(), Duration::from_millis(200));
        tick(&mut s, &clock, 50);
        assert_eq!(s.next_deadline().unwrap() - clock.now(), Duration::from_millis(200));
    }

    #[test]
    fn test_speed_is_clamped() {
        let (mut s, _clock) = scheduler(&[]);
        for _ in 0..20 {
            s.speed_up();
        }
        assert_eq!(s.delay(), Duration::from_millis(1));
        for _ in 0..40 {
            s.speed_down();
        }
        assert_eq!(s.delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_pause_resumes_after_cursor() {
        let (mut s, clock) = scheduler(&[]);
        add(&mut s, &["a", "b"]);
        s.play();
        tick(&mut s, &clock, 100);
        s.pause();
        assert_eq!(s.state(), PlaybackState::Paused);
        add(&mut s, &["c", "d"]);
        tick(&mut s, &clock, 500);
        assert_eq!(executed(&s), ["a", "b"]);
        s.play();
        assert_eq!(executed(&s), ["a", "b", "c"]);
    }

    #[test]
    fn test_unknown_goto_changes_nothing() {
        let (mut s, clock) = scheduler(&[]);
        add(&mut s, &["a", "b"]);
        s.play();
        tick(&mut s, &clock, 100);
        let err = s.goto("nonexistent").unwrap_err();
        assert_eq!(err, SchedulerError::UnknownStep("nonexistent".into()));
        assert_eq!(s.cursor_position(), Some(1));
        assert_eq!(s.len(), 2);
        assert_eq!(s.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_manual_step_waits_behind_preparing_cursor() {
        let (mut s, _clock) = scheduler(&["b"]);
        add(&mut s, &["a", "b", "c"]);
        s.step(false);
        s.step(false);
        s.step(false);
        assert_eq!(executed(&s), ["a"]);
        assert_eq!(s.cursor().unwrap().id(), "c");
        release(&mut s, "b");
        assert_eq!(executed(&s), ["a", "b", "c"]);
        assert_eq!(s.state(), PlaybackState::Paused);
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn test_step_backward_while_paused() {
        let (mut s, _clock) = scheduler(&[]);
        add(&mut s, &["a", "b", "c"]);
        s.step(false);
        s.step(false);
        s.step(false);
        s.step(true);
        assert_eq!(executed(&s), ["a", "b", "c", "b"]);
        assert_eq!(s.next_deadline(), None);
        assert!(!s.reverse_locked());
    }

    #[test]
    fn test_slow_preparation_reports_overtime() {
        let (mut s, clock) = scheduler(&["f1"]);
        add(&mut s, &["f0", "f1"]);
        s.play();
        tick(&mut s, &clock, 100);
        clock.advance(Duration::from_millis(150));
        release(&mut s, "f1");
        assert_eq!(s.visualizer().overtime, [None, Some(Duration::from_millis(50))]);
        let reports = s.take_reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].execution_delay, Duration::from_millis(150));
        assert_eq!(reports[1].preparation, Some(Duration::from_millis(250)));
        assert!(s.take_reports().is_empty());
    }

    #[test]
    fn test_reset_ignores_stale_completions() {
        let (mut s, _clock) = scheduler(&["a"]);
        add(&mut s, &["a"]);
        let stale = s.visualizer_mut().pending.remove("a").unwrap();
        s.reverse();
        s.reset();
        assert_eq!(s.state(), PlaybackState::Idle);
        assert!(s.is_empty());
        assert!(s.reverse_locked());
        assert_eq!(s.visualizer().resets, 1);
        s.schedule_next_step("x", "display", json!("fresh")).unwrap();
        stale.done(json!("stale"));
        s.poll();
        assert_eq!(s.get("x").unwrap().prepared(), Some(&json!("fresh")));
        s.step(false);
        assert_eq!(s.visualizer().payloads, [json!("fresh")]);
    }

    #[test]
    fn test_tail_stall_resumes_on_append() {
        let (mut s, clock) = scheduler(&[]);
        s.play();
        assert_eq!(s.state(), PlaybackState::Playing);
        tick(&mut s, &clock, 100);
        add(&mut s, &["a"]);
        tick(&mut s, &clock, 100);
        assert_eq!(executed(&s), ["a"]);
        tick(&mut s, &clock, 100);
        tick(&mut s, &clock, 100);
        add(&mut s, &["b"]);
        assert_eq!(executed(&s), ["a"]);
        tick(&mut s, &clock, 100);
        assert_eq!(executed(&s), ["a", "b"]);
    }

    #[test]
    fn test_unregistered_action_fails_fast() {
        let (mut s, _clock) = scheduler(&[]);
        add(&mut s, &["a"]);
        let err = s.schedule_next_step("b", "explode", json!(null)).unwrap_err();
        assert!(matches!(err, SchedulerError::UnregisteredAction { .. }));
        assert_eq!(s.len(), 1);
        assert!(!s.steps()[0].has_successor(Direction::Forward));
    }

    #[test]
    fn test_duplicate_ids_resolve_to_first() {
        let (mut s, _clock) = scheduler(&[]);
        s.schedule_next_step("f", "display", json!(1)).unwrap();
        s.schedule_next_step("f", "display", json!(2)).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.position("f"), Some(0));
        s.goto("f").unwrap();
        assert_eq!(s.visualizer().payloads, [json!(1)]);
    }

    #[test]
    fn test_report_backlog_is_bounded() {
        let clock = ManualClock::new();
        let config = SchedulerConfig { report_backlog: 2, ..SchedulerConfig::with_delay(Duration::from_millis(100)) };
        let mut s = Scheduler::with_clock(Probe::default(), config, clock);
        add(&mut s, &["a", "b", "c"]);
        s.step(false);
        s.step(false);
        s.step(false);
        let ids: Vec<_> = s.take_reports().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["b", "c"]);
    }

    #[test]
    fn test_report_sink_sees_every_execution() {
        let clock = ManualClock::new();
        let config = SchedulerConfig { report_backlog: 0, ..SchedulerConfig::with_delay(Duration::from_millis(100)) };
        let mut s = Scheduler::with_clock(Probe::default(), config, clock);
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        s.on_report(move |report| sink.lock().push(report.id.clone()));
        add(&mut s, &["a", "b", "c"]);
        s.step(false);
        s.step(false);
        s.step(false);
        assert_eq!(*seen.lock(), ["a", "b", "c"]);
        assert!(s.take_reports().is_empty());
    }

    #[test]
    fn test_completion_while_paused_runs_parked_step_without_rearming() {
        let (mut s, clock) = scheduler(&["b"]);
        add(&mut s, &["a", "b", "c"]);
        s.play();
        tick(&mut s, &clock, 100);
        assert_eq!(executed(&s), ["a"]);
        s.pause();
        release(&mut s, "b");
        assert_eq!(executed(&s), ["a", "b"]);
        assert_eq!(s.next_deadline(), None);
        assert_eq!(s.state(), PlaybackState::Paused);
        tick(&mut s, &clock, 500);
        assert_eq!(executed(&s), ["a", "b"]);
        s.play();
        assert_eq!(executed(&s), ["a", "b", "c"]);
    }

    #[test]
    fn test_goto_while_stalled_rearms_after_target() {
        let (mut s, clock) = scheduler(&["b"]);
        add(&mut s, &["a", "b", "c", "d"]);
        s.play();
        tick(&mut s, &clock, 100);
        assert_eq!(s.next_deadline(), None);
        s.goto("c").unwrap();
        assert_eq!(executed(&s), ["a", "c"]);
        assert_eq!(s.next_deadline().unwrap() - clock.now(), Duration::from_millis(100));
        tick(&mut s, &clock, 100);
        assert_eq!(executed(&s), ["a", "c", "d"]);
        // The request parked on `b` was dropped by the jump.
        release(&mut s, "b");
        assert_eq!(executed(&s), ["a", "c", "d"]);
    }
}
