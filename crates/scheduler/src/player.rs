use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::clock::TokioClock;
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::scheduler::Scheduler;
use crate::step::{StepId, StepReport};
use crate::visualizer::{Ready, Visualizer};

#[derive(Debug, Clone)]
pub enum PlayerCmd {
    Schedule { id: StepId, action: String, data: Value },
    Play,
    Pause,
    Step { reverse: bool },
    Reverse,
    Goto(StepId),
    Reset,
    SpeedUp,
    SpeedDown,
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Executed(StepReport),
    DelayChanged(Duration),
    ReverseLock(bool),
    Rejected(SchedulerError),
    Stopped,
}

#[derive(Clone)]
pub struct PlayerHandle { tx: UnboundedSender<PlayerCmd> }

impl PlayerHandle {
    pub fn send(&self, cmd: PlayerCmd) { let _ = self.tx.send(cmd); }
    pub fn schedule(&self, id: impl Into<StepId>, action: impl Into<String>, data: Value) {
        self.send(PlayerCmd::Schedule { id: id.into(), action: action.into(), data });
    }
    pub fn play(&self) { self.send(PlayerCmd::Play); }
    pub fn pause(&self) { self.send(PlayerCmd::Pause); }
    pub fn step(&self, reverse: bool) { self.send(PlayerCmd::Step { reverse }); }
    pub fn reverse(&self) { self.send(PlayerCmd::Reverse); }
    pub fn goto(&self, id: impl Into<StepId>) { self.send(PlayerCmd::Goto(id.into())); }
    pub fn reset(&self) { self.send(PlayerCmd::Reset); }
    pub fn speed_up(&self) { self.send(PlayerCmd::SpeedUp); }
    pub fn speed_down(&self) { self.send(PlayerCmd::SpeedDown); }
    pub fn stop(&self) { self.send(PlayerCmd::Stop); }
    pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

pub struct PlayerRuntime<V> {
    pub handle: PlayerHandle,
    pub rx_events: UnboundedReceiver<PlayerEvent>,
    /// Resolves to the visualizer once the player stops.
    pub task: JoinHandle<V>,
}

/// Spawns a tokio task that owns a scheduler and drives its timer and completions.
///
/// Must be called from within a tokio runtime.
pub fn spawn_player<V>(visualizer: V, config: SchedulerConfig) -> PlayerRuntime<V>
where
    V: Visualizer + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let (ev_tx, rx_events) = mpsc::unbounded_channel();
    let mut scheduler = Scheduler::with_clock(visualizer, config, TokioClock);
    let reports = ev_tx.clone();
    scheduler.on_report(move |report| {
        let _ = reports.send(PlayerEvent::Executed(report.clone()));
    });
    let task = tokio::spawn(run(scheduler, rx, ev_tx));
    PlayerRuntime { handle: PlayerHandle { tx }, rx_events, task }
}

enum Wake {
    Cmd(Option<PlayerCmd>),
    Ready(Ready),
    Timer,
}

async fn run<V: Visualizer>(
    mut scheduler: Scheduler<V, TokioClock>,
    mut rx: UnboundedReceiver<PlayerCmd>,
    events: UnboundedSender<PlayerEvent>,
) -> V {
    tracing::debug!("player started");
    loop {
        let deadline = scheduler.next_deadline().map(Instant::from_std);
        let far = Instant::now() + Duration::from_secs(86_400);
        let wake = tokio::select! {
            cmd = rx.recv() => Wake::Cmd(cmd),
            Some(ready) = scheduler.next_ready() => Wake::Ready(ready),
            _ = sleep_until(deadline.unwrap_or(far)), if deadline.is_some() => Wake::Timer,
        };
        match wake {
            Wake::Cmd(None) | Wake::Cmd(Some(PlayerCmd::Stop)) => break,
            Wake::Cmd(Some(cmd)) => apply(&mut scheduler, cmd, &events),
            Wake::Ready(ready) => scheduler.on_prepared(ready),
            Wake::Timer => scheduler.poll(),
        }
    }
    scheduler.pause();
    let _ = events.send(PlayerEvent::Stopped);
    tracing::debug!(steps = scheduler.len(), "player stopped");
    scheduler.into_visualizer()
}

fn apply<V: Visualizer>(scheduler: &mut Scheduler<V, TokioClock>, cmd: PlayerCmd, events: &UnboundedSender<PlayerEvent>) {
    match cmd {
        PlayerCmd::Schedule { id, action, data } => {
            if let Err(e) = scheduler.schedule_next_step(id, action, data) {
                tracing::error!(error = %e, "step rejected");
                let _ = events.send(PlayerEvent::Rejected(e));
            }
        }
        PlayerCmd::Play => scheduler.play(),
        PlayerCmd::Pause => scheduler.pause(),
        PlayerCmd::Step { reverse } => scheduler.step(reverse),
        PlayerCmd::Reverse => {
            let locked = scheduler.reverse();
            let _ = events.send(PlayerEvent::ReverseLock(locked));
        }
        PlayerCmd::Goto(id) => {
            if let Err(e) = scheduler.goto(&id) {
                let _ = events.send(PlayerEvent::Rejected(e));
            }
        }
        PlayerCmd::Reset => scheduler.reset(),
        PlayerCmd::SpeedUp => { let _ = events.send(PlayerEvent::DelayChanged(scheduler.speed_up())); }
        PlayerCmd::SpeedDown => { let _ = events.send(PlayerEvent::DelayChanged(scheduler.speed_down())); }
        PlayerCmd::Stop => {}
    }
}
