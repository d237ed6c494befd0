//! Deterministic playback of asynchronously prepared steps.
//!
//! Steps arrive in production order, start preparing immediately, and are executed one
//! after another at a fixed delay by a [`Scheduler`], whatever order their preparations
//! complete in. [`spawn_player`] runs a scheduler on a tokio task.

pub mod clock;
pub mod config;
pub mod error;
pub mod player;
pub mod scheduler;
pub mod step;
pub mod visualizer;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use player::{spawn_player, PlayerCmd, PlayerEvent, PlayerHandle, PlayerRuntime};
pub use scheduler::{PlaybackState, Scheduler};
pub use step::{Direction, Step, StepId, StepPhase, StepReport};
pub use visualizer::{ActionTable, PrepareDone, Ready, Visualizer};
