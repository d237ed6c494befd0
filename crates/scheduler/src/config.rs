use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay between two consecutive executions, in milliseconds.
    pub delay_ms: u64,
    /// Floor applied by `speed_up`.
    pub min_delay_ms: u64,
    /// Ceiling applied by `speed_down`.
    pub max_delay_ms: u64,
    /// Execution reports kept until drained with `take_reports`. Zero keeps none;
    /// a sink installed with `Scheduler::on_report` still sees every report.
    pub report_backlog: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { delay_ms: 1000, min_delay_ms: 1, max_delay_ms: 60_000, report_backlog: 256 }
    }
}

impl SchedulerConfig {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay_ms: delay.as_millis() as u64, ..Self::default() }
    }

    pub fn delay(&self) -> Duration { Duration::from_millis(self.delay_ms) }

    /// Bounds a delay to the configured range, never below one millisecond.
    pub(crate) fn clamp(&self, delay: Duration) -> Duration {
        let lo = Duration::from_millis(self.min_delay_ms.min(self.max_delay_ms).max(1));
        let hi = Duration::from_millis(self.min_delay_ms.max(self.max_delay_ms).max(1));
        delay.clamp(lo, hi)
    }
}
