//! Tick-based timers on the tokio runtime.

use crate::config::SchedulerConfig;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Game ticks per second at the default tick length.
pub const TICKS_PER_SECOND: u64 = 20;

/// Spawns repeating timers measured in game ticks.
#[derive(Debug, Clone)]
pub struct Scheduler {
    handle: Handle,
    tick: Duration,
}

impl Scheduler {
    pub fn new(handle: Handle, config: &SchedulerConfig) -> Self {
        Self {
            handle,
            tick: Duration::from_millis(config.tick_interval_ms.max(1)),
        }
    }

    /// Uses the runtime the caller is running on. Panics outside a runtime.
    pub fn current(config: &SchedulerConfig) -> Self {
        Self::new(Handle::current(), config)
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Wall-clock length of `ticks` game ticks.
    pub fn ticks(&self, ticks: u64) -> Duration {
        self.tick.saturating_mul(ticks.min(u32::MAX as u64) as u32)
    }

    /// Runs `task` after `delay_ticks`, then every `period_ticks`, until it
    /// returns `false` or the returned handle is cancelled or dropped.
    pub fn run_repeating<F>(&self, delay_ticks: u64, period_ticks: u64, mut task: F) -> ScheduledTask
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let delay = self.ticks(delay_ticks);
        let period = self.ticks(period_ticks.max(1));

        let handle = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !task() {
                    break;
                }
            }
        });

        ScheduledTask { handle }
    }
}

/// Handle to a repeating timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// True once the timer stopped itself or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
