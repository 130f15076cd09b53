use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use switchyard_core::config::SchedulerSettings;

use crate::runtime::AgentRuntime;

/// Drives [`AgentRuntime::tick`] on a fixed interval until shut down.
pub struct SchedulerTicker {
    runtime: AgentRuntime,
    interval: Duration,
}

pub struct TickerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl TickerHandle {
    /// Signals shutdown and waits for the loop to exit. Returns the number of
    /// ticks that ran, or 0 when the loop task panicked or was aborted.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(ticks) => ticks,
            Err(join_error) => {
                error!(
                    event_name = "agent.ticker.task_aborted",
                    panicked = join_error.is_panic(),
                    error = %join_error,
                    "scheduler ticker task did not finish cleanly"
                );
                0
            }
        }
    }
}

impl SchedulerTicker {
    pub fn new(runtime: AgentRuntime, interval: Duration) -> Self {
        Self { runtime, interval: interval.max(Duration::from_millis(1)) }
    }

    pub fn from_settings(runtime: AgentRuntime, settings: &SchedulerSettings) -> Self {
        Self::new(runtime, Duration::from_secs(settings.tick_interval_secs))
    }

    pub fn spawn(self) -> TickerHandle {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(self.run(receiver));
        TickerHandle { shutdown, task }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0_u64;

        info!(
            event_name = "agent.ticker.started",
            interval_ms = self.interval.as_millis() as u64,
            "scheduler ticker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = timer.tick() => {
                    ticks += 1;
                    let now = self.runtime.now();
                    match self.runtime.tick(now).await {
                        Ok(summary) => debug!(
                            event_name = "agent.ticker.tick",
                            tick = ticks,
                            fired = summary.fired,
                            "ticker pass finished"
                        ),
                        Err(error) => warn!(
                            event_name = "agent.ticker.tick_failed",
                            tick = ticks,
                            error_class = error.error_class(),
                            error = %error,
                            "ticker pass failed; continuing"
                        ),
                    }
                }
            }
        }

        info!(event_name = "agent.ticker.stopped", ticks, "scheduler ticker stopped");
        ticks
    }
}
