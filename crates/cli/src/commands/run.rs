use anyhow::Context;
use switchyard_agent::{Application, SchedulerTicker};
use switchyard_core::config::LoadOptions;
use tracing::info;

use crate::commands::{with_application, CommandResult};

/// Runs the scheduler loop until Ctrl-C.
pub fn run(options: &LoadOptions) -> CommandResult {
    with_application("run", options, |app| async move {
        if !app.config.scheduler.enabled {
            return CommandResult::failure(
                "run",
                "config_validation",
                "scheduler.enabled is false; nothing to run",
                2,
            );
        }

        match serve(app).await {
            Ok(ticks) => {
                CommandResult::success("run", format!("scheduler stopped after {ticks} tick(s)"))
            }
            Err(error) => CommandResult::failure("run", "runtime", format!("{error:#}"), 3),
        }
    })
}

async fn serve(app: Application) -> anyhow::Result<u64> {
    let handle = SchedulerTicker::from_settings(app.runtime.clone(), &app.config.scheduler).spawn();
    info!(
        event_name = "system.cli.run_started",
        correlation_id = "run",
        tick_interval_secs = app.config.scheduler.tick_interval_secs,
        "scheduler running; press Ctrl-C to stop"
    );

    let signal = tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal");
    let ticks = handle.stop().await;
    signal?;

    info!(event_name = "system.cli.run_stopped", correlation_id = "run", ticks, "scheduler stopped");
    Ok(ticks)
}
