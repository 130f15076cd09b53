use chrono::{DateTime, Utc};
use switchyard_core::config::LoadOptions;

use crate::commands::{to_data, with_application, CommandResult};

/// Fires everything due at `at` (or now) once and reports what happened.
pub fn run(options: &LoadOptions, at: Option<DateTime<Utc>>) -> CommandResult {
    with_application("tick", options, |app| async move {
        let now = at.unwrap_or_else(|| app.runtime.now());
        match app.runtime.tick(now).await {
            Ok(summary) => CommandResult::success_with_data(
                "tick",
                format!(
                    "fired {} call(s) across {} conversation(s) at {}",
                    summary.fired,
                    summary.conversations,
                    now.to_rfc3339()
                ),
                to_data(&summary),
            ),
            Err(error) => CommandResult::from_runtime_error("tick", &error),
        }
    })
}
