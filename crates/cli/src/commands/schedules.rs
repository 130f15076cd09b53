use serde_json::json;
use switchyard_agent::tools::scheduling::entry_json;
use switchyard_core::config::LoadOptions;
use switchyard_core::{ConversationId, ScheduleId};

use crate::commands::{with_application, CommandResult};

pub fn list(options: &LoadOptions, conversation_id: &str) -> CommandResult {
    let conversation_id = ConversationId::from(conversation_id);

    with_application("schedules", options, |app| async move {
        match app.runtime.schedules(&conversation_id).await {
            Ok(entries) => {
                let rendered: Vec<_> = entries.iter().map(entry_json).collect();
                CommandResult::success_with_data(
                    "schedules",
                    format!("{} active schedule(s)", rendered.len()),
                    Some(json!(rendered)),
                )
            }
            Err(error) => CommandResult::from_runtime_error("schedules", &error),
        }
    })
}

pub fn cancel(options: &LoadOptions, conversation_id: &str, schedule_id: &str) -> CommandResult {
    let conversation_id = ConversationId::from(conversation_id);
    let schedule_id = ScheduleId(schedule_id.to_string());

    with_application("cancel", options, |app| async move {
        match app.runtime.cancel_schedule(&conversation_id, &schedule_id).await {
            Ok(entry) => CommandResult::success_with_data(
                "cancel",
                format!("cancelled schedule {}", entry.id),
                Some(entry_json(&entry)),
            ),
            Err(error) => CommandResult::from_runtime_error("cancel", &error),
        }
    })
}
