use serde_json::json;
use switchyard_core::config::LoadOptions;
use switchyard_core::{CallId, ConversationId, Decision};

use crate::commands::{to_data, with_application, CommandResult};

/// Applies a human decision to a call waiting for confirmation.
pub fn run(
    options: &LoadOptions,
    conversation_id: &str,
    call_id: &str,
    decision: Decision,
) -> CommandResult {
    let conversation_id = ConversationId::from(conversation_id);
    let call_id = CallId::from(call_id);

    with_application("resolve", options, |app| async move {
        match app.runtime.resolve(&conversation_id, &call_id, decision).await {
            Ok(call) => CommandResult::success_with_data(
                "resolve",
                format!("call {} is now {}", call.call_id.0, call.status.as_str()),
                to_data(&call),
            ),
            Err(error) => CommandResult::from_runtime_error("resolve", &error),
        }
    })
}

/// Lists calls still waiting for a human decision, oldest first.
pub fn pending(options: &LoadOptions, conversation_id: &str) -> CommandResult {
    let conversation_id = ConversationId::from(conversation_id);

    with_application("pending", options, |app| async move {
        match app.runtime.pending_confirmations(&conversation_id).await {
            Ok(calls) => {
                let summary: Vec<_> = calls
                    .iter()
                    .map(|call| {
                        json!({
                            "callId": call.call_id.0,
                            "toolName": call.tool_name,
                            "arguments": call.arguments,
                            "createdAt": call.created_at.to_rfc3339(),
                        })
                    })
                    .collect();
                CommandResult::success_with_data(
                    "pending",
                    format!("{} call(s) awaiting confirmation", summary.len()),
                    Some(json!(summary)),
                )
            }
            Err(error) => CommandResult::from_runtime_error("pending", &error),
        }
    })
}
