use serde::{Deserialize, Serialize};

use crate::domain::call::{CallId, ToolCallState, ToolCallStatus};

pub const AWAITING_CONFIRMATION: &str = "Awaiting user confirmation.";
pub const IN_PROGRESS: &str = "Tool call in progress.";

/// One result line fed back to the model on its next turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultMessage {
    pub call_id: CallId,
    pub tool_name: String,
    pub status: ToolCallStatus,
    pub content: String,
    pub is_error: bool,
}

impl ToolResultMessage {
    pub fn from_state(state: &ToolCallState) -> Self {
        let (content, is_error) = match &state.outcome {
            Some(outcome) if state.status.is_terminal() => (outcome.render(), outcome.is_error()),
            _ if state.status == ToolCallStatus::PendingConfirm => {
                (AWAITING_CONFIRMATION.to_string(), false)
            }
            _ => (IN_PROGRESS.to_string(), false),
        };

        Self {
            call_id: state.call_id.clone(),
            tool_name: state.tool_name.clone(),
            status: state.status,
            content,
            is_error,
        }
    }
}

/// Messages for `states`, in the order given.
pub fn assemble(states: &[ToolCallState]) -> Vec<ToolResultMessage> {
    states.iter().map(ToolResultMessage::from_state).collect()
}
