use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::schedule::ScheduleId;

/// Deterministic result attached to every rejected call.
pub const REJECTION_MARKER: &str = "Tool call rejected by user; no action was taken.";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A call emitted by the model in one turn. Consumed once by the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: CallId,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub origin_turn: u64,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Map<String, Value>,
        origin_turn: u64,
    ) -> Self {
        Self { call_id: CallId(call_id.into()), tool_name: tool_name.into(), arguments, origin_turn }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    PendingAuto,
    PendingConfirm,
    Approved,
    Rejected,
    Completed,
    Failed,
}

impl ToolCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingAuto => "pending_auto",
            Self::PendingConfirm => "pending_confirm",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_auto" => Some(Self::PendingAuto),
            "pending_confirm" => Some(Self::PendingConfirm),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Failed)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingAuto | Self::PendingConfirm)
    }
}

impl fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The human decision carried by `resolve`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" | "yes" => Some(Self::Approve),
            "reject" | "rejected" | "no" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Where a call came from. Scheduled calls skip confirmation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallOrigin {
    Model { turn: u64 },
    Schedule { schedule_id: ScheduleId },
}

impl CallOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model { .. } => "model",
            Self::Schedule { .. } => "schedule",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallOutcome {
    Completed { content: Value },
    Failed { error_class: String, message: String },
    Rejected { marker: String },
}

impl CallOutcome {
    pub fn rejected() -> Self {
        Self::Rejected { marker: REJECTION_MARKER.to_string() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Human-readable rendering used for transcript messages.
    pub fn render(&self) -> String {
        match self {
            Self::Completed { content: Value::String(text) } => text.clone(),
            Self::Completed { content } => content.to_string(),
            Self::Failed { error_class, message } => format!("error[{error_class}]: {message}"),
            Self::Rejected { marker } => marker.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallState {
    pub call_id: CallId,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub arguments_hash: String,
    pub origin: CallOrigin,
    pub status: ToolCallStatus,
    pub outcome: Option<CallOutcome>,
    /// Position in the conversation's call ledger.
    pub sequence: u64,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ToolCallState {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTransition {
    pub call_id: CallId,
    pub from_status: Option<ToolCallStatus>,
    pub to_status: ToolCallStatus,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CallOutcome, Decision, ToolCallStatus, REJECTION_MARKER};

    #[test]
    fn tool_call_status_round_trips_from_storage_encoding() {
        let cases = [
            ToolCallStatus::PendingAuto,
            ToolCallStatus::PendingConfirm,
            ToolCallStatus::Approved,
            ToolCallStatus::Rejected,
            ToolCallStatus::Completed,
            ToolCallStatus::Failed,
        ];

        for status in cases {
            assert_eq!(ToolCallStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn decision_accepts_two_valued_tokens() {
        assert_eq!(Decision::parse("APPROVE"), Some(Decision::Approve));
        assert_eq!(Decision::parse("reject"), Some(Decision::Reject));
        assert_eq!(Decision::parse("later"), None);
    }

    #[test]
    fn outcome_rendering_is_human_readable() {
        assert_eq!(CallOutcome::Completed { content: json!("done") }.render(), "done");
        assert_eq!(CallOutcome::Completed { content: json!({"id": 1}) }.render(), "{\"id\":1}");
        assert_eq!(
            CallOutcome::Failed { error_class: "validation".into(), message: "bad".into() }
                .render(),
            "error[validation]: bad"
        );
        assert_eq!(CallOutcome::rejected().render(), REJECTION_MARKER);
    }
}
