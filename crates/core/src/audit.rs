use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::call::{CallId, CallTransition, ToolCallStatus};
use crate::domain::conversation::ConversationId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Dispatch,
    Confirmation,
    Execution,
    Scheduling,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
    Pending,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub conversation_id: ConversationId,
    pub call_id: Option<CallId>,
    pub event_type: String,
    pub category: AuditCategory,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        conversation_id: ConversationId,
        call_id: Option<CallId>,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            conversation_id,
            call_id,
            event_type: event_type.into(),
            category,
            outcome,
            metadata: BTreeMap::new(),
            occurred_at,
        }
    }

    /// Mirrors a call state transition.
    pub fn for_transition(conversation_id: &ConversationId, transition: &CallTransition) -> Self {
        let (category, outcome) = match transition.to_status {
            ToolCallStatus::PendingAuto => (AuditCategory::Dispatch, AuditOutcome::Pending),
            ToolCallStatus::PendingConfirm => (AuditCategory::Confirmation, AuditOutcome::Pending),
            ToolCallStatus::Approved => (AuditCategory::Confirmation, AuditOutcome::Success),
            ToolCallStatus::Rejected => (AuditCategory::Confirmation, AuditOutcome::Rejected),
            ToolCallStatus::Completed => (AuditCategory::Execution, AuditOutcome::Success),
            ToolCallStatus::Failed => (AuditCategory::Execution, AuditOutcome::Failed),
        };
        let event = Self::new(
            conversation_id.clone(),
            Some(transition.call_id.clone()),
            format!("call.{}", transition.to_status.as_str()),
            category,
            outcome,
            transition.occurred_at,
        )
        .with_metadata("to", transition.to_status.as_str())
        .with_metadata("reason", transition.reason.clone());

        match transition.from_status {
            Some(from) => event.with_metadata("from", from.as_str()),
            None => event,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::{
        audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink},
        domain::call::{CallId, CallTransition, ToolCallStatus},
        domain::conversation::ConversationId,
    };

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        let occurred_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid time");
        sink.emit(AuditEvent::for_transition(
            &ConversationId::from("conv-1"),
            &CallTransition {
                call_id: CallId::from("call-7"),
                from_status: Some(ToolCallStatus::PendingConfirm),
                to_status: ToolCallStatus::Rejected,
                reason: "user rejected".to_string(),
                occurred_at,
            },
        ));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].conversation_id.0, "conv-1");
        assert_eq!(events[0].call_id.as_ref().map(|id| id.0.as_str()), Some("call-7"));
        assert_eq!(events[0].event_type, "call.rejected");
        assert_eq!(events[0].category, AuditCategory::Confirmation);
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
        assert_eq!(events[0].metadata.get("from").map(String::as_str), Some("pending_confirm"));
    }
}
