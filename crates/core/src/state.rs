//! Per-conversation state snapshot.
//!
//! One `ConversationState` is the unit that is loaded, mutated by the
//! orchestrator while its conversation is locked, and saved back whole.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::call::{CallId, CallTransition, ToolCallState, ToolCallStatus};
use crate::domain::conversation::{ConversationId, ConversationMemory};
use crate::records::RecordBook;
use crate::scheduling::ScheduleBook;

/// Every call ever dispatched in a conversation, keyed by call id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallLedger {
    calls: BTreeMap<CallId, ToolCallState>,
    next_sequence: u64,
}

impl CallLedger {
    pub fn from_states(states: Vec<ToolCallState>) -> Self {
        let next_sequence = states.iter().map(|state| state.sequence + 1).max().unwrap_or(0);
        let calls = states.into_iter().map(|state| (state.call_id.clone(), state)).collect();
        Self { calls, next_sequence }
    }

    pub fn get(&self, call_id: &CallId) -> Option<&ToolCallState> {
        self.calls.get(call_id)
    }

    pub fn contains(&self, call_id: &CallId) -> bool {
        self.calls.contains_key(call_id)
    }

    /// Sequence number the next new call will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Inserts or replaces the state for its call id.
    pub fn record(&mut self, state: ToolCallState) {
        self.next_sequence = self.next_sequence.max(state.sequence + 1);
        self.calls.insert(state.call_id.clone(), state);
    }

    /// All calls in dispatch order.
    pub fn in_order(&self) -> Vec<ToolCallState> {
        let mut states: Vec<ToolCallState> = self.calls.values().cloned().collect();
        states.sort_by_key(|state| state.sequence);
        states
    }

    pub fn with_status(&self, status: ToolCallStatus) -> Vec<ToolCallState> {
        self.in_order().into_iter().filter(|state| state.status == status).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: ConversationId,
    pub memory: ConversationMemory,
    pub records: RecordBook,
    pub schedules: ScheduleBook,
    pub calls: CallLedger,
    pub transitions: Vec<CallTransition>,
    /// Optimistic concurrency token; 0 until first saved.
    pub state_version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(conversation_id: ConversationId, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id,
            memory: ConversationMemory::default(),
            records: RecordBook::default(),
            schedules: ScheduleBook::default(),
            calls: CallLedger::default(),
            transitions: Vec::new(),
            state_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn call(&self, call_id: &CallId) -> Option<&ToolCallState> {
        self.calls.get(call_id)
    }

    /// Stores `state` and appends the transition that produced it.
    pub fn apply(&mut self, state: ToolCallState, transition: CallTransition) {
        self.updated_at = self.updated_at.max(transition.occurred_at);
        self.calls.record(state);
        self.transitions.push(transition);
    }

    pub fn transitions_for(&self, call_id: &CallId) -> Vec<&CallTransition> {
        self.transitions.iter().filter(|transition| &transition.call_id == call_id).collect()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::Map;

    use super::{CallLedger, ConversationState};
    use crate::domain::call::{CallId, CallOrigin, ToolCallState, ToolCallStatus};
    use crate::domain::conversation::ConversationId;

    fn call(id: &str, sequence: u64) -> ToolCallState {
        ToolCallState {
            call_id: CallId::from(id),
            tool_name: "echo".to_string(),
            arguments: Map::new(),
            arguments_hash: String::new(),
            origin: CallOrigin::Model { turn: 1 },
            status: ToolCallStatus::PendingConfirm,
            outcome: None,
            sequence,
            state_version: 1,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid time"),
            resolved_at: None,
        }
    }

    #[test]
    fn ledger_lists_calls_in_dispatch_order() {
        // Ids sort differently from their dispatch order.
        let ledger = CallLedger::from_states(vec![call("zeta", 0), call("alpha", 2), call("mid", 1)]);

        let ids: Vec<String> = ledger.in_order().into_iter().map(|state| state.call_id.0).collect();
        assert_eq!(ids, vec!["zeta", "mid", "alpha"]);
        assert_eq!(ledger.next_sequence(), 3);
    }

    #[test]
    fn new_state_starts_unsaved_and_empty() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid time");
        let state = ConversationState::new(ConversationId::from("conv-1"), now);

        assert_eq!(state.state_version, 0);
        assert!(state.calls.is_empty());
        assert!(state.memory.is_empty());
        assert!(state.schedules.is_empty());
    }
}
