//! Canonical conversation snapshot used to exercise storage backends.
//!
//! The snapshot touches every persisted shape: memory entries, records, one
//! schedule entry per fire kind, calls in every status and both origins, and
//! the transitions that produced them.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};

use switchyard_core::domain::schedule::SchedulePayload;
use switchyard_core::{
    CallId, CallLedger, CallOrigin, CallOutcome, CallTransition, ConversationId,
    ConversationMemory, ConversationState, FireSpec, Record, RecordBook, RecordId, ScheduleBook,
    ScheduleEntry, ScheduleId, ToolCallState, ToolCallStatus,
};

pub fn seeded_conversation(conversation_id: &str, now: DateTime<Utc>) -> ConversationState {
    let mut state = ConversationState::new(ConversationId(conversation_id.to_string()), now);

    state.memory = ConversationMemory::from_entries(BTreeMap::from([
        ("currency".to_string(), "EUR".to_string()),
        ("name".to_string(), "Ada".to_string()),
    ]));

    state.records = RecordBook::from_records(vec![
        Record {
            id: RecordId("rec-1".to_string()),
            fields: object(json!({"description": "Train ticket", "amount": 42.5})),
            created_at: now,
            updated_at: now,
        },
        Record {
            id: RecordId("rec-2".to_string()),
            fields: object(json!({"description": "Lunch", "amount": 12, "category": "food"})),
            created_at: now,
            updated_at: now + Duration::minutes(5),
        },
    ]);

    state.schedules = ScheduleBook::restore(
        vec![
            schedule(
                "sched-absolute",
                0,
                FireSpec::Absolute { at: now + Duration::hours(2) },
                now + Duration::hours(2),
                now,
            ),
            schedule("sched-delayed", 2, FireSpec::Delayed { seconds: 90 }, now + Duration::seconds(90), now),
            ScheduleEntry {
                fire_count: 3,
                last_fired_at: Some(now - Duration::minutes(1)),
                ..schedule(
                    "sched-cron",
                    3,
                    FireSpec::Cron { expression: "*/5 * * * *".to_string() },
                    now + Duration::minutes(4),
                    now - Duration::hours(1),
                )
            },
        ],
        5,
    );

    let calls = vec![
        resolved(
            call("call-done", 0, CallOrigin::Model { turn: 1 }, ToolCallStatus::Completed, now),
            CallOutcome::Completed { content: json!({"id": "rec-1"}) },
            now,
        ),
        call("call-waiting", 1, CallOrigin::Model { turn: 2 }, ToolCallStatus::PendingConfirm, now),
        resolved(
            call("call-rejected", 2, CallOrigin::Model { turn: 2 }, ToolCallStatus::Rejected, now),
            CallOutcome::rejected(),
            now,
        ),
        resolved(
            call(
                "call-scheduled",
                3,
                CallOrigin::Schedule { schedule_id: ScheduleId("sched-cron".to_string()) },
                ToolCallStatus::Failed,
                now,
            ),
            CallOutcome::Failed { error_class: "execution".to_string(), message: "boom".to_string() },
            now,
        ),
        call("call-approved", 4, CallOrigin::Model { turn: 3 }, ToolCallStatus::Approved, now),
    ];

    state.transitions = vec![
        transition("call-done", None, ToolCallStatus::PendingAuto, "dispatched", now),
        transition("call-done", Some(ToolCallStatus::PendingAuto), ToolCallStatus::Completed, "executed", now),
        transition("call-waiting", None, ToolCallStatus::PendingConfirm, "dispatched", now),
    ];
    state.calls = CallLedger::from_states(calls);
    state.updated_at = now + Duration::minutes(5);
    state
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn schedule(
    id: &str,
    sequence: u64,
    spec: FireSpec,
    next_fire_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
) -> ScheduleEntry {
    ScheduleEntry {
        id: ScheduleId(id.to_string()),
        sequence,
        spec,
        payload: SchedulePayload {
            tool_name: "remember".to_string(),
            arguments: object(json!({"key": "ping", "value": id})),
        },
        next_fire_at,
        active: true,
        fire_count: 0,
        last_fired_at: None,
        created_at,
    }
}

fn call(
    id: &str,
    sequence: u64,
    origin: CallOrigin,
    status: ToolCallStatus,
    now: DateTime<Utc>,
) -> ToolCallState {
    ToolCallState {
        call_id: CallId::from(id),
        tool_name: "create_expense".to_string(),
        arguments: object(json!({"description": "Taxi", "amount": 30})),
        arguments_hash: format!("hash-{id}"),
        origin,
        status,
        outcome: None,
        sequence,
        state_version: 1,
        created_at: now,
        resolved_at: None,
    }
}

fn resolved(mut state: ToolCallState, outcome: CallOutcome, at: DateTime<Utc>) -> ToolCallState {
    state.outcome = Some(outcome);
    state.state_version = 2;
    state.resolved_at = Some(at);
    state
}

fn transition(
    call_id: &str,
    from_status: Option<ToolCallStatus>,
    to_status: ToolCallStatus,
    reason: &str,
    occurred_at: DateTime<Utc>,
) -> CallTransition {
    CallTransition {
        call_id: CallId::from(call_id),
        from_status,
        to_status,
        reason: reason.to_string(),
        occurred_at,
    }
}
