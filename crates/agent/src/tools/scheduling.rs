use async_trait::async_trait;
use serde_json::{json, Map, Value};

use switchyard_core::{
    Constraint, FieldKind, FieldSpec, ParameterSchema, RegistryError, ScheduleEntry, ScheduleId,
    ScheduleRequest, ToolContext, ToolDefinition, ToolError, ToolHandler, ToolRegistry,
};

use super::required_str;

pub fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        ToolDefinition::auto(
            "schedule_task",
            "Run a tool later: at a fixed time, after a delay, or on a cron schedule.",
        )
        .with_parameters(
            ParameterSchema::empty()
                .field(
                    FieldSpec::required("kind", FieldKind::String).constrain(Constraint::OneOf {
                        values: vec!["absolute".into(), "delayed".into(), "cron".into()],
                    }),
                )
                .field(
                    FieldSpec::optional("isoTimestamp", FieldKind::String)
                        .describe("Fire instant for `absolute` (RFC 3339)."),
                )
                .field(
                    FieldSpec::optional("delaySeconds", FieldKind::Integer)
                        .describe("Seconds from now for `delayed`."),
                )
                .field(
                    FieldSpec::optional("cronExpression", FieldKind::String)
                        .describe("Five-field cron expression in UTC for `cron`."),
                )
                .field(
                    FieldSpec::required("toolName", FieldKind::String)
                        .describe("Tool to invoke when the entry fires."),
                )
                .field(
                    FieldSpec::optional("arguments", FieldKind::Object)
                        .describe("Arguments passed to the tool."),
                ),
        ),
        ScheduleTask,
    )?;
    registry.register(
        ToolDefinition::auto("list_schedules", "List active scheduled tasks in firing order."),
        ListSchedules,
    )?;
    registry.register(
        ToolDefinition::auto("cancel_schedule", "Cancel an active scheduled task.").with_parameters(
            ParameterSchema::empty().field(FieldSpec::required("scheduleId", FieldKind::String)),
        ),
        CancelSchedule,
    )?;
    Ok(())
}

pub fn entry_json(entry: &ScheduleEntry) -> Value {
    json!({
        "scheduleId": entry.id.0,
        "kind": entry.kind().as_str(),
        "spec": entry.spec.to_string(),
        "toolName": entry.payload.tool_name,
        "arguments": entry.payload.arguments,
        "nextFireAt": entry.next_fire_at.to_rfc3339(),
        "active": entry.active,
        "fireCount": entry.fire_count,
    })
}

pub struct ScheduleTask;

#[async_trait]
impl ToolHandler for ScheduleTask {
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let request: ScheduleRequest = serde_json::from_value(Value::Object(arguments))
            .map_err(|error| ToolError::Invalid(format!("malformed schedule request: {error}")))?;
        let entry = ctx.schedule(request)?;
        Ok(entry_json(&entry))
    }
}

pub struct ListSchedules;

#[async_trait]
impl ToolHandler for ListSchedules {
    async fn execute(
        &self,
        _arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let entries: Vec<Value> = ctx.active_schedules().iter().map(entry_json).collect();
        Ok(json!({"schedules": entries}))
    }
}

pub struct CancelSchedule;

#[async_trait]
impl ToolHandler for CancelSchedule {
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let schedule_id = ScheduleId(required_str(&arguments, "scheduleId")?.to_string());
        let cancelled = ctx.cancel_schedule(&schedule_id)?;
        Ok(entry_json(&cancelled))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Map, Value};

    use switchyard_core::{
        CallOutcome, ConversationId, ConversationState, Orchestrator, ToolCallRequest,
        ToolCallStatus, ToolRegistry,
    };

    use crate::tools::{echo, memory};

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn orchestrator() -> Orchestrator {
        let mut registry = ToolRegistry::new();
        super::register(&mut registry).expect("register scheduling tools");
        memory::register(&mut registry).expect("register memory tools");
        echo::register(&mut registry).expect("register echo");
        Orchestrator::new(Arc::new(registry))
    }

    fn failure_class(outcome: &Option<CallOutcome>) -> Option<&str> {
        match outcome {
            Some(CallOutcome::Failed { error_class, .. }) => Some(error_class.as_str()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn model_schedules_lists_and_cancels() {
        let orchestrator = orchestrator();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid time");
        let mut state = ConversationState::new(ConversationId("conv-sched".into()), now);

        let scheduled = orchestrator
            .dispatch(
                &mut state,
                vec![
                    ToolCallRequest::new(
                        "c1",
                        "schedule_task",
                        args(json!({
                            "kind": "delayed",
                            "delaySeconds": 60,
                            "toolName": "remember",
                            "arguments": {"key": "pinged", "value": "yes"}
                        })),
                        1,
                    ),
                    ToolCallRequest::new("c2", "list_schedules", Map::new(), 1),
                ],
                now,
            )
            .await;

        let entry = match &scheduled[0].outcome {
            Some(CallOutcome::Completed { content }) => content.clone(),
            other => panic!("schedule_task should complete, got {other:?}"),
        };
        assert_eq!(entry["nextFireAt"], json!((now + Duration::seconds(60)).to_rfc3339()));
        match &scheduled[1].outcome {
            Some(CallOutcome::Completed { content }) => {
                assert_eq!(content["schedules"].as_array().map(Vec::len), Some(1));
            }
            other => panic!("list_schedules should complete, got {other:?}"),
        }

        let cancelled = orchestrator
            .dispatch(
                &mut state,
                vec![
                    ToolCallRequest::new("c3", "cancel_schedule", args(json!({"scheduleId": entry["scheduleId"]})), 2),
                    ToolCallRequest::new("c4", "cancel_schedule", args(json!({"scheduleId": entry["scheduleId"]})), 2),
                ],
                now,
            )
            .await;

        assert_eq!(cancelled[0].status, ToolCallStatus::Completed);
        assert_eq!(failure_class(&cancelled[1].outcome), Some("not_found"));
        assert!(state.schedules.is_empty());
    }

    #[tokio::test]
    async fn invalid_requests_fail_with_stable_classes() {
        let orchestrator = orchestrator();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid time");
        let mut state = ConversationState::new(ConversationId("conv-sched".into()), now);

        let results = orchestrator
            .dispatch(
                &mut state,
                vec![
                    ToolCallRequest::new(
                        "c1",
                        "schedule_task",
                        args(json!({"kind": "cron", "cronExpression": "61 * * * *", "toolName": "echo"})),
                        1,
                    ),
                    ToolCallRequest::new(
                        "c2",
                        "schedule_task",
                        args(json!({"kind": "delayed", "delaySeconds": 5, "toolName": "launch_rocket"})),
                        1,
                    ),
                    ToolCallRequest::new(
                        "c3",
                        "schedule_task",
                        args(json!({"kind": "weekly", "toolName": "echo"})),
                        1,
                    ),
                ],
                now,
            )
            .await;

        assert_eq!(failure_class(&results[0].outcome), Some("invalid_schedule"));
        assert_eq!(failure_class(&results[1].outcome), Some("unknown_tool"));
        assert_eq!(failure_class(&results[2].outcome), Some("validation"));
        assert!(state.schedules.is_empty());
    }
}
