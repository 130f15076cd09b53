//! Orchestrator
//!
//! Sequences model-issued and scheduled tool calls through the confirmation
//! gate and into their bound execution functions. All mutation happens on a
//! `ConversationState` the caller has exclusive access to; the orchestrator
//! itself holds no per-conversation state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditSink, NoopAuditSink};
use crate::domain::call::{CallId, CallOrigin, Decision, ToolCallRequest, ToolCallState, ToolCallStatus};
use crate::domain::schedule::ScheduleId;
use crate::gate::{arguments_hash, ConfirmationGate, DecisionOutcome, GateError, GateTransition};
use crate::scheduling::{Scheduler, SchedulerConfig};
use crate::state::ConversationState;
use crate::tools::handler::ToolContext;
use crate::tools::registry::ToolRegistry;
use crate::transcript::{self, ToolResultMessage};

/// One schedule entry fired by a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct FiredEntry {
    pub schedule_id: ScheduleId,
    pub call: ToolCallState,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub fired: Vec<FiredEntry>,
    /// Parked cron entries that got a fresh fire time without firing.
    pub refreshed: usize,
}

impl TickReport {
    /// Whether the tick changed the conversation state.
    pub fn changed_state(&self) -> bool {
        !self.fired.is_empty() || self.refreshed > 0
    }

    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }

    pub fn failed_count(&self) -> usize {
        self.fired.iter().filter(|entry| entry.call.status == ToolCallStatus::Failed).count()
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    gate: ConfirmationGate,
    scheduler: Scheduler,
    audit: Arc<dyn AuditSink>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::with_config(registry, SchedulerConfig::default())
    }

    pub fn with_config(registry: Arc<ToolRegistry>, scheduler_config: SchedulerConfig) -> Self {
        let scheduler = Scheduler::with_config(Arc::clone(&registry), scheduler_config);
        Self { registry, gate: ConfirmationGate::new(), scheduler, audit: Arc::new(NoopAuditSink) }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Runs a batch of model-issued calls and returns their states in input
    /// order. Confirmation calls come back pending; everything else is
    /// terminal. A call id that was already dispatched returns its recorded
    /// state without re-executing.
    pub async fn dispatch(
        &self,
        state: &mut ConversationState,
        requests: Vec<ToolCallRequest>,
        now: DateTime<Utc>,
    ) -> Vec<ToolCallState> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            if let Some(existing) = self.replay(state, &request) {
                results.push(existing);
                continue;
            }
            let origin = CallOrigin::Model { turn: request.origin_turn };
            results.push(self.dispatch_one(state, request, origin, now).await);
        }
        state.touch(now);
        results
    }

    /// Applies a human decision to a pending confirmation call.
    ///
    /// Approving runs the tool; rejecting records the rejection marker. A call
    /// that already reached a terminal state is returned unchanged. A call
    /// left approved but unfinished is executed now.
    pub async fn resolve(
        &self,
        state: &mut ConversationState,
        call_id: &CallId,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<ToolCallState, GateError> {
        let current = state.call(call_id).cloned().ok_or_else(|| GateError::NotFound(call_id.clone()))?;

        let resolved = match self.gate.decide(&current, decision, now)? {
            DecisionOutcome::Unchanged(existing) if existing.status == ToolCallStatus::Approved => {
                warn!(
                    event_name = "orchestrator.resolve.resuming_approved",
                    conversation_id = %state.conversation_id,
                    call_id = %call_id,
                    "approved call never finished; executing it now"
                );
                self.execute(state, existing, now).await
            }
            DecisionOutcome::Unchanged(existing) => {
                info!(
                    event_name = "orchestrator.resolve.already_resolved",
                    conversation_id = %state.conversation_id,
                    call_id = %call_id,
                    status = existing.status.as_str(),
                    decision = decision.as_str(),
                    "decision ignored for resolved call"
                );
                existing
            }
            DecisionOutcome::Transitioned(transition) => {
                let decided = self.record(state, transition);
                if decided.status == ToolCallStatus::Approved {
                    self.execute(state, decided, now).await
                } else {
                    decided
                }
            }
        };

        state.touch(now);
        Ok(resolved)
    }

    /// Fires every schedule entry due at `now`. Each entry is handled on its
    /// own; a failing call is recorded as FAILED and the tick moves on.
    pub async fn tick(&self, state: &mut ConversationState, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport {
            refreshed: self.scheduler.refresh_parked(&mut state.schedules, now),
            ..TickReport::default()
        };

        for entry in self.scheduler.due(&state.schedules, now) {
            // Mark first so a non-recurring entry can never fire twice.
            let fired = match self.scheduler.mark_fired(&mut state.schedules, &entry.id, now) {
                Ok(fired) => fired,
                Err(error) => {
                    warn!(
                        event_name = "scheduler.tick.entry_failed",
                        conversation_id = %state.conversation_id,
                        schedule_id = %entry.id,
                        error_class = error.error_class(),
                        error = %error,
                        "schedule entry could not be fired"
                    );
                    continue;
                }
            };

            let request = self.scheduler.synthesize_call(&fired);
            let origin = CallOrigin::Schedule { schedule_id: fired.id.clone() };
            let call = self.dispatch_one(state, request, origin, now).await;

            if call.status == ToolCallStatus::Failed {
                warn!(
                    event_name = "scheduler.tick.entry_failed",
                    conversation_id = %state.conversation_id,
                    schedule_id = %fired.id,
                    call_id = %call.call_id,
                    tool_name = %call.tool_name,
                    "scheduled call failed"
                );
            }
            info!(
                event_name = "scheduler.schedule.fired",
                conversation_id = %state.conversation_id,
                schedule_id = %fired.id,
                call_id = %call.call_id,
                kind = fired.kind().as_str(),
                still_active = fired.active,
                fire_count = fired.fire_count,
                "schedule entry fired"
            );
            report.fired.push(FiredEntry { schedule_id: fired.id, call });
        }

        if report.fired.is_empty() {
            debug!(
                event_name = "scheduler.tick.idle",
                conversation_id = %state.conversation_id,
                "nothing due"
            );
        } else {
            state.touch(now);
            info!(
                event_name = "scheduler.tick.completed",
                conversation_id = %state.conversation_id,
                fired = report.fired_count(),
                failed = report.failed_count(),
                "scheduler tick completed"
            );
        }
        report
    }

    /// Calls waiting on a human decision, in dispatch order.
    pub fn pending_confirmations(&self, state: &ConversationState) -> Vec<ToolCallState> {
        state.calls.with_status(ToolCallStatus::PendingConfirm)
    }

    /// Result messages for `call_ids`, in the order given. Unknown ids are skipped.
    pub fn transcript(&self, state: &ConversationState, call_ids: &[CallId]) -> Vec<ToolResultMessage> {
        let states: Vec<ToolCallState> =
            call_ids.iter().filter_map(|call_id| state.call(call_id).cloned()).collect();
        transcript::assemble(&states)
    }

    fn replay(&self, state: &ConversationState, request: &ToolCallRequest) -> Option<ToolCallState> {
        let existing = state.call(&request.call_id)?.clone();
        if existing.arguments_hash != arguments_hash(&request.arguments) {
            warn!(
                event_name = "orchestrator.dispatch.duplicate_conflict",
                conversation_id = %state.conversation_id,
                call_id = %request.call_id,
                "replayed call id arrived with different arguments; keeping the recorded call"
            );
        }
        info!(
            event_name = "orchestrator.dispatch.duplicate_replayed",
            conversation_id = %state.conversation_id,
            call_id = %request.call_id,
            status = existing.status.as_str(),
            "call id already dispatched; returning recorded state"
        );
        Some(existing)
    }

    async fn dispatch_one(
        &self,
        state: &mut ConversationState,
        request: ToolCallRequest,
        origin: CallOrigin,
        now: DateTime<Utc>,
    ) -> ToolCallState {
        let sequence = state.calls.next_sequence();

        let checked = self.registry.resolve(&request.tool_name).map(|definition| definition.mode).and_then(
            |mode| self.registry.validate(&request.tool_name, &request.arguments).map(|args| (mode, args)),
        );
        let (mode, arguments) = match checked {
            Ok(checked) => checked,
            Err(error) => {
                let transition = self.gate.reject_invalid(
                    &request,
                    origin,
                    sequence,
                    error.error_class(),
                    &error.to_string(),
                    now,
                );
                return self.record(state, transition);
            }
        };

        let opened = self.record(state, self.gate.open(&request, arguments, mode, origin, sequence, now));
        if opened.status == ToolCallStatus::PendingConfirm {
            return opened;
        }

        match self.gate.auto_approve(&opened, now) {
            Ok(transition) => {
                let approved = self.record(state, transition);
                self.execute(state, approved, now).await
            }
            Err(error) => {
                warn!(
                    event_name = "orchestrator.dispatch.gate_refused",
                    conversation_id = %state.conversation_id,
                    call_id = %opened.call_id,
                    error = %error,
                    "gate refused automatic approval"
                );
                opened
            }
        }
    }

    /// Runs the bound function for an approved call and records the outcome.
    /// Tool side effects are discarded when the function fails.
    async fn execute(
        &self,
        state: &mut ConversationState,
        approved: ToolCallState,
        now: DateTime<Utc>,
    ) -> ToolCallState {
        let outcome = match self.registry.lookup(&approved.tool_name) {
            Ok(tool) => {
                let handler = tool.handler();
                let snapshot = (state.memory.clone(), state.records.clone(), state.schedules.clone());
                let result = {
                    let mut ctx = ToolContext::new(
                        &state.conversation_id,
                        &approved.call_id,
                        now,
                        &mut state.memory,
                        &mut state.records,
                        &mut state.schedules,
                        &self.scheduler,
                    );
                    handler.execute(approved.arguments.clone(), &mut ctx).await
                };
                if result.is_err() {
                    (state.memory, state.records, state.schedules) = snapshot;
                }
                result.map_err(|error| (error.error_class(), error.to_string()))
            }
            Err(error) => Err((error.error_class(), error.to_string())),
        };

        let transition = match outcome {
            Ok(content) => self.gate.complete(&approved, content, now),
            Err((error_class, message)) => self.gate.fail(&approved, error_class, &message, now),
        };

        match transition {
            Ok(transition) => self.record(state, transition),
            Err(error) => {
                warn!(
                    event_name = "orchestrator.execute.gate_refused",
                    conversation_id = %state.conversation_id,
                    call_id = %approved.call_id,
                    error = %error,
                    "could not record execution outcome"
                );
                approved
            }
        }
    }

    fn record(&self, state: &mut ConversationState, transition: GateTransition) -> ToolCallState {
        let GateTransition { state: call, transition } = transition;
        self.audit.emit(AuditEvent::for_transition(&state.conversation_id, &transition));
        log_transition(state, &call);

        state.apply(call.clone(), transition);
        call
    }
}

fn log_transition(state: &ConversationState, call: &ToolCallState) {
    let conversation_id = &state.conversation_id;
    match call.status {
        ToolCallStatus::PendingAuto => debug!(
            event_name = "orchestrator.call.dispatched",
            conversation_id = %conversation_id,
            call_id = %call.call_id,
            tool_name = %call.tool_name,
            origin = call.origin.as_str(),
            "call dispatched"
        ),
        ToolCallStatus::PendingConfirm => info!(
            event_name = "orchestrator.call.suspended",
            conversation_id = %conversation_id,
            call_id = %call.call_id,
            tool_name = %call.tool_name,
            "call awaiting user confirmation"
        ),
        ToolCallStatus::Approved => debug!(
            event_name = "orchestrator.call.approved",
            conversation_id = %conversation_id,
            call_id = %call.call_id,
            tool_name = %call.tool_name,
            "call approved"
        ),
        ToolCallStatus::Rejected => info!(
            event_name = "orchestrator.call.rejected",
            conversation_id = %conversation_id,
            call_id = %call.call_id,
            tool_name = %call.tool_name,
            "call rejected by user"
        ),
        ToolCallStatus::Completed => info!(
            event_name = "orchestrator.call.completed",
            conversation_id = %conversation_id,
            call_id = %call.call_id,
            tool_name = %call.tool_name,
            "call completed"
        ),
        ToolCallStatus::Failed => warn!(
            event_name = "orchestrator.call.failed",
            conversation_id = %conversation_id,
            call_id = %call.call_id,
            tool_name = %call.tool_name,
            outcome = %call.outcome.as_ref().map(|outcome| outcome.render()).unwrap_or_default(),
            "call failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::{json, Map, Value};

    use super::Orchestrator;
    use crate::audit::InMemoryAuditSink;
    use crate::domain::call::{
        CallId, CallOutcome, Decision, ToolCallRequest, ToolCallStatus, REJECTION_MARKER,
    };
    use crate::domain::conversation::ConversationId;
    use crate::domain::schedule::ScheduleRequest;
    use crate::domain::tool::ToolDefinition;
    use crate::gate::GateError;
    use crate::state::ConversationState;
    use crate::tools::handler::{ToolContext, ToolError, ToolHandler};
    use crate::tools::registry::ToolRegistry;
    use crate::tools::schema::{Constraint, FieldKind, FieldSpec, ParameterSchema};
    use crate::transcript::AWAITING_CONFIRMATION;

    #[derive(Clone, Default)]
    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl Counting {
        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolHandler for Counting {
        async fn execute(
            &self,
            arguments: Map<String, Value>,
            ctx: &mut ToolContext<'_>,
        ) -> Result<Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let call_id = ctx.call_id().0.clone();
            ctx.memory().set("last_call", call_id);
            Ok(Value::Object(arguments))
        }
    }

    struct Failing;

    #[async_trait]
    impl ToolHandler for Failing {
        async fn execute(
            &self,
            _arguments: Map<String, Value>,
            ctx: &mut ToolContext<'_>,
        ) -> Result<Value, ToolError> {
            ctx.memory().set("half_done", "yes");
            Err(ToolError::Failed("backend unavailable".to_string()))
        }
    }

    struct Scheduling;

    #[async_trait]
    impl ToolHandler for Scheduling {
        async fn execute(
            &self,
            _arguments: Map<String, Value>,
            ctx: &mut ToolContext<'_>,
        ) -> Result<Value, ToolError> {
            let entry = ctx.schedule(ScheduleRequest::delayed(5, "echo", Map::new()))?;
            Ok(json!({"scheduleId": entry.id.0}))
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        echo: Counting,
        pay: Counting,
        audit: InMemoryAuditSink,
    }

    fn fixture() -> Fixture {
        let echo = Counting::default();
        let pay = Counting::default();
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDefinition::auto("echo", "Echo").with_parameters(
                    ParameterSchema::empty().field(FieldSpec::optional("message", FieldKind::String)),
                ),
                echo.clone(),
            )
            .expect("register echo");
        registry
            .register(
                ToolDefinition::confirm("pay_invoice", "Pay an invoice").with_parameters(
                    ParameterSchema::empty().field(
                        FieldSpec::required("amount", FieldKind::Number).constrain(Constraint::Positive),
                    ),
                ),
                pay.clone(),
            )
            .expect("register pay_invoice");
        registry.register(ToolDefinition::auto("flaky", "Always fails"), Failing).expect("register flaky");
        registry.register(ToolDefinition::auto("remind_later", "Schedules echo"), Scheduling).expect("register");

        let audit = InMemoryAuditSink::default();
        let orchestrator = Orchestrator::new(Arc::new(registry)).with_audit_sink(Arc::new(audit.clone()));
        Fixture { orchestrator, echo, pay, audit }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time")
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn pay_request(call_id: &str) -> ToolCallRequest {
        ToolCallRequest::new(call_id, "pay_invoice", args(json!({"amount": 10})), 1)
    }

    fn conversation() -> ConversationState {
        ConversationState::new(ConversationId::from("conv-1"), start())
    }

    #[tokio::test]
    async fn handlers_see_their_own_call_id() {
        let fixture = fixture();
        let mut state = conversation();

        fixture
            .orchestrator
            .dispatch(
                &mut state,
                vec![
                    ToolCallRequest::new("c-first", "echo", Map::new(), 1),
                    ToolCallRequest::new("c-second", "echo", Map::new(), 1),
                ],
                start(),
            )
            .await;

        assert_eq!(state.memory.get("last_call"), Some("c-second"));
        assert_eq!(fixture.echo.count(), 2);
    }

    #[tokio::test]
    async fn mixed_batch_preserves_order_and_isolates_failures() {
        let fixture = fixture();
        let mut state = conversation();

        let results = fixture
            .orchestrator
            .dispatch(
                &mut state,
                vec![
                    ToolCallRequest::new("c1", "pay_invoice", args(json!({"amount": 10})), 1),
                    ToolCallRequest::new("c2", "launch_rocket", Map::new(), 1),
                    ToolCallRequest::new("c3", "echo", args(json!({"message": "hi"})), 1),
                    ToolCallRequest::new("c4", "pay_invoice", args(json!({"amount": -5})), 1),
                ],
                start(),
            )
            .await;

        let statuses: Vec<ToolCallStatus> = results.iter().map(|call| call.status).collect();
        assert_eq!(
            statuses,
            vec![
                ToolCallStatus::PendingConfirm,
                ToolCallStatus::Failed,
                ToolCallStatus::Completed,
                ToolCallStatus::Failed,
            ]
        );
        let ids: Vec<&str> = results.iter().map(|call| call.call_id.0.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);
        assert!(matches!(
            &results[1].outcome,
            Some(CallOutcome::Failed { error_class, .. }) if error_class == "unknown_tool"
        ));
        assert!(matches!(
            &results[3].outcome,
            Some(CallOutcome::Failed { error_class, .. }) if error_class == "validation"
        ));
        assert_eq!(fixture.echo.count(), 1);
        assert_eq!(fixture.pay.count(), 0);

        let transcript = fixture.orchestrator.transcript(
            &state,
            &results.iter().map(|call| call.call_id.clone()).collect::<Vec<_>>(),
        );
        assert_eq!(transcript[0].content, AWAITING_CONFIRMATION);
        assert!(transcript[1].is_error);
    }

    #[tokio::test]
    async fn confirmation_calls_wait_across_ticks_until_decided() {
        let fixture = fixture();
        let mut state = conversation();
        fixture
            .orchestrator
            .dispatch(&mut state, vec![pay_request("c1")], start())
            .await;

        for minute in 1..=5 {
            fixture.orchestrator.tick(&mut state, start() + Duration::minutes(minute)).await;
        }
        assert_eq!(fixture.orchestrator.pending_confirmations(&state).len(), 1);
        assert_eq!(fixture.pay.count(), 0);

        let call_id = CallId::from("c1");
        let approved = fixture
            .orchestrator
            .resolve(&mut state, &call_id, Decision::Approve, start() + Duration::hours(1))
            .await
            .expect("resolve");
        assert_eq!(approved.status, ToolCallStatus::Completed);

        let again = fixture
            .orchestrator
            .resolve(&mut state, &call_id, Decision::Approve, start() + Duration::hours(2))
            .await
            .expect("resolve again");
        assert_eq!(again, approved);
        assert_eq!(fixture.pay.count(), 1);
        assert!(fixture.orchestrator.pending_confirmations(&state).is_empty());
    }

    #[tokio::test]
    async fn rejection_never_executes_and_returns_the_marker() {
        let fixture = fixture();
        let mut state = conversation();
        fixture
            .orchestrator
            .dispatch(&mut state, vec![pay_request("c1")], start())
            .await;

        let rejected = fixture
            .orchestrator
            .resolve(&mut state, &CallId::from("c1"), Decision::Reject, start())
            .await
            .expect("resolve");

        assert_eq!(rejected.status, ToolCallStatus::Rejected);
        assert_eq!(rejected.outcome.map(|outcome| outcome.render()).as_deref(), Some(REJECTION_MARKER));
        assert_eq!(fixture.pay.count(), 0);

        let unknown = fixture
            .orchestrator
            .resolve(&mut state, &CallId::from("nope"), Decision::Approve, start())
            .await
            .expect_err("unknown call");
        assert_eq!(unknown, GateError::NotFound(CallId::from("nope")));
    }

    #[tokio::test]
    async fn duplicate_call_ids_are_not_executed_twice() {
        let fixture = fixture();
        let mut state = conversation();
        let request = ToolCallRequest::new("c1", "echo", args(json!({"message": "once"})), 1);

        let first = fixture.orchestrator.dispatch(&mut state, vec![request.clone()], start()).await;
        let second =
            fixture.orchestrator.dispatch(&mut state, vec![request.clone(), request], start()).await;

        assert_eq!(second, vec![first[0].clone(), first[0].clone()]);
        assert_eq!(fixture.echo.count(), 1);
        assert_eq!(state.calls.len(), 1);
    }

    #[tokio::test]
    async fn execution_errors_are_captured_and_roll_back_side_effects() {
        let fixture = fixture();
        let mut state = conversation();

        let results = fixture
            .orchestrator
            .dispatch(&mut state, vec![ToolCallRequest::new("c1", "flaky", Map::new(), 1)], start())
            .await;

        assert_eq!(results[0].status, ToolCallStatus::Failed);
        assert_eq!(
            results[0].outcome.as_ref().map(|outcome| outcome.render()).as_deref(),
            Some("error[execution]: backend unavailable")
        );
        assert_eq!(state.memory.get("half_done"), None);
    }

    #[tokio::test]
    async fn delayed_schedule_fires_exactly_once_as_an_auto_call() {
        let fixture = fixture();
        let mut state = conversation();
        fixture
            .orchestrator
            .dispatch(&mut state, vec![ToolCallRequest::new("c1", "remind_later", Map::new(), 1)], start())
            .await;
        assert_eq!(state.schedules.len(), 1);

        let early = fixture.orchestrator.tick(&mut state, start() + Duration::seconds(4)).await;
        assert_eq!(early.fired_count(), 0);

        let report = fixture.orchestrator.tick(&mut state, start() + Duration::seconds(5)).await;
        assert_eq!(report.fired_count(), 1);
        assert_eq!(report.fired[0].call.status, ToolCallStatus::Completed);
        assert_eq!(report.fired[0].call.arguments, Map::new());

        let later = fixture.orchestrator.tick(&mut state, start() + Duration::seconds(10)).await;
        assert_eq!(later.fired_count(), 0);
        assert_eq!(fixture.echo.count(), 1);
    }

    #[tokio::test]
    async fn cron_schedule_fires_each_minute_with_fresh_call_ids() {
        let fixture = fixture();
        let mut state = conversation();
        let entry = fixture
            .orchestrator
            .scheduler()
            .schedule(&mut state.schedules, ScheduleRequest::cron("* * * * *", "echo", Map::new()), start())
            .expect("schedule");

        let mut call_ids = Vec::new();
        for minute in 1..=3 {
            let report = fixture.orchestrator.tick(&mut state, start() + Duration::minutes(minute)).await;
            assert_eq!(report.fired_count(), 1);
            call_ids.push(report.fired[0].call.call_id.clone());
        }

        let unique: BTreeSet<&CallId> = call_ids.iter().collect();
        assert_eq!(unique.len(), 3);
        assert_eq!(fixture.echo.count(), 3);
        let active = fixture.orchestrator.scheduler().list_active(&state.schedules);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, entry.id);
    }

    #[tokio::test]
    async fn scheduled_confirmation_tools_run_without_a_prompt() {
        let fixture = fixture();
        let mut state = conversation();
        fixture
            .orchestrator
            .scheduler()
            .schedule(
                &mut state.schedules,
                ScheduleRequest::delayed(0, "pay_invoice", args(json!({"amount": 3}))),
                start(),
            )
            .expect("schedule");

        let report = fixture.orchestrator.tick(&mut state, start()).await;
        assert_eq!(report.fired[0].call.status, ToolCallStatus::Completed);
        assert_eq!(fixture.pay.count(), 1);
    }

    #[tokio::test]
    async fn failing_cron_fire_keeps_the_entry_active() {
        let fixture = fixture();
        let mut state = conversation();
        fixture
            .orchestrator
            .scheduler()
            .schedule(&mut state.schedules, ScheduleRequest::cron("* * * * *", "flaky", Map::new()), start())
            .expect("schedule");

        let report = fixture.orchestrator.tick(&mut state, start() + Duration::minutes(1)).await;
        assert_eq!(report.failed_count(), 1);
        assert_eq!(fixture.orchestrator.scheduler().list_active(&state.schedules).len(), 1);
    }

    #[tokio::test]
    async fn every_transition_is_recorded_and_audited() {
        let fixture = fixture();
        let mut state = conversation();
        fixture
            .orchestrator
            .dispatch(&mut state, vec![ToolCallRequest::new("c1", "echo", Map::new(), 1)], start())
            .await;

        let path: Vec<ToolCallStatus> = state
            .transitions_for(&CallId::from("c1"))
            .into_iter()
            .map(|transition| transition.to_status)
            .collect();
        assert_eq!(
            path,
            vec![ToolCallStatus::PendingAuto, ToolCallStatus::Approved, ToolCallStatus::Completed]
        );
        assert_eq!(fixture.audit.events().len(), 3);
    }
}
