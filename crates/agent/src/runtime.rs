//! Runtime facade
//!
//! `AgentRuntime` is what a transport talks to. Each operation loads the
//! conversation snapshot, applies one orchestrator step while holding the
//! conversation's guard, and saves the snapshot back before returning.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use switchyard_core::{
    CallId, Clock, ConversationId, ConversationMemory, ConversationState, CoreError, Decision,
    GateError, Orchestrator, ScheduleEntry, ScheduleError, ScheduleId, TickReport, ToolCallRequest,
    ToolCallState, ToolResultMessage,
};
use switchyard_db::{ConversationStateRepository, RepositoryError};

use crate::hub::ConversationHub;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RuntimeError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Core(error) => error.error_class(),
            Self::Repository(error) => error.error_class(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Core(error) if error.is_not_found())
    }
}

impl From<GateError> for RuntimeError {
    fn from(error: GateError) -> Self {
        Self::Core(error.into())
    }
}

impl From<ScheduleError> for RuntimeError {
    fn from(error: ScheduleError) -> Self {
        Self::Core(error.into())
    }
}

/// A conversation whose tick could not complete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TickFailure {
    pub conversation_id: ConversationId,
    pub error_class: String,
    pub message: String,
}

/// Outcome of one tick across every due conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TickSummary {
    pub conversations: usize,
    pub fired: usize,
    pub failed: usize,
    pub errors: Vec<TickFailure>,
}

#[derive(Clone)]
pub struct AgentRuntime {
    orchestrator: Orchestrator,
    repository: Arc<dyn ConversationStateRepository>,
    hub: ConversationHub,
    clock: Arc<dyn Clock>,
}

impl AgentRuntime {
    pub fn new(
        orchestrator: Orchestrator,
        repository: Arc<dyn ConversationStateRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { orchestrator, repository, hub: ConversationHub::new(), clock }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Tool catalogue for the model.
    pub fn describe_tools(&self) -> Value {
        self.orchestrator.registry().describe()
    }

    pub async fn dispatch(
        &self,
        conversation_id: &ConversationId,
        requests: Vec<ToolCallRequest>,
    ) -> Result<Vec<ToolCallState>, RuntimeError> {
        let _guard = self.hub.lock(conversation_id).await;
        let now = self.clock.now();
        let mut state = match self.repository.load(conversation_id).await? {
            Some(state) => state,
            None => ConversationState::new(conversation_id.clone(), now),
        };

        let results = self.orchestrator.dispatch(&mut state, requests, now).await;
        self.persist(&mut state).await?;

        info!(
            event_name = "agent.runtime.dispatched",
            conversation_id = %conversation_id,
            calls = results.len(),
            pending = results.iter().filter(|call| call.status.is_pending()).count(),
            state_version = state.state_version,
            "dispatch batch persisted"
        );
        Ok(results)
    }

    pub async fn resolve(
        &self,
        conversation_id: &ConversationId,
        call_id: &CallId,
        decision: Decision,
    ) -> Result<ToolCallState, RuntimeError> {
        let _guard = self.hub.lock(conversation_id).await;
        let mut state = self
            .repository
            .load(conversation_id)
            .await?
            .ok_or_else(|| GateError::NotFound(call_id.clone()))?;

        let resolved =
            self.orchestrator.resolve(&mut state, call_id, decision, self.clock.now()).await?;
        self.persist(&mut state).await?;
        Ok(resolved)
    }

    /// Active schedule entries in firing order. Unknown conversations have none.
    pub async fn schedules(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ScheduleEntry>, RuntimeError> {
        Ok(self
            .repository
            .load(conversation_id)
            .await?
            .map(|state| self.orchestrator.scheduler().list_active(&state.schedules))
            .unwrap_or_default())
    }

    pub async fn cancel_schedule(
        &self,
        conversation_id: &ConversationId,
        schedule_id: &ScheduleId,
    ) -> Result<ScheduleEntry, RuntimeError> {
        let _guard = self.hub.lock(conversation_id).await;
        let mut state = self
            .repository
            .load(conversation_id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound(schedule_id.clone()))?;

        let cancelled = self.orchestrator.scheduler().cancel(&mut state.schedules, schedule_id)?;
        state.touch(self.clock.now());
        self.persist(&mut state).await?;
        Ok(cancelled)
    }

    pub async fn memory(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationMemory, RuntimeError> {
        Ok(self
            .repository
            .load(conversation_id)
            .await?
            .map(|state| state.memory)
            .unwrap_or_default())
    }

    pub async fn pending_confirmations(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ToolCallState>, RuntimeError> {
        Ok(self
            .repository
            .load(conversation_id)
            .await?
            .map(|state| self.orchestrator.pending_confirmations(&state))
            .unwrap_or_default())
    }

    pub async fn transcript(
        &self,
        conversation_id: &ConversationId,
        call_ids: &[CallId],
    ) -> Result<Vec<ToolResultMessage>, RuntimeError> {
        Ok(self
            .repository
            .load(conversation_id)
            .await?
            .map(|state| self.orchestrator.transcript(&state, call_ids))
            .unwrap_or_default())
    }

    /// Fires every schedule entry due at `now`, one task per conversation.
    /// A conversation that fails to tick is reported and skipped.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, RuntimeError> {
        let due = self.repository.list_due_conversations(now).await?;
        let mut tasks = JoinSet::new();
        for conversation_id in due {
            let runtime = self.clone();
            tasks.spawn(async move {
                let result = runtime.tick_conversation(&conversation_id, now).await;
                (conversation_id, result)
            });
        }

        let mut summary = TickSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => {
                    summary.conversations += 1;
                    summary.fired += report.fired_count();
                    summary.failed += report.failed_count();
                }
                Ok((conversation_id, Err(runtime_error))) => {
                    warn!(
                        event_name = "agent.tick.conversation_failed",
                        conversation_id = %conversation_id,
                        error_class = runtime_error.error_class(),
                        error = %runtime_error,
                        "conversation tick failed"
                    );
                    summary.errors.push(TickFailure {
                        conversation_id,
                        error_class: runtime_error.error_class().to_string(),
                        message: runtime_error.to_string(),
                    });
                }
                Err(join_error) => {
                    error!(
                        event_name = "agent.tick.task_aborted",
                        error = %join_error,
                        "conversation tick task did not finish"
                    );
                }
            }
        }

        info!(
            event_name = "agent.tick.completed",
            conversations = summary.conversations,
            fired = summary.fired,
            failed = summary.failed,
            errors = summary.errors.len(),
            "scheduler tick completed"
        );
        Ok(summary)
    }

    async fn tick_conversation(
        &self,
        conversation_id: &ConversationId,
        now: DateTime<Utc>,
    ) -> Result<TickReport, RuntimeError> {
        let _guard = self.hub.lock(conversation_id).await;
        let Some(mut state) = self.repository.load(conversation_id).await? else {
            return Ok(TickReport::default());
        };

        let report = self.orchestrator.tick(&mut state, now).await;
        if report.changed_state() {
            self.persist(&mut state).await?;
        }
        Ok(report)
    }

    async fn persist(&self, state: &mut ConversationState) -> Result<(), RuntimeError> {
        state.state_version = self.repository.save(state).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Map, Value};

    use switchyard_core::config::ToolsConfig;
    use switchyard_core::{
        CallId, Clock, ConversationId, Decision, ManualClock, Orchestrator, ScheduleId,
        ToolCallRequest, ToolCallStatus,
    };
    use switchyard_db::{ConversationStateRepository, InMemoryConversationStateRepository};

    use super::AgentRuntime;
    use crate::tools::builtin_registry;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn runtime() -> (AgentRuntime, Arc<ManualClock>, Arc<InMemoryConversationStateRepository>) {
        let registry = builtin_registry(&ToolsConfig::default()).expect("registry");
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid time"),
        ));
        let repository = Arc::new(InMemoryConversationStateRepository::default());
        let runtime = AgentRuntime::new(
            Orchestrator::new(Arc::new(registry)),
            repository.clone(),
            clock.clone(),
        );
        (runtime, clock, repository)
    }

    #[tokio::test]
    async fn every_step_is_persisted() {
        let (runtime, _clock, repository) = runtime();
        let conversation = ConversationId("conv-1".into());

        let results = runtime
            .dispatch(
                &conversation,
                vec![
                    ToolCallRequest::new("c1", "remember", args(json!({"key": "k", "value": "v"})), 1),
                    ToolCallRequest::new(
                        "c2",
                        "create_expense",
                        args(json!({"description": "Taxi", "amount": 20})),
                        1,
                    ),
                ],
            )
            .await
            .expect("dispatch");
        assert_eq!(results[1].status, ToolCallStatus::PendingConfirm);

        let pending = runtime.pending_confirmations(&conversation).await.expect("pending");
        assert_eq!(pending.len(), 1);

        let resolved = runtime
            .resolve(&conversation, &CallId::from("c2"), Decision::Reject)
            .await
            .expect("resolve");
        assert_eq!(resolved.status, ToolCallStatus::Rejected);

        let stored = repository.load(&conversation).await.expect("load").expect("present");
        assert_eq!(stored.state_version, 2);
        assert_eq!(stored.memory.get("k"), Some("v"));
        assert!(stored.records.is_empty());

        let transcript = runtime
            .transcript(&conversation, &[CallId::from("c1"), CallId::from("c2")])
            .await
            .expect("transcript");
        assert_eq!(transcript.len(), 2);
        assert!(!transcript[1].is_error);
    }

    #[tokio::test]
    async fn unknown_targets_report_not_found() {
        let (runtime, _clock, _repository) = runtime();
        let conversation = ConversationId("conv-none".into());

        let missing_call = runtime
            .resolve(&conversation, &CallId::from("nope"), Decision::Approve)
            .await
            .expect_err("no such conversation");
        assert!(missing_call.is_not_found());

        let missing_schedule = runtime
            .cancel_schedule(&conversation, &ScheduleId("nope".into()))
            .await
            .expect_err("no such schedule");
        assert_eq!(missing_schedule.error_class(), "not_found");

        assert!(runtime.schedules(&conversation).await.expect("schedules").is_empty());
        assert!(runtime.memory(&conversation).await.expect("memory").is_empty());
    }

    #[tokio::test]
    async fn tick_fires_across_conversations() {
        let (runtime, clock, _repository) = runtime();
        let schedule = |id: &str| {
            ToolCallRequest::new(
                id,
                "schedule_task",
                args(json!({
                    "kind": "delayed",
                    "delaySeconds": 30,
                    "toolName": "remember",
                    "arguments": {"key": "woke", "value": "yes"}
                })),
                1,
            )
        };

        for name in ["conv-a", "conv-b"] {
            runtime.dispatch(&ConversationId(name.into()), vec![schedule("s1")]).await.expect("dispatch");
        }

        let early = runtime.tick(clock.now()).await.expect("early tick");
        assert_eq!(early.fired, 0);

        let later = clock.advance(Duration::seconds(31));
        let summary = runtime.tick(later).await.expect("tick");
        assert_eq!((summary.conversations, summary.fired, summary.failed), (2, 2, 0));

        for name in ["conv-a", "conv-b"] {
            let conversation = ConversationId(name.into());
            let memory = runtime.memory(&conversation).await.expect("memory");
            assert_eq!(memory.get("woke"), Some("yes"));
            assert!(runtime.schedules(&conversation).await.expect("schedules").is_empty());
        }

        let again = runtime.tick(later).await.expect("repeat tick");
        assert_eq!(again.fired, 0);
    }
}
