use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::call::CallId;
use crate::domain::conversation::{ConversationId, ConversationMemory};
use crate::domain::schedule::{ScheduleEntry, ScheduleId, ScheduleRequest};
use crate::records::{RecordBook, RecordError};
use crate::scheduling::{ScheduleBook, ScheduleError, Scheduler};

/// Failure raised by a bound execution function. Captured into FAILED state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("{0}")]
    Failed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl ToolError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Failed(_) => "execution",
            Self::NotFound(_) => "not_found",
            Self::Invalid(_) => "validation",
            Self::Schedule(error) => error.error_class(),
        }
    }
}

impl From<RecordError> for ToolError {
    fn from(error: RecordError) -> Self {
        match error {
            RecordError::NotFound(id) => Self::NotFound(format!("record `{id}`")),
            RecordError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Execution function bound to a registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError>;
}

/// The slice of conversation state a tool may touch while it runs.
pub struct ToolContext<'a> {
    conversation_id: &'a ConversationId,
    call_id: &'a CallId,
    now: DateTime<Utc>,
    memory: &'a mut ConversationMemory,
    records: &'a mut RecordBook,
    schedules: &'a mut ScheduleBook,
    scheduler: &'a Scheduler,
}

impl<'a> ToolContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversation_id: &'a ConversationId,
        call_id: &'a CallId,
        now: DateTime<Utc>,
        memory: &'a mut ConversationMemory,
        records: &'a mut RecordBook,
        schedules: &'a mut ScheduleBook,
        scheduler: &'a Scheduler,
    ) -> Self {
        Self { conversation_id, call_id, now, memory, records, schedules, scheduler }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        self.conversation_id
    }

    pub fn call_id(&self) -> &CallId {
        self.call_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn memory(&mut self) -> &mut ConversationMemory {
        self.memory
    }

    pub fn records(&mut self) -> &mut RecordBook {
        self.records
    }

    pub fn schedule(&mut self, request: ScheduleRequest) -> Result<ScheduleEntry, ScheduleError> {
        self.scheduler.schedule(self.schedules, request, self.now)
    }

    pub fn cancel_schedule(&mut self, schedule_id: &ScheduleId) -> Result<ScheduleEntry, ScheduleError> {
        self.scheduler.cancel(self.schedules, schedule_id)
    }

    pub fn active_schedules(&self) -> Vec<ScheduleEntry> {
        self.scheduler.list_active(self.schedules)
    }
}
