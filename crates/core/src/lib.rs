pub mod audit;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gate;
pub mod orchestrator;
pub mod records;
pub mod scheduling;
pub mod state;
pub mod tools;
pub mod transcript;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, NoopAuditSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::call::{
    CallId, CallOrigin, CallOutcome, CallTransition, Decision, ToolCallRequest, ToolCallState,
    ToolCallStatus, REJECTION_MARKER,
};
pub use domain::conversation::{ConversationId, ConversationMemory};
pub use domain::record::{Record, RecordFilter, RecordId};
pub use domain::schedule::{FireSpec, ScheduleEntry, ScheduleId, ScheduleKind, ScheduleRequest};
pub use domain::tool::{ExecutionMode, ToolDefinition};
pub use errors::CoreError;
pub use gate::{ConfirmationGate, DecisionOutcome, GateError, GateTransition};
pub use orchestrator::{FiredEntry, Orchestrator, TickReport};
pub use records::{RecordBook, RecordError, RecordStore};
pub use scheduling::{CronError, CronExpression, ScheduleBook, ScheduleError, Scheduler, SchedulerConfig};
pub use state::{CallLedger, ConversationState};
pub use tools::{
    Constraint, FieldKind, FieldSpec, ParameterSchema, RegistryError, ToolContext, ToolError,
    ToolHandler, ToolRegistry, ValidationError,
};
pub use transcript::ToolResultMessage;
