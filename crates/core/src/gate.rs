//! Confirmation Gate
//!
//! Pure state machine over `ToolCallState`. Every operation takes the current
//! state by reference and returns the next state together with the
//! `CallTransition` that produced it; nothing here executes a tool or touches
//! storage. Allowed moves:
//!
//! ```text
//! (new) -> PendingAuto | PendingConfirm | Failed
//! PendingAuto -> Approved
//! PendingConfirm -> Approved | Rejected
//! Approved -> Completed | Failed
//! ```

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::call::{
    CallId, CallOrigin, CallOutcome, CallTransition, Decision, ToolCallRequest, ToolCallState,
    ToolCallStatus,
};
use crate::domain::tool::ExecutionMode;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("call `{call_id}` cannot move from {from} to {to}")]
    InvalidTransition { call_id: CallId, from: ToolCallStatus, to: ToolCallStatus },
    #[error("call `{0}` not found")]
    NotFound(CallId),
    #[error("call `{call_id}` is already {status}")]
    AlreadyResolved { call_id: CallId, status: ToolCallStatus },
}

impl GateError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotFound(_) => "not_found",
            Self::AlreadyResolved { .. } => "already_resolved",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GateTransition {
    pub state: ToolCallState,
    pub transition: CallTransition,
}

/// Result of applying a human decision.
#[derive(Clone, Debug, PartialEq)]
pub enum DecisionOutcome {
    Transitioned(GateTransition),
    /// The call was already terminal; its recorded state is returned as-is.
    Unchanged(ToolCallState),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConfirmationGate;

impl ConfirmationGate {
    pub fn new() -> Self {
        Self
    }

    /// Classifies a freshly dispatched call.
    ///
    /// Scheduled calls always enter as `PendingAuto`: approval was granted
    /// when the schedule was created.
    pub fn open(
        &self,
        request: &ToolCallRequest,
        arguments: Map<String, Value>,
        mode: ExecutionMode,
        origin: CallOrigin,
        sequence: u64,
        now: DateTime<Utc>,
    ) -> GateTransition {
        let (status, reason) = match (&origin, mode) {
            (CallOrigin::Schedule { .. }, _) => (ToolCallStatus::PendingAuto, "scheduled call"),
            (CallOrigin::Model { .. }, ExecutionMode::Auto) => (ToolCallStatus::PendingAuto, "auto tool"),
            (CallOrigin::Model { .. }, ExecutionMode::Confirm) => {
                (ToolCallStatus::PendingConfirm, "awaiting user confirmation")
            }
        };

        let state = new_state(request, arguments, origin, status, None, sequence, now);
        let transition = CallTransition {
            call_id: state.call_id.clone(),
            from_status: None,
            to_status: status,
            reason: reason.to_string(),
            occurred_at: now,
        };
        GateTransition { state, transition }
    }

    /// Records a call that never reached the gate (unknown tool, bad arguments).
    pub fn reject_invalid(
        &self,
        request: &ToolCallRequest,
        origin: CallOrigin,
        sequence: u64,
        error_class: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> GateTransition {
        let outcome =
            CallOutcome::Failed { error_class: error_class.to_string(), message: message.to_string() };
        let mut state = new_state(
            request,
            request.arguments.clone(),
            origin,
            ToolCallStatus::Failed,
            Some(outcome),
            sequence,
            now,
        );
        state.resolved_at = Some(now);

        let transition = CallTransition {
            call_id: state.call_id.clone(),
            from_status: None,
            to_status: ToolCallStatus::Failed,
            reason: error_class.to_string(),
            occurred_at: now,
        };
        GateTransition { state, transition }
    }

    pub fn auto_approve(&self, state: &ToolCallState, now: DateTime<Utc>) -> Result<GateTransition, GateError> {
        if state.status != ToolCallStatus::PendingAuto {
            return Err(invalid(state, ToolCallStatus::Approved));
        }
        self.apply(state, ToolCallStatus::Approved, None, "auto approved", now)
    }

    /// Applies a human decision to a call.
    ///
    /// Terminal calls come back `Unchanged`. A call that is already approved
    /// but has not finished is also returned unchanged so the caller can
    /// resume its execution.
    pub fn decide(
        &self,
        state: &ToolCallState,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, GateError> {
        if state.status.is_terminal() || state.status == ToolCallStatus::Approved {
            return Ok(DecisionOutcome::Unchanged(state.clone()));
        }

        match (state.status, decision) {
            (ToolCallStatus::PendingConfirm, Decision::Approve) => self
                .apply(state, ToolCallStatus::Approved, None, "user approved", now)
                .map(DecisionOutcome::Transitioned),
            (ToolCallStatus::PendingConfirm, Decision::Reject) => self
                .apply(state, ToolCallStatus::Rejected, Some(CallOutcome::rejected()), "user rejected", now)
                .map(DecisionOutcome::Transitioned),
            (_, Decision::Approve) => Err(invalid(state, ToolCallStatus::Approved)),
            (_, Decision::Reject) => Err(invalid(state, ToolCallStatus::Rejected)),
        }
    }

    pub fn complete(
        &self,
        state: &ToolCallState,
        content: Value,
        now: DateTime<Utc>,
    ) -> Result<GateTransition, GateError> {
        self.ensure_executable(state, ToolCallStatus::Completed)?;
        self.apply(state, ToolCallStatus::Completed, Some(CallOutcome::Completed { content }), "executed", now)
    }

    pub fn fail(
        &self,
        state: &ToolCallState,
        error_class: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<GateTransition, GateError> {
        self.ensure_executable(state, ToolCallStatus::Failed)?;
        let outcome =
            CallOutcome::Failed { error_class: error_class.to_string(), message: message.to_string() };
        self.apply(state, ToolCallStatus::Failed, Some(outcome), error_class, now)
    }

    pub fn validate_transition(&self, state: &ToolCallState, to: ToolCallStatus) -> Result<(), GateError> {
        let valid = matches!(
            (state.status, to),
            (ToolCallStatus::PendingAuto, ToolCallStatus::Approved)
                | (ToolCallStatus::PendingConfirm, ToolCallStatus::Approved)
                | (ToolCallStatus::PendingConfirm, ToolCallStatus::Rejected)
                | (ToolCallStatus::Approved, ToolCallStatus::Completed)
                | (ToolCallStatus::Approved, ToolCallStatus::Failed)
        );
        if valid {
            Ok(())
        } else {
            Err(invalid(state, to))
        }
    }

    fn ensure_executable(&self, state: &ToolCallState, to: ToolCallStatus) -> Result<(), GateError> {
        if state.status.is_terminal() {
            return Err(GateError::AlreadyResolved { call_id: state.call_id.clone(), status: state.status });
        }
        self.validate_transition(state, to)
    }

    fn apply(
        &self,
        state: &ToolCallState,
        to: ToolCallStatus,
        outcome: Option<CallOutcome>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<GateTransition, GateError> {
        self.validate_transition(state, to)?;

        let mut next = state.clone();
        next.status = to;
        next.state_version += 1;
        if outcome.is_some() {
            next.outcome = outcome;
        }
        if to.is_terminal() {
            next.resolved_at = Some(now);
        }

        let transition = CallTransition {
            call_id: state.call_id.clone(),
            from_status: Some(state.status),
            to_status: to,
            reason: reason.to_string(),
            occurred_at: now,
        };
        Ok(GateTransition { state: next, transition })
    }
}

/// SHA-256 over the canonical JSON encoding of `arguments`.
///
/// `serde_json::Map` keeps keys sorted, so equal maps hash equally.
pub fn arguments_hash(arguments: &Map<String, Value>) -> String {
    let canonical = Value::Object(arguments.clone()).to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn new_state(
    request: &ToolCallRequest,
    arguments: Map<String, Value>,
    origin: CallOrigin,
    status: ToolCallStatus,
    outcome: Option<CallOutcome>,
    sequence: u64,
    now: DateTime<Utc>,
) -> ToolCallState {
    ToolCallState {
        call_id: request.call_id.clone(),
        tool_name: request.tool_name.clone(),
        arguments_hash: arguments_hash(&request.arguments),
        arguments,
        origin,
        status,
        outcome,
        sequence,
        state_version: 1,
        created_at: now,
        resolved_at: None,
    }
}

fn invalid(state: &ToolCallState, to: ToolCallStatus) -> GateError {
    GateError::InvalidTransition { call_id: state.call_id.clone(), from: state.status, to }
}
