//! Schedule creation, cancellation and firing.
//!
//! `ScheduleBook` is the per-conversation list of entries and is owned by the
//! conversation state; `Scheduler` holds the rules. Entries are kept in
//! creation order and every mutation replaces the list whole.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::call::{CallId, ToolCallRequest};
use crate::domain::schedule::{
    FireSpec, ScheduleEntry, ScheduleId, ScheduleKind, SchedulePayload, ScheduleRequest,
};
use crate::domain::tool::ExecutionMode;
use crate::scheduling::cron::{CronExpression, SEARCH_HORIZON_DAYS};
use crate::tools::registry::{RegistryError, ToolRegistry};
use crate::tools::schema::ValidationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("schedule `{0}` not found or no longer active")]
    NotFound(ScheduleId),
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("tool `{tool}`: {source}")]
    Validation {
        tool: String,
        #[source]
        source: ValidationError,
    },
}

impl ScheduleError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::InvalidSchedule(_) => "invalid_schedule",
            Self::NotFound(_) => "not_found",
            Self::UnknownTool(_) => "unknown_tool",
            Self::Validation { .. } => "validation",
        }
    }
}

impl From<RegistryError> for ScheduleError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::UnknownTool(name) | RegistryError::DuplicateTool(name) => {
                Self::UnknownTool(name)
            }
            RegistryError::Validation { tool, source } => Self::Validation { tool, source },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on entries fired by one tick of one conversation.
    pub max_fires_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_fires_per_tick: 100 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleBook {
    entries: Vec<ScheduleEntry>,
    next_sequence: u64,
}

impl ScheduleBook {
    pub fn from_entries(mut entries: Vec<ScheduleEntry>) -> Self {
        entries.sort_by_key(|entry| entry.sequence);
        let next_sequence = entries.iter().map(|entry| entry.sequence + 1).max().unwrap_or(0);
        Self { entries, next_sequence }
    }

    /// Rebuilds a persisted book. The counter never moves backwards past
    /// entries that already fired and were removed.
    pub fn restore(entries: Vec<ScheduleEntry>, next_sequence: u64) -> Self {
        let mut book = Self::from_entries(entries);
        book.next_sequence = book.next_sequence.max(next_sequence);
        book
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn get(&self, id: &ScheduleId) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest instant at which an active entry becomes due.
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().filter(|entry| entry.active).map(|entry| entry.next_fire_at).min()
    }

    fn replace(&mut self, entries: Vec<ScheduleEntry>) {
        self.entries = entries;
    }
}

#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<ToolRegistry>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::with_config(registry, SchedulerConfig::default())
    }

    pub fn with_config(registry: Arc<ToolRegistry>, config: SchedulerConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validates `request` and appends a new active entry to `book`.
    ///
    /// Nothing is written when the request is rejected. Absolute timestamps
    /// in the past are accepted and fire on the next tick.
    pub fn schedule(
        &self,
        book: &mut ScheduleBook,
        request: ScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let definition = self.registry.resolve(&request.tool_name)?;
        let mode = definition.mode;
        let arguments = self.registry.validate(&request.tool_name, &request.arguments)?;
        let (spec, next_fire_at) = fire_spec_for(&request, now)?;

        let entry = ScheduleEntry {
            id: ScheduleId::generate(),
            sequence: book.next_sequence,
            spec,
            payload: SchedulePayload { tool_name: request.tool_name, arguments },
            next_fire_at,
            active: true,
            fire_count: 0,
            last_fired_at: None,
            created_at: now,
        };

        let mut next = book.entries.clone();
        next.push(entry.clone());
        book.replace(next);
        book.next_sequence += 1;

        if mode == ExecutionMode::Confirm {
            warn!(
                event_name = "scheduler.schedule.confirmation_bypassed",
                schedule_id = %entry.id,
                tool_name = %entry.payload.tool_name,
                "scheduled call to a confirmation tool will run without a further prompt"
            );
        }
        info!(
            event_name = "scheduler.schedule.created",
            schedule_id = %entry.id,
            kind = entry.kind().as_str(),
            tool_name = %entry.payload.tool_name,
            next_fire_at = %entry.next_fire_at.to_rfc3339(),
            "schedule entry created"
        );

        Ok(entry)
    }

    /// Removes an active entry. Unknown and already-fired entries are `NotFound`.
    pub fn cancel(&self, book: &mut ScheduleBook, id: &ScheduleId) -> Result<ScheduleEntry, ScheduleError> {
        let mut cancelled = book
            .get(id)
            .filter(|entry| entry.active)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound(id.clone()))?;

        book.replace(book.entries.iter().filter(|entry| &entry.id != id).cloned().collect());
        cancelled.active = false;

        info!(
            event_name = "scheduler.schedule.cancelled",
            schedule_id = %cancelled.id,
            fire_count = cancelled.fire_count,
            "schedule entry cancelled"
        );
        Ok(cancelled)
    }

    /// Active entries ordered by next fire time, then creation order.
    pub fn list_active(&self, book: &ScheduleBook) -> Vec<ScheduleEntry> {
        let mut active: Vec<ScheduleEntry> =
            book.entries.iter().filter(|entry| entry.active).cloned().collect();
        active.sort_by(|left, right| {
            left.next_fire_at.cmp(&right.next_fire_at).then(left.sequence.cmp(&right.sequence))
        });
        active
    }

    /// Re-searches cron entries parked at the end of a search horizon. A
    /// parked entry is due without matching its expression, so it must not
    /// fire; it gets a real next fire time (or is parked again) instead.
    pub fn refresh_parked(&self, book: &mut ScheduleBook, now: DateTime<Utc>) -> usize {
        let mut refreshed = 0;
        let entries = book
            .entries
            .iter()
            .map(|entry| {
                let FireSpec::Cron { expression } = &entry.spec else {
                    return entry.clone();
                };
                let Ok(cron) = CronExpression::parse(expression) else {
                    return entry.clone();
                };
                if !entry.active || !entry.is_due(now) || cron.matches(entry.next_fire_at) {
                    return entry.clone();
                }
                refreshed += 1;
                let mut entry = entry.clone();
                entry.next_fire_at = next_cron_fire(&cron, &entry.id, now);
                entry
            })
            .collect();
        if refreshed > 0 {
            book.replace(entries);
        }
        refreshed
    }

    /// Entries due at `now`, in firing order, capped at `max_fires_per_tick`.
    pub fn due(&self, book: &ScheduleBook, now: DateTime<Utc>) -> Vec<ScheduleEntry> {
        self.list_active(book)
            .into_iter()
            .filter(|entry| entry.is_due(now))
            .take(self.config.max_fires_per_tick)
            .collect()
    }

    /// Records that `id` fired at `now` and returns the updated entry.
    ///
    /// Cron entries get their next fire time recomputed from `now` and stay
    /// active. Absolute and delayed entries leave the book and come back with
    /// `active = false`.
    pub fn mark_fired(
        &self,
        book: &mut ScheduleBook,
        id: &ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let mut fired = book
            .get(id)
            .filter(|entry| entry.active)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound(id.clone()))?;
        fired.fire_count += 1;
        fired.last_fired_at = Some(now);

        let FireSpec::Cron { expression } = &fired.spec else {
            fired.active = false;
            book.replace(book.entries.iter().filter(|entry| &entry.id != id).cloned().collect());
            return Ok(fired);
        };

        // Only `cancel` removes a cron entry.
        let cron = CronExpression::parse(expression)
            .map_err(|error| ScheduleError::InvalidSchedule(error.to_string()))?;
        fired.next_fire_at = next_cron_fire(&cron, &fired.id, now);
        book.replace(
            book.entries
                .iter()
                .map(|entry| if &entry.id == id { fired.clone() } else { entry.clone() })
                .collect(),
        );

        Ok(fired)
    }

    /// Builds the call a firing entry hands to the orchestrator. Every fire
    /// gets a fresh call id.
    pub fn synthesize_call(&self, entry: &ScheduleEntry) -> ToolCallRequest {
        ToolCallRequest {
            call_id: CallId::generate(),
            tool_name: entry.payload.tool_name.clone(),
            arguments: entry.payload.arguments.clone(),
            origin_turn: 0,
        }
    }
}

/// Next fire time for a recurring entry. A miss inside the search horizon
/// parks the entry at the horizon's end instead of dropping it.
fn next_cron_fire(cron: &CronExpression, id: &ScheduleId, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(next_fire_at) = cron.next_after(now) {
        return next_fire_at;
    }
    let parked_until = now + Duration::days(SEARCH_HORIZON_DAYS);
    warn!(
        event_name = "scheduler.schedule.cron_horizon_exhausted",
        schedule_id = %id,
        expression = cron.source(),
        parked_until = %parked_until,
        "no cron match inside the search horizon; entry kept active"
    );
    parked_until
}

fn fire_spec_for(
    request: &ScheduleRequest,
    now: DateTime<Utc>,
) -> Result<(FireSpec, DateTime<Utc>), ScheduleError> {
    let provided = [
        request.iso_timestamp.is_some(),
        request.delay_seconds.is_some(),
        request.cron_expression.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    if provided != 1 {
        return Err(ScheduleError::InvalidSchedule(format!(
            "exactly one of isoTimestamp, delaySeconds or cronExpression is required, found {provided}"
        )));
    }

    match request.kind {
        ScheduleKind::Absolute => {
            let raw = request.iso_timestamp.as_deref().ok_or_else(|| mismatch(request.kind))?;
            let at = DateTime::parse_from_rfc3339(raw.trim())
                .map_err(|error| {
                    ScheduleError::InvalidSchedule(format!("`{raw}` is not an RFC 3339 timestamp: {error}"))
                })?
                .with_timezone(&Utc);
            Ok((FireSpec::Absolute { at }, at))
        }
        ScheduleKind::Delayed => {
            let seconds = request.delay_seconds.ok_or_else(|| mismatch(request.kind))?;
            if seconds < 0 {
                return Err(ScheduleError::InvalidSchedule(format!(
                    "delay must not be negative, got {seconds}s"
                )));
            }
            let delay = Duration::try_seconds(seconds).ok_or_else(|| {
                ScheduleError::InvalidSchedule(format!("delay of {seconds}s is out of range"))
            })?;
            let fire_at = now.checked_add_signed(delay).ok_or_else(|| {
                ScheduleError::InvalidSchedule(format!("delay of {seconds}s is out of range"))
            })?;
            Ok((FireSpec::Delayed { seconds }, fire_at))
        }
        ScheduleKind::Cron => {
            let raw = request.cron_expression.as_deref().ok_or_else(|| mismatch(request.kind))?;
            let expression = CronExpression::parse(raw)
                .map_err(|error| ScheduleError::InvalidSchedule(error.to_string()))?;
            let first = expression.next_after(now).ok_or_else(|| {
                ScheduleError::InvalidSchedule(format!("cron expression `{raw}` never fires"))
            })?;
            Ok((FireSpec::Cron { expression: expression.source().to_string() }, first))
        }
    }
}

fn mismatch(kind: ScheduleKind) -> ScheduleError {
    let expected = match kind {
        ScheduleKind::Absolute => "isoTimestamp",
        ScheduleKind::Delayed => "delaySeconds",
        ScheduleKind::Cron => "cronExpression",
    };
    ScheduleError::InvalidSchedule(format!("{} schedules require {expected}", kind.as_str()))
}
