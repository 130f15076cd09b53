use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};
use tracing::debug;

use switchyard_core::domain::schedule::SchedulePayload;
use switchyard_core::{
    CallId, CallLedger, CallOrigin, CallOutcome, CallTransition, ConversationId,
    ConversationMemory, ConversationState, FireSpec, Record, RecordBook, RecordId, ScheduleBook,
    ScheduleEntry, ScheduleId, ScheduleKind, ToolCallState, ToolCallStatus,
};

use super::{ConversationStateRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationStateRepository {
    pool: DbPool,
}

impl SqlConversationStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationStateRepository for SqlConversationStateRepository {
    async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let Some(row) = sqlx::query(
            "SELECT id, state_version, next_schedule_sequence, created_at, updated_at
             FROM conversation
             WHERE id = ?",
        )
        .bind(&conversation_id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let state_version = parse_u64("state_version", row.try_get("state_version")?)?;
        let next_schedule_sequence =
            parse_u64("next_schedule_sequence", row.try_get("next_schedule_sequence")?)?;
        let created_at = parse_timestamp("created_at", row.try_get("created_at")?)?;
        let updated_at = parse_timestamp("updated_at", row.try_get("updated_at")?)?;

        let memory = sqlx::query(
            "SELECT key, value FROM conversation_memory WHERE conversation_id = ? ORDER BY key",
        )
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| -> Result<(String, String), RepositoryError> {
            Ok((row.try_get("key")?, row.try_get("value")?))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

        let records = sqlx::query(
            "SELECT id, fields_json, created_at, updated_at
             FROM conversation_record
             WHERE conversation_id = ?
             ORDER BY position ASC",
        )
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(record_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let schedules = sqlx::query(
            "SELECT
                id,
                sequence,
                kind,
                fire_at,
                delay_seconds,
                cron_expression,
                tool_name,
                arguments_json,
                next_fire_at,
                active,
                fire_count,
                last_fired_at,
                created_at
             FROM schedule_entry
             WHERE conversation_id = ?
             ORDER BY sequence ASC",
        )
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(schedule_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let calls = sqlx::query(
            "SELECT
                call_id,
                sequence,
                tool_name,
                arguments_json,
                arguments_hash,
                origin_kind,
                origin_turn,
                origin_schedule_id,
                status,
                outcome_json,
                state_version,
                created_at,
                resolved_at
             FROM tool_call_state
             WHERE conversation_id = ?
             ORDER BY sequence ASC",
        )
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(call_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let transitions = sqlx::query(
            "SELECT call_id, from_status, to_status, reason, occurred_at
             FROM tool_call_transition
             WHERE conversation_id = ?
             ORDER BY position ASC",
        )
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(transition_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ConversationState {
            conversation_id: conversation_id.clone(),
            memory: ConversationMemory::from_entries(memory),
            records: RecordBook::from_records(records),
            schedules: ScheduleBook::restore(schedules, next_schedule_sequence),
            calls: CallLedger::from_states(calls),
            transitions,
            state_version,
            created_at,
            updated_at,
        }))
    }

    async fn save(&self, state: &ConversationState) -> Result<u64, RepositoryError> {
        let conversation_id = &state.conversation_id.0;
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query("SELECT state_version FROM conversation WHERE id = ?")
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.try_get::<i64, _>("state_version"))
            .transpose()?
            .map(|version| parse_u64("state_version", version))
            .transpose()?
            .unwrap_or(0);

        if stored != state.state_version {
            return Err(RepositoryError::Conflict {
                conversation_id: state.conversation_id.clone(),
                expected: state.state_version,
                found: stored,
            });
        }
        let next_version = stored + 1;

        sqlx::query(
            "INSERT INTO conversation (
                id,
                state_version,
                next_schedule_sequence,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                state_version = excluded.state_version,
                next_schedule_sequence = excluded.next_schedule_sequence,
                updated_at = excluded.updated_at",
        )
        .bind(conversation_id)
        .bind(to_sql_integer("state_version", next_version)?)
        .bind(to_sql_integer("next_schedule_sequence", state.schedules.next_sequence())?)
        .bind(format_timestamp(state.created_at))
        .bind(format_timestamp(state.updated_at))
        .execute(&mut *tx)
        .await?;

        replace_memory(&mut tx, state).await?;
        replace_records(&mut tx, state).await?;
        replace_schedules(&mut tx, state).await?;
        replace_calls(&mut tx, state).await?;
        append_transitions(&mut tx, state).await?;

        tx.commit().await?;

        debug!(
            event_name = "db.conversation.saved",
            conversation_id = %state.conversation_id,
            state_version = next_version,
            calls = state.calls.len(),
            schedules = state.schedules.len(),
            "conversation snapshot saved"
        );

        Ok(next_version)
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationId>, RepositoryError> {
        let rows = sqlx::query("SELECT id FROM conversation ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<ConversationId, RepositoryError> {
                Ok(ConversationId(row.try_get("id")?))
            })
            .collect()
    }

    async fn list_due_conversations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ConversationId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT DISTINCT conversation_id
             FROM schedule_entry
             WHERE active = 1 AND next_fire_at <= ?
             ORDER BY conversation_id ASC",
        )
        .bind(format_timestamp(now))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<ConversationId, RepositoryError> {
                Ok(ConversationId(row.try_get("conversation_id")?))
            })
            .collect()
    }
}

async fn replace_memory(
    tx: &mut Transaction<'_, Sqlite>,
    state: &ConversationState,
) -> Result<(), RepositoryError> {
    let conversation_id = &state.conversation_id.0;
    sqlx::query("DELETE FROM conversation_memory WHERE conversation_id = ?")
        .bind(conversation_id)
        .execute(&mut **tx)
        .await?;

    for (key, value) in state.memory.entries() {
        sqlx::query(
            "INSERT INTO conversation_memory (conversation_id, key, value) VALUES (?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(key)
        .bind(value)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn replace_records(
    tx: &mut Transaction<'_, Sqlite>,
    state: &ConversationState,
) -> Result<(), RepositoryError> {
    let conversation_id = &state.conversation_id.0;
    sqlx::query("DELETE FROM conversation_record WHERE conversation_id = ?")
        .bind(conversation_id)
        .execute(&mut **tx)
        .await?;

    for (position, record) in state.records.records().iter().enumerate() {
        sqlx::query(
            "INSERT INTO conversation_record (
                conversation_id,
                id,
                position,
                fields_json,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(&record.id.0)
        .bind(to_sql_integer("position", position as u64)?)
        .bind(encode_json("fields_json", &record.fields)?)
        .bind(format_timestamp(record.created_at))
        .bind(format_timestamp(record.updated_at))
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn replace_schedules(
    tx: &mut Transaction<'_, Sqlite>,
    state: &ConversationState,
) -> Result<(), RepositoryError> {
    let conversation_id = &state.conversation_id.0;
    sqlx::query("DELETE FROM schedule_entry WHERE conversation_id = ?")
        .bind(conversation_id)
        .execute(&mut **tx)
        .await?;

    for entry in state.schedules.entries() {
        let (fire_at, delay_seconds, cron_expression) = match &entry.spec {
            FireSpec::Absolute { at } => (Some(format_timestamp(*at)), None, None),
            FireSpec::Delayed { seconds } => (None, Some(*seconds), None),
            FireSpec::Cron { expression } => (None, None, Some(expression.as_str())),
        };

        sqlx::query(
            "INSERT INTO schedule_entry (
                conversation_id,
                id,
                sequence,
                kind,
                fire_at,
                delay_seconds,
                cron_expression,
                tool_name,
                arguments_json,
                next_fire_at,
                active,
                fire_count,
                last_fired_at,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(&entry.id.0)
        .bind(to_sql_integer("sequence", entry.sequence)?)
        .bind(entry.kind().as_str())
        .bind(fire_at)
        .bind(delay_seconds)
        .bind(cron_expression)
        .bind(&entry.payload.tool_name)
        .bind(encode_json("arguments_json", &entry.payload.arguments)?)
        .bind(format_timestamp(entry.next_fire_at))
        .bind(entry.active)
        .bind(i64::from(entry.fire_count))
        .bind(entry.last_fired_at.map(format_timestamp))
        .bind(format_timestamp(entry.created_at))
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn replace_calls(
    tx: &mut Transaction<'_, Sqlite>,
    state: &ConversationState,
) -> Result<(), RepositoryError> {
    let conversation_id = &state.conversation_id.0;
    sqlx::query("DELETE FROM tool_call_state WHERE conversation_id = ?")
        .bind(conversation_id)
        .execute(&mut **tx)
        .await?;

    for call in state.calls.in_order() {
        let (origin_turn, origin_schedule_id) = match &call.origin {
            CallOrigin::Model { turn } => (Some(to_sql_integer("origin_turn", *turn)?), None),
            CallOrigin::Schedule { schedule_id } => (None, Some(schedule_id.0.clone())),
        };
        let outcome_json =
            call.outcome.as_ref().map(|outcome| encode_json("outcome_json", outcome)).transpose()?;

        sqlx::query(
            "INSERT INTO tool_call_state (
                conversation_id,
                call_id,
                sequence,
                tool_name,
                arguments_json,
                arguments_hash,
                origin_kind,
                origin_turn,
                origin_schedule_id,
                status,
                outcome_json,
                state_version,
                created_at,
                resolved_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(&call.call_id.0)
        .bind(to_sql_integer("sequence", call.sequence)?)
        .bind(&call.tool_name)
        .bind(encode_json("arguments_json", &call.arguments)?)
        .bind(&call.arguments_hash)
        .bind(call.origin.as_str())
        .bind(origin_turn)
        .bind(origin_schedule_id)
        .bind(call.status.as_str())
        .bind(outcome_json)
        .bind(i64::from(call.state_version))
        .bind(format_timestamp(call.created_at))
        .bind(call.resolved_at.map(format_timestamp))
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Transitions are append-only; rows already stored are left untouched.
async fn append_transitions(
    tx: &mut Transaction<'_, Sqlite>,
    state: &ConversationState,
) -> Result<(), RepositoryError> {
    let conversation_id = &state.conversation_id.0;

    for (position, transition) in state.transitions.iter().enumerate() {
        sqlx::query(
            "INSERT INTO tool_call_transition (
                conversation_id,
                position,
                call_id,
                from_status,
                to_status,
                reason,
                occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(conversation_id, position) DO NOTHING",
        )
        .bind(conversation_id)
        .bind(to_sql_integer("position", position as u64)?)
        .bind(&transition.call_id.0)
        .bind(transition.from_status.as_ref().map(ToolCallStatus::as_str))
        .bind(transition.to_status.as_str())
        .bind(&transition.reason)
        .bind(format_timestamp(transition.occurred_at))
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

fn record_from_row(row: SqliteRow) -> Result<Record, RepositoryError> {
    Ok(Record {
        id: RecordId(row.try_get("id")?),
        fields: decode_json("fields_json", row.try_get("fields_json")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn schedule_from_row(row: SqliteRow) -> Result<ScheduleEntry, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = ScheduleKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown schedule kind `{kind_raw}`")))?;

    let spec = match kind {
        ScheduleKind::Absolute => {
            let at = row.try_get::<Option<String>, _>("fire_at")?.ok_or_else(|| {
                RepositoryError::Decode("absolute schedule without `fire_at`".to_string())
            })?;
            FireSpec::Absolute { at: parse_timestamp("fire_at", at)? }
        }
        ScheduleKind::Delayed => FireSpec::Delayed {
            seconds: row.try_get::<Option<i64>, _>("delay_seconds")?.ok_or_else(|| {
                RepositoryError::Decode("delayed schedule without `delay_seconds`".to_string())
            })?,
        },
        ScheduleKind::Cron => FireSpec::Cron {
            expression: row.try_get::<Option<String>, _>("cron_expression")?.ok_or_else(|| {
                RepositoryError::Decode("cron schedule without `cron_expression`".to_string())
            })?,
        },
    };

    Ok(ScheduleEntry {
        id: ScheduleId(row.try_get("id")?),
        sequence: parse_u64("sequence", row.try_get("sequence")?)?,
        spec,
        payload: SchedulePayload {
            tool_name: row.try_get("tool_name")?,
            arguments: decode_json("arguments_json", row.try_get("arguments_json")?)?,
        },
        next_fire_at: parse_timestamp("next_fire_at", row.try_get("next_fire_at")?)?,
        active: row.try_get("active")?,
        fire_count: parse_u32("fire_count", row.try_get("fire_count")?)?,
        last_fired_at: parse_optional_timestamp("last_fired_at", row.try_get("last_fired_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn call_from_row(row: SqliteRow) -> Result<ToolCallState, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = ToolCallStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown call status `{status_raw}`")))?;

    let origin_kind = row.try_get::<String, _>("origin_kind")?;
    let origin = match origin_kind.as_str() {
        "model" => CallOrigin::Model {
            turn: parse_u64("origin_turn", row.try_get::<Option<i64>, _>("origin_turn")?.unwrap_or(0))?,
        },
        "schedule" => CallOrigin::Schedule {
            schedule_id: row
                .try_get::<Option<String>, _>("origin_schedule_id")?
                .map(ScheduleId)
                .ok_or_else(|| {
                    RepositoryError::Decode("scheduled call without `origin_schedule_id`".to_string())
                })?,
        },
        other => return Err(RepositoryError::Decode(format!("unknown call origin `{other}`"))),
    };

    let outcome = row
        .try_get::<Option<String>, _>("outcome_json")?
        .map(|raw| decode_json::<CallOutcome>("outcome_json", raw))
        .transpose()?;

    Ok(ToolCallState {
        call_id: CallId(row.try_get("call_id")?),
        tool_name: row.try_get("tool_name")?,
        arguments: decode_json("arguments_json", row.try_get("arguments_json")?)?,
        arguments_hash: row.try_get("arguments_hash")?,
        origin,
        status,
        outcome,
        sequence: parse_u64("sequence", row.try_get("sequence")?)?,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        resolved_at: parse_optional_timestamp("resolved_at", row.try_get("resolved_at")?)?,
    })
}

fn transition_from_row(row: SqliteRow) -> Result<CallTransition, RepositoryError> {
    let from_status = row
        .try_get::<Option<String>, _>("from_status")?
        .map(|value| {
            ToolCallStatus::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown from_status `{value}`")))
        })
        .transpose()?;

    let to_status_raw = row.try_get::<String, _>("to_status")?;
    let to_status = ToolCallStatus::parse(&to_status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown to_status `{to_status_raw}`")))?;

    Ok(CallTransition {
        call_id: CallId(row.try_get("call_id")?),
        from_status,
        to_status,
        reason: row.try_get("reason")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

/// Fixed-width UTC form so stored instants compare correctly as text.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn encode_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("cannot encode `{column}`: {error}")))
}

fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: String,
) -> Result<T, RepositoryError> {
    serde_json::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid json in `{column}`: `{value}` ({error})"))
    })
}

fn to_sql_integer(column: &str, value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("value for `{column}` exceeds sqlite integer range: {value}"))
    })
}

fn parse_u64(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative integer): {value}"
        ))
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use serde_json::json;

    use switchyard_core::{ConversationId, ConversationState, RecordStore};

    use super::SqlConversationStateRepository;
    use crate::fixtures::seeded_conversation;
    use crate::migrations;
    use crate::repositories::{ConversationStateRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn seeded_snapshot_round_trips_exactly() {
        let pool = setup_pool().await;
        let repo = SqlConversationStateRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T09:00:00.123456789Z");
        let mut state = seeded_conversation("conv-1", now);

        let version = repo.save(&state).await.expect("save");
        assert_eq!(version, 1);
        state.state_version = version;

        let loaded = repo.load(&state.conversation_id).await.expect("load").expect("present");
        assert_eq!(loaded, state);
        assert_eq!(loaded.schedules.next_sequence(), 5);

        pool.close().await;
    }

    #[tokio::test]
    async fn missing_conversation_loads_as_none() {
        let pool = setup_pool().await;
        let repo = SqlConversationStateRepository::new(pool.clone());

        let loaded = repo.load(&ConversationId("nobody".to_string())).await.expect("load");
        assert!(loaded.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn save_replaces_children_and_appends_transitions() {
        let pool = setup_pool().await;
        let repo = SqlConversationStateRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T09:00:00Z");
        let mut state = seeded_conversation("conv-2", now);
        state.state_version = repo.save(&state).await.expect("first save");

        state.memory.forget("name");
        let first = state.records.records()[0].id.clone();
        state.records.delete(&first).expect("delete record");
        state
            .records
            .create(
                json!({"description": "Hotel", "amount": 120}).as_object().cloned().unwrap_or_default(),
                now + Duration::hours(1),
            )
            .expect("create record");
        let next = state.transitions[0].clone();
        state.transitions.push(next);

        state.state_version = repo.save(&state).await.expect("second save");
        assert_eq!(state.state_version, 2);

        let loaded = repo.load(&state.conversation_id).await.expect("load").expect("present");
        assert_eq!(loaded.memory.get("name"), None);
        assert_eq!(loaded.records, state.records);
        assert_eq!(loaded.transitions.len(), 4);
        assert_eq!(loaded, state);

        pool.close().await;
    }

    #[tokio::test]
    async fn stale_version_is_rejected_without_writing() {
        let pool = setup_pool().await;
        let repo = SqlConversationStateRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T09:00:00Z");
        let state = seeded_conversation("conv-3", now);
        repo.save(&state).await.expect("first save");

        let mut stale = state.clone();
        stale.memory.set("name", "Grace");

        match repo.save(&stale).await {
            Err(RepositoryError::Conflict { expected, found, .. }) => {
                assert_eq!((expected, found), (0, 1));
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        let loaded = repo.load(&state.conversation_id).await.expect("load").expect("present");
        assert_eq!(loaded.memory.get("name"), Some("Ada"));

        pool.close().await;
    }

    #[tokio::test]
    async fn due_listing_only_returns_conversations_with_active_due_entries() {
        let pool = setup_pool().await;
        let repo = SqlConversationStateRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T09:00:00Z");

        repo.save(&seeded_conversation("conv-due", now)).await.expect("save seeded");
        repo.save(&ConversationState::new(ConversationId("conv-idle".to_string()), now))
            .await
            .expect("save idle");

        let all = repo.list_conversations().await.expect("list");
        assert_eq!(
            all,
            vec![ConversationId("conv-due".to_string()), ConversationId("conv-idle".to_string())]
        );

        assert!(repo.list_due_conversations(now).await.expect("due now").is_empty());

        let later = now + Duration::seconds(90);
        assert_eq!(
            repo.list_due_conversations(later).await.expect("due later"),
            vec![ConversationId("conv-due".to_string())]
        );

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("timestamp").with_timezone(&Utc)
    }
}
