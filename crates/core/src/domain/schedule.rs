use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScheduleId(pub String);

impl ScheduleId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Absolute,
    Delayed,
    Cron,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::Delayed => "delayed",
            Self::Cron => "cron",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "absolute" | "scheduled" => Some(Self::Absolute),
            "delayed" | "delay" => Some(Self::Delayed),
            "cron" => Some(Self::Cron),
            _ => None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Self::Cron)
    }
}

/// The "when" of a schedule entry, one shape per kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FireSpec {
    Absolute { at: DateTime<Utc> },
    Delayed { seconds: i64 },
    Cron { expression: String },
}

impl FireSpec {
    pub fn kind(&self) -> ScheduleKind {
        match self {
            Self::Absolute { .. } => ScheduleKind::Absolute,
            Self::Delayed { .. } => ScheduleKind::Delayed,
            Self::Cron { .. } => ScheduleKind::Cron,
        }
    }
}

impl fmt::Display for FireSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute { at } => write!(f, "at {}", at.to_rfc3339()),
            Self::Delayed { seconds } => write!(f, "in {seconds}s"),
            Self::Cron { expression } => write!(f, "cron `{expression}`"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulePayload {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: ScheduleId,
    /// Creation order; breaks ties between entries due at the same instant.
    pub sequence: u64,
    pub spec: FireSpec,
    pub payload: SchedulePayload,
    pub next_fire_at: DateTime<Utc>,
    pub active: bool,
    pub fire_count: u32,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduleEntry {
    pub fn kind(&self) -> ScheduleKind {
        self.spec.kind()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.next_fire_at <= now
    }
}

/// Wire shape of a scheduling request:
/// `{kind, one of isoTimestamp | delaySeconds | cronExpression, toolName, arguments}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub kind: ScheduleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ScheduleRequest {
    pub fn absolute(at: DateTime<Utc>, tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            kind: ScheduleKind::Absolute,
            iso_timestamp: Some(at.to_rfc3339()),
            delay_seconds: None,
            cron_expression: None,
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn delayed(seconds: i64, tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            kind: ScheduleKind::Delayed,
            iso_timestamp: None,
            delay_seconds: Some(seconds),
            cron_expression: None,
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn cron(
        expression: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            kind: ScheduleKind::Cron,
            iso_timestamp: None,
            delay_seconds: None,
            cron_expression: Some(expression.into()),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ScheduleKind, ScheduleRequest};

    #[test]
    fn schedule_kind_round_trips_from_storage_encoding() {
        for kind in [ScheduleKind::Absolute, ScheduleKind::Delayed, ScheduleKind::Cron] {
            assert_eq!(ScheduleKind::parse(kind.as_str()), Some(kind));
        }
        assert!(ScheduleKind::Cron.is_recurring());
        assert!(!ScheduleKind::Delayed.is_recurring());
    }

    #[test]
    fn schedule_request_reads_camel_case_wire_shape() {
        let request: ScheduleRequest = serde_json::from_value(json!({
            "kind": "delayed",
            "delaySeconds": 30,
            "toolName": "echo",
            "arguments": {"message": "hi"}
        }))
        .expect("request should deserialize");

        assert_eq!(request.kind, ScheduleKind::Delayed);
        assert_eq!(request.delay_seconds, Some(30));
        assert_eq!(request.iso_timestamp, None);
        assert_eq!(request.tool_name, "echo");
        assert_eq!(request.arguments.get("message"), Some(&json!("hi")));
    }
}
