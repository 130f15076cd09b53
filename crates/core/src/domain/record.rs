use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row in a sample-domain backend (expenses, invoices, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::String(self.id.0.clone()));
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        object.insert("createdAt".to_string(), Value::String(self.created_at.to_rfc3339()));
        object.insert("updatedAt".to_string(), Value::String(self.updated_at.to_rfc3339()));
        Value::Object(object)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordFilter {
    /// Field name and the exact value it must hold.
    pub equals: Vec<(String, Value)>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn field_equals(mut self, name: impl Into<String>, value: Value) -> Self {
        self.equals.push((name.into(), value));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.equals.iter().all(|(name, expected)| record.field(name) == Some(expected))
    }
}
