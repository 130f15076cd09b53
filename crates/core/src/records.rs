//! Narrow CRUD contract for sample-domain backends.
//!
//! Tools reach external rows only through `RecordStore`; the orchestration
//! core relies on its result/error contract and nothing else. `RecordBook`
//! is the conversation-scoped implementation persisted with the rest of the
//! conversation state. Every mutation computes a new list and replaces the
//! old one whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::record::{Record, RecordFilter, RecordId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record `{0}` not found")]
    NotFound(RecordId),
    #[error("invalid record fields: {0}")]
    Invalid(String),
}

pub trait RecordStore {
    fn create(&mut self, fields: Map<String, Value>, now: DateTime<Utc>) -> Result<Record, RecordError>;
    fn list(&self, filter: &RecordFilter) -> Vec<Record>;
    fn update(
        &mut self,
        id: &RecordId,
        partial: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Record, RecordError>;
    fn delete(&mut self, id: &RecordId) -> Result<Record, RecordError>;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBook {
    records: Vec<Record>,
}

impl RecordBook {
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|record| &record.id == id)
    }
}

fn reject_reserved(fields: &Map<String, Value>) -> Result<(), RecordError> {
    for reserved in ["id", "createdAt", "updatedAt"] {
        if fields.contains_key(reserved) {
            return Err(RecordError::Invalid(format!("`{reserved}` is managed by the store")));
        }
    }
    Ok(())
}

impl RecordStore for RecordBook {
    fn create(&mut self, fields: Map<String, Value>, now: DateTime<Utc>) -> Result<Record, RecordError> {
        reject_reserved(&fields)?;
        let record = Record { id: RecordId::generate(), fields, created_at: now, updated_at: now };

        let mut next = self.records.clone();
        next.push(record.clone());
        self.records = next;
        Ok(record)
    }

    fn list(&self, filter: &RecordFilter) -> Vec<Record> {
        let matching = self.records.iter().filter(|record| filter.matches(record)).cloned();
        match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    fn update(
        &mut self,
        id: &RecordId,
        partial: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Record, RecordError> {
        reject_reserved(&partial)?;
        let position = self
            .records
            .iter()
            .position(|record| &record.id == id)
            .ok_or_else(|| RecordError::NotFound(id.clone()))?;

        let mut updated = self.records[position].clone();
        for (key, value) in partial {
            if value.is_null() {
                updated.fields.remove(&key);
            } else {
                updated.fields.insert(key, value);
            }
        }
        updated.updated_at = now;

        let mut next = self.records.clone();
        next[position] = updated.clone();
        self.records = next;
        Ok(updated)
    }

    fn delete(&mut self, id: &RecordId) -> Result<Record, RecordError> {
        let removed = self.get(id).cloned().ok_or_else(|| RecordError::NotFound(id.clone()))?;
        self.records = self.records.iter().filter(|record| &record.id != id).cloned().collect();
        Ok(removed)
    }
}
