use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Key/value memory for one conversation. Last writer wins, no history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMemory {
    entries: BTreeMap<String, String>,
}

impl ConversationMemory {
    pub fn from_entries(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes `key` and returns the value it replaced.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let previous = self.entries.get(&key).cloned();
        let mut next = self.entries.clone();
        next.insert(key, value.into());
        self.replace(next);
        previous
    }

    pub fn forget(&mut self, key: &str) -> Option<String> {
        let previous = self.entries.get(key).cloned()?;
        let mut next = self.entries.clone();
        next.remove(key);
        self.replace(next);
        Some(previous)
    }

    pub fn replace(&mut self, entries: BTreeMap<String, String>) {
        self.entries = entries;
    }
}
