use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use switchyard_core::{ConversationId, ConversationState};

pub mod conversation;
pub mod memory;

pub use conversation::SqlConversationStateRepository;
pub use memory::InMemoryConversationStateRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(
        "conversation `{conversation_id}` was modified concurrently \
         (expected version {expected}, found {found})"
    )]
    Conflict { conversation_id: ConversationId, expected: u64, found: u64 },
}

impl RepositoryError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Decode(_) => "decode",
            Self::Conflict { .. } => "conflict",
        }
    }
}

/// Durable home of conversation snapshots.
///
/// `save` replaces the stored snapshot whole. The caller passes the
/// `state_version` it loaded (0 for a conversation never saved); a mismatch
/// with the stored version is a [`RepositoryError::Conflict`]. On success the
/// new version is returned and the caller should adopt it.
#[async_trait]
pub trait ConversationStateRepository: Send + Sync {
    async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError>;

    async fn save(&self, state: &ConversationState) -> Result<u64, RepositoryError>;

    async fn list_conversations(&self) -> Result<Vec<ConversationId>, RepositoryError>;

    /// Conversations holding at least one active schedule entry due at `now`.
    async fn list_due_conversations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ConversationId>, RepositoryError>;
}
