use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use switchyard_core::{ConversationId, ConversationState};

use super::{ConversationStateRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryConversationStateRepository {
    conversations: RwLock<HashMap<String, ConversationState>>,
}

#[async_trait::async_trait]
impl ConversationStateRepository for InMemoryConversationStateRepository {
    async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&conversation_id.0).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<u64, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let found = conversations.get(&state.conversation_id.0).map_or(0, |stored| stored.state_version);
        if found != state.state_version {
            return Err(RepositoryError::Conflict {
                conversation_id: state.conversation_id.clone(),
                expected: state.state_version,
                found,
            });
        }

        let mut stored = state.clone();
        stored.state_version = found + 1;
        conversations.insert(stored.conversation_id.0.clone(), stored);
        Ok(found + 1)
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationId>, RepositoryError> {
        let conversations = self.conversations.read().await;
        let mut ids: Vec<ConversationId> =
            conversations.values().map(|state| state.conversation_id.clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_due_conversations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ConversationId>, RepositoryError> {
        let conversations = self.conversations.read().await;
        let mut ids: Vec<ConversationId> = conversations
            .values()
            .filter(|state| state.schedules.entries().iter().any(|entry| entry.is_due(now)))
            .map(|state| state.conversation_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
