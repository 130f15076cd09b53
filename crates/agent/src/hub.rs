//! Per-conversation serialization.
//!
//! Every mutation of a conversation happens while holding that
//! conversation's guard, so dispatch, resolve, and tick never interleave on
//! the same snapshot. Different conversations proceed in parallel. A
//! conversation's lock is evicted once its last guard drops and nobody is
//! waiting on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

use switchyard_core::ConversationId;

type LockMap = HashMap<ConversationId, Arc<Mutex<()>>>;

#[derive(Clone, Default)]
pub struct ConversationHub {
    locks: Arc<StdMutex<LockMap>>,
}

/// Held for the duration of one conversation mutation.
pub struct ConversationGuard {
    guard: Option<OwnedMutexGuard<()>>,
    conversation_id: ConversationId,
    locks: Arc<StdMutex<LockMap>>,
}

impl ConversationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, conversation_id: &ConversationId) -> ConversationGuard {
        let lock = Arc::clone(lock_map(&self.locks).entry(conversation_id.clone()).or_default());
        ConversationGuard {
            guard: Some(lock.lock_owned().await),
            conversation_id: conversation_id.clone(),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Conversations that currently have a holder or a waiter.
    pub fn tracked(&self) -> usize {
        lock_map(&self.locks).len()
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = lock_map(&self.locks);
        // The map holds the only remaining reference once no waiter has cloned it.
        let idle = locks
            .get(&self.conversation_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.conversation_id);
        }
    }
}

fn lock_map(locks: &StdMutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use switchyard_core::ConversationId;

    use super::ConversationHub;

    #[tokio::test]
    async fn same_conversation_is_serialized() {
        let hub = ConversationHub::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let hub = hub.clone();
            let inside = Arc::clone(&inside);
            let peak = Arc::clone(&peak);
            tasks.spawn(async move {
                let _guard = hub.lock(&ConversationId("conv-1".into())).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while tasks.join_next().await.is_some() {}

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(hub.tracked(), 0);
    }

    #[tokio::test]
    async fn released_conversations_are_evicted() {
        let hub = ConversationHub::new();
        for index in 0..50 {
            let _guard = hub.lock(&ConversationId(format!("conv-{index}"))).await;
            assert_eq!(hub.tracked(), 1);
        }
        assert_eq!(hub.tracked(), 0);

        let first = hub.lock(&ConversationId("conv-held".into())).await;
        let waiter = {
            let hub = hub.clone();
            tokio::spawn(async move {
                let _guard = hub.lock(&ConversationId("conv-held".into())).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(hub.tracked(), 1, "a waiting task keeps the lock alive");

        waiter.await.expect("waiter finishes");
        assert_eq!(hub.tracked(), 0);
    }

    #[tokio::test]
    async fn different_conversations_do_not_block_each_other() {
        let hub = ConversationHub::new();
        let _first = hub.lock(&ConversationId("conv-a".into())).await;

        let second = tokio::time::timeout(
            Duration::from_millis(200),
            hub.lock(&ConversationId("conv-b".into())),
        )
        .await;

        assert!(second.is_ok());
    }
}
