//! In-process fallback queue
//!
//! Used only when the shared store is unreachable. Safe for concurrent tasks
//! within one replica, but not across replicas — other orchestrator instances
//! cannot see this queue, so running more than one replica in this mode can
//! double-match players.

use crate::error::{BrokerError, Result};
use crate::queue::QueueStore;
use crate::types::PlayerId;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

/// Process-local FIFO with paired enqueue timestamps.
#[derive(Debug, Default)]
pub struct LocalQueueStore {
    entries: Mutex<VecDeque<(PlayerId, Instant)>>,
}

impl LocalQueueStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<(PlayerId, Instant)>>> {
        self.entries.lock().map_err(|_| {
            BrokerError::InternalError {
                message: "Local queue lock poisoned".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl QueueStore for LocalQueueStore {
    async fn enqueue(&self, player_id: &str) -> Result<()> {
        self.locked()?
            .push_back((player_id.to_string(), Instant::now()));
        Ok(())
    }

    async fn length(&self) -> Result<usize> {
        Ok(self.locked()?.len())
    }

    async fn peek_oldest(&self) -> Result<Option<PlayerId>> {
        Ok(self.locked()?.front().map(|(id, _)| id.clone()))
    }

    async fn oldest_wait_seconds(&self) -> Result<f64> {
        Ok(self
            .locked()?
            .front()
            .map(|(_, queued_at)| queued_at.elapsed().as_secs_f64())
            .unwrap_or(0.0))
    }

    async fn dequeue_batch(&self, n: usize) -> Result<Vec<PlayerId>> {
        let mut entries = self.locked()?;
        let take = n.min(entries.len());
        Ok(entries.drain(..take).map(|(id, _)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = LocalQueueStore::new();
        for name in ["a", "b", "c", "d"] {
            queue.enqueue(name).await.unwrap();
        }
        assert_eq!(queue.length().await.unwrap(), 4);
        assert_eq!(queue.peek_oldest().await.unwrap().as_deref(), Some("a"));

        let batch = queue.dequeue_batch(3).await.unwrap();
        assert_eq!(batch, vec!["a", "b", "c"]);
        assert_eq!(queue.length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_short_read_when_fewer_present() {
        let queue = LocalQueueStore::new();
        queue.enqueue("only").await.unwrap();
        let batch = queue.dequeue_batch(12).await.unwrap();
        assert_eq!(batch, vec!["only"]);
        assert!(queue.dequeue_batch(12).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oldest_wait_zero_when_empty() {
        let queue = LocalQueueStore::new();
        assert_eq!(queue.oldest_wait_seconds().await.unwrap(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_wait_tracks_head_entry() {
        let queue = LocalQueueStore::new();
        queue.enqueue("first").await.unwrap();
        tokio::time::advance(std::time::Duration::from_secs(20)).await;
        queue.enqueue("second").await.unwrap();

        let wait = queue.oldest_wait_seconds().await.unwrap();
        assert!(wait >= 20.0);

        queue.dequeue_batch(1).await.unwrap();
        let wait = queue.oldest_wait_seconds().await.unwrap();
        assert!(wait < 1.0);
    }

    #[tokio::test]
    async fn test_concurrent_dequeues_never_overlap() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let queue = Arc::new(LocalQueueStore::new());
        for i in 0..100 {
            queue.enqueue(&format!("p{i}")).await.unwrap();
        }

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.dequeue_batch(10).await.unwrap() })
            })
            .collect();

        let mut seen = HashSet::new();
        for batch in futures::future::join_all(handles).await {
            for player in batch.unwrap() {
                assert!(seen.insert(player), "player dequeued twice");
            }
        }
        assert_eq!(seen.len(), 100);
    }

    proptest! {
        /// A flush batch never contains a player enqueued after any player
        /// excluded from that batch.
        #[test]
        fn prop_batch_is_a_prefix(len in 0usize..40, take in 0usize..50) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            rt.block_on(async {
                let queue = LocalQueueStore::new();
                let ids: Vec<String> = (0..len).map(|i| format!("p{i}")).collect();
                for id in &ids {
                    queue.enqueue(id).await.unwrap();
                }
                let batch = queue.dequeue_batch(take).await.unwrap();
                let expected: Vec<String> = ids.iter().take(take.min(len)).cloned().collect();
                prop_assert_eq!(batch, expected);
                Ok(())
            })?;
        }
    }
}
