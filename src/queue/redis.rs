//! Shared queue store backed by Redis
//!
//! The queue itself is a Redis list; each waiting player additionally has a
//! TTL-bounded `matchmaking:queued_at:<player>` record so the admission policy
//! can measure head-of-queue wait and so abandoned entries cannot leak
//! forever. Batch removal uses the atomic multi-pop form of `LPOP`, so two
//! orchestrator replicas draining the queue at once never observe overlapping
//! batches.

use crate::error::{BrokerError, Result};
use crate::queue::QueueStore;
use crate::types::PlayerId;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::{debug, warn};

const QUEUE_KEY: &str = "matchmaking_queue";

fn queued_at_key(player_id: &str) -> String {
    format!("matchmaking:queued_at:{player_id}")
}

fn unix_now() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp_millis() as f64 / 1000.0
}

/// Queue store on the shared Redis instance, safe across orchestrator
/// replicas.
#[derive(Clone)]
pub struct RedisQueueStore {
    conn: MultiplexedConnection,
    entry_ttl_seconds: u64,
}

impl RedisQueueStore {
    /// Connect to Redis and verify the connection with a ping.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        entry_ttl_seconds: u64,
    ) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| BrokerError::QueueUnavailable {
            message: format!("Invalid Redis URL: {e}"),
        })?;

        let conn = tokio::time::timeout(connect_timeout, async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
            Ok::<_, redis::RedisError>(conn)
        })
        .await
        .map_err(|_| BrokerError::QueueUnavailable {
            message: format!("Redis connection timed out after {connect_timeout:?}"),
        })?
        .map_err(|e| BrokerError::QueueUnavailable {
            message: format!("Redis connection failed: {e}"),
        })?;

        debug!("Connected to Redis queue store at {}", url);
        Ok(Self {
            conn,
            entry_ttl_seconds,
        })
    }

    /// Build a store around an already-established connection.
    pub fn with_connection(conn: MultiplexedConnection, entry_ttl_seconds: u64) -> Self {
        Self {
            conn,
            entry_ttl_seconds,
        }
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn enqueue(&self, player_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(QUEUE_KEY, player_id).await?;
        let _: () = conn
            .set_ex(
                queued_at_key(player_id),
                unix_now().to_string(),
                self.entry_ttl_seconds,
            )
            .await?;
        Ok(())
    }

    async fn length(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(QUEUE_KEY).await?;
        Ok(len)
    }

    async fn peek_oldest(&self) -> Result<Option<PlayerId>> {
        let mut conn = self.conn.clone();
        let head: Option<String> = conn.lindex(QUEUE_KEY, 0).await?;
        Ok(head)
    }

    async fn oldest_wait_seconds(&self) -> Result<f64> {
        let Some(player_id) = self.peek_oldest().await? else {
            return Ok(0.0);
        };

        let mut conn = self.conn.clone();
        let queued_at: Option<String> = conn.get(queued_at_key(&player_id)).await?;
        match queued_at.and_then(|raw| raw.parse::<f64>().ok()) {
            Some(ts) => Ok((unix_now() - ts).max(0.0)),
            // Timestamp record expired: the entry is at least TTL old.
            None => Ok(self.entry_ttl_seconds as f64),
        }
    }

    async fn dequeue_batch(&self, n: usize) -> Result<Vec<PlayerId>> {
        let Some(count) = NonZeroUsize::new(n) else {
            return Ok(Vec::new());
        };

        let mut conn = self.conn.clone();
        let players: Vec<String> = conn.lpop(QUEUE_KEY, Some(count)).await?;

        if !players.is_empty() {
            let mut pipe = redis::pipe();
            for player in &players {
                pipe.del(queued_at_key(player)).ignore();
            }
            if let Err(e) = pipe.query_async::<_, ()>(&mut conn).await {
                warn!("Failed to clear queue timestamps after dequeue: {e}");
            }
        }

        Ok(players)
    }
}
