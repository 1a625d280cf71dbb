//! Queue store abstractions for matchmaking admission
//!
//! The queue is a shared, atomically-operable FIFO of waiting players plus a
//! per-player enqueue timestamp. The shared implementation lives in Redis so
//! multiple orchestrator replicas can drain it without overlapping batches;
//! the local implementation is a single-replica fallback used when the shared
//! store is unreachable.

pub mod local;
pub mod redis;

pub use local::LocalQueueStore;
pub use self::redis::RedisQueueStore;

use crate::error::Result;
use crate::types::PlayerId;
use async_trait::async_trait;

/// FIFO queue of players waiting for a session.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append a player to the tail of the queue and record their enqueue time.
    async fn enqueue(&self, player_id: &str) -> Result<()>;

    /// Current queue length.
    async fn length(&self) -> Result<usize>;

    /// Player at the head of the queue, if any.
    async fn peek_oldest(&self) -> Result<Option<PlayerId>>;

    /// Seconds the head-of-queue player has been waiting; 0.0 when empty.
    async fn oldest_wait_seconds(&self) -> Result<f64>;

    /// Remove up to `n` players from the head in FIFO order.
    ///
    /// Returns fewer than `n` only if fewer are present at pop time — callers
    /// must tolerate a short read caused by a concurrent drain from another
    /// replica.
    async fn dequeue_batch(&self, n: usize) -> Result<Vec<PlayerId>>;
}
