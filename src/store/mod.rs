//! Durable session storage and the shared active-session index
//!
//! The relational store is the source of truth for sessions; the
//! active-session index is a best-effort, TTL-bounded cache in the shared
//! keyed store used to keep endpoint lookups off the hot path.

pub mod index;
pub mod memory;
pub mod postgres;

pub use index::ActiveSessionIndex;
pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;

use crate::error::Result;
use crate::types::{PlayerId, Session, SessionId};
use async_trait::async_trait;

/// Parameters for a newly flushed session, before provisioning.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: SessionId,
    pub players: Vec<PlayerId>,
    pub backend_instance: String,
}

/// Durable record of sessions.
///
/// Implementations enforce the lifecycle invariants: an ended session is
/// immutable, and a non-empty endpoint is never overwritten.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a freshly flushed session with an empty endpoint.
    async fn create_session(&self, session: &NewSession) -> Result<()>;

    /// Record the provisioned compute unit and its endpoint, exactly once.
    ///
    /// A no-op if the session has ended or already has a non-empty endpoint.
    async fn record_endpoint(
        &self,
        session_id: &str,
        compute_unit_id: &str,
        connect_host: &str,
        connect_port: u16,
    ) -> Result<()>;

    /// Set `ended_at` if it is not already set.
    ///
    /// Returns `true` only for the call that actually ended the session, so
    /// teardown side effects fire at most once.
    async fn mark_ended(&self, session_id: &str) -> Result<bool>;

    /// Fetch a session by id.
    async fn session(&self, session_id: &str) -> Result<Option<Session>>;

    /// Fetch a session whose id starts with `prefix` (reconciliation path).
    async fn session_by_prefix(&self, prefix: &str) -> Result<Option<Session>>;

    /// Most recently created session that includes the player.
    async fn latest_session_for_player(&self, player_id: &str) -> Result<Option<Session>>;

    /// Recent sessions that have not ended, for the index-miss listing path.
    async fn active_sessions(&self) -> Result<Vec<Session>>;
}
