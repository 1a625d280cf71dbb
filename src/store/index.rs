//! Best-effort active-session index in the shared keyed store
//!
//! Mirrors session_id -> {compute_unit_id, connect_host, connect_port} with a
//! bounded TTL so endpoint lookups and active listings stay off the durable
//! store. Entries may expire or the store may be away entirely; every reader
//! returns `None` in that case and the caller falls back to the durable
//! store. Failures here are logged, never surfaced.

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::warn;

const ACTIVE_SET_KEY: &str = "active_sessions";

fn unit_key(session_id: &str) -> String {
    format!("session:{session_id}:unit")
}

fn host_key(session_id: &str) -> String {
    format!("session:{session_id}:host")
}

fn port_key(session_id: &str) -> String {
    format!("session:{session_id}:port")
}

/// TTL-bounded session -> endpoint cache.
#[derive(Clone)]
pub struct ActiveSessionIndex {
    conn: Option<MultiplexedConnection>,
    ttl_seconds: u64,
}

impl ActiveSessionIndex {
    pub fn new(conn: Option<MultiplexedConnection>, ttl_seconds: u64) -> Self {
        Self { conn, ttl_seconds }
    }

    /// Index that never stores anything; used when the shared store is away.
    pub fn disabled() -> Self {
        Self {
            conn: None,
            ttl_seconds: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    /// Publish or refresh the entry for a session.
    pub async fn publish(&self, session_id: &str, compute_unit_id: &str, host: &str, port: u16) {
        let Some(conn) = &self.conn else { return };
        let mut conn = conn.clone();

        let mut pipe = redis::pipe();
        pipe.sadd(ACTIVE_SET_KEY, session_id).ignore();
        pipe.set_ex(unit_key(session_id), compute_unit_id, self.ttl_seconds)
            .ignore();
        pipe.set_ex(host_key(session_id), host, self.ttl_seconds)
            .ignore();
        pipe.set_ex(port_key(session_id), port.to_string(), self.ttl_seconds)
            .ignore();

        if let Err(e) = pipe.query_async::<_, ()>(&mut conn).await {
            warn!("Failed to publish active-session index entry for {session_id}: {e}");
        }
    }

    /// Cached connect endpoint, if complete.
    pub async fn endpoint(&self, session_id: &str) -> Option<(String, u16)> {
        let mut conn = self.conn.clone()?;

        let host: Option<String> = match conn.get(host_key(session_id)).await {
            Ok(host) => host,
            Err(e) => {
                warn!("Active-session index read failed for {session_id}: {e}");
                return None;
            }
        };
        let port: Option<String> = conn.get(port_key(session_id)).await.ok().flatten();

        let host = host?;
        let port = port?.parse::<u16>().ok()?;
        if host.is_empty() || port == 0 {
            return None;
        }
        Some((host, port))
    }

    /// Cached compute unit id.
    pub async fn compute_unit(&self, session_id: &str) -> Option<String> {
        let mut conn = self.conn.clone()?;
        conn.get(unit_key(session_id)).await.ok().flatten()
    }

    /// Remove the entry on session end.
    pub async fn remove(&self, session_id: &str) {
        let Some(conn) = &self.conn else { return };
        let mut conn = conn.clone();

        let mut pipe = redis::pipe();
        pipe.srem(ACTIVE_SET_KEY, session_id).ignore();
        pipe.del(unit_key(session_id)).ignore();
        pipe.del(host_key(session_id)).ignore();
        pipe.del(port_key(session_id)).ignore();

        if let Err(e) = pipe.query_async::<_, ()>(&mut conn).await {
            warn!("Failed to remove active-session index entry for {session_id}: {e}");
        }
    }

    /// All session ids currently in the active set.
    ///
    /// `None` means the index is unavailable and the caller should list from
    /// the durable store instead.
    pub async fn members(&self) -> Option<Vec<String>> {
        let mut conn = self.conn.clone()?;
        match conn.smembers(ACTIVE_SET_KEY).await {
            Ok(members) => Some(members),
            Err(e) => {
                warn!("Active-session index listing failed: {e}");
                None
            }
        }
    }
}
