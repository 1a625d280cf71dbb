//! In-memory session store
//!
//! Implements the same lifecycle invariants as the Postgres store. Used by
//! tests and by local runs without a relational store.

use crate::error::{BrokerError, Result};
use crate::store::{NewSession, SessionStore};
use crate::types::Session;
use crate::utils::current_timestamp;
use async_trait::async_trait;
use std::sync::Mutex;

/// Session store held in process memory, newest entries last.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<Vec<Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
        }
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, Vec<Session>>> {
        self.sessions.lock().map_err(|_| {
            BrokerError::InternalError {
                message: "Session store lock poisoned".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: &NewSession) -> Result<()> {
        let mut sessions = self.locked()?;
        if sessions
            .iter()
            .any(|s| s.session_id == session.session_id)
        {
            return Err(BrokerError::SessionStoreFailed {
                message: format!("Duplicate session id {}", session.session_id),
            }
            .into());
        }
        sessions.push(Session {
            session_id: session.session_id.clone(),
            players: session.players.clone(),
            backend_instance: session.backend_instance.clone(),
            compute_unit_id: None,
            connect_host: String::new(),
            connect_port: 0,
            created_at: current_timestamp(),
            ended_at: None,
        });
        Ok(())
    }

    async fn record_endpoint(
        &self,
        session_id: &str,
        compute_unit_id: &str,
        connect_host: &str,
        connect_port: u16,
    ) -> Result<()> {
        let mut sessions = self.locked()?;
        if let Some(session) = sessions.iter_mut().find(|s| {
            s.session_id == session_id && s.ended_at.is_none() && s.connect_host.is_empty()
        }) {
            session.compute_unit_id = Some(compute_unit_id.to_string());
            session.connect_host = connect_host.to_string();
            session.connect_port = connect_port;
        }
        Ok(())
    }

    async fn mark_ended(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self.locked()?;
        if let Some(session) = sessions
            .iter_mut()
            .find(|s| s.session_id == session_id && s.ended_at.is_none())
        {
            session.ended_at = Some(current_timestamp());
            return Ok(true);
        }
        Ok(false)
    }

    async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self
            .locked()?
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned())
    }

    async fn session_by_prefix(&self, prefix: &str) -> Result<Option<Session>> {
        Ok(self
            .locked()?
            .iter()
            .rev()
            .find(|s| s.session_id.starts_with(prefix))
            .cloned())
    }

    async fn latest_session_for_player(&self, player_id: &str) -> Result<Option<Session>> {
        Ok(self
            .locked()?
            .iter()
            .rev()
            .find(|s| s.players.iter().any(|p| p == player_id))
            .cloned())
    }

    async fn active_sessions(&self) -> Result<Vec<Session>> {
        Ok(self
            .locked()?
            .iter()
            .rev()
            .filter(|s| s.ended_at.is_none())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session(id: &str, players: &[&str]) -> NewSession {
        NewSession {
            session_id: id.to_string(),
            players: players.iter().map(|p| p.to_string()).collect(),
            backend_instance: "test-backend".to_string(),
        }
    }

    #[tokio::test]
    async fn test_endpoint_is_recorded_once() {
        let store = InMemorySessionStore::new();
        store
            .create_session(&new_session("abc", &["p1"]))
            .await
            .unwrap();

        store
            .record_endpoint("abc", "arena-abc", "10.0.0.1", 30001)
            .await
            .unwrap();
        store
            .record_endpoint("abc", "arena-other", "10.9.9.9", 31000)
            .await
            .unwrap();

        let session = store.session("abc").await.unwrap().unwrap();
        assert_eq!(session.connect_host, "10.0.0.1");
        assert_eq!(session.connect_port, 30001);
        assert_eq!(session.compute_unit_id.as_deref(), Some("arena-abc"));
    }

    #[tokio::test]
    async fn test_mark_ended_is_monotonic() {
        let store = InMemorySessionStore::new();
        store
            .create_session(&new_session("abc", &["p1"]))
            .await
            .unwrap();

        assert!(store.mark_ended("abc").await.unwrap());
        let first_ended_at = store.session("abc").await.unwrap().unwrap().ended_at;

        assert!(!store.mark_ended("abc").await.unwrap());
        let second_ended_at = store.session("abc").await.unwrap().unwrap().ended_at;
        assert_eq!(first_ended_at, second_ended_at);
    }

    #[tokio::test]
    async fn test_ended_session_rejects_endpoint() {
        let store = InMemorySessionStore::new();
        store
            .create_session(&new_session("abc", &["p1"]))
            .await
            .unwrap();
        store.mark_ended("abc").await.unwrap();

        store
            .record_endpoint("abc", "arena-abc", "10.0.0.1", 30001)
            .await
            .unwrap();
        let session = store.session("abc").await.unwrap().unwrap();
        assert!(!session.has_endpoint());
    }

    #[tokio::test]
    async fn test_latest_session_for_player_prefers_newest() {
        let store = InMemorySessionStore::new();
        store
            .create_session(&new_session("old", &["p1", "p2"]))
            .await
            .unwrap();
        store
            .create_session(&new_session("new", &["p1", "p3"]))
            .await
            .unwrap();

        let found = store.latest_session_for_player("p1").await.unwrap().unwrap();
        assert_eq!(found.session_id, "new");
        assert!(store
            .latest_session_for_player("nobody")
            .await
            .unwrap()
            .is_none());
    }
}
