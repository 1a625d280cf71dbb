//! Common types used throughout the matchmaking and allocation service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for players
pub type PlayerId = String;

/// Unique identifier for sessions (UUID, stored as text)
pub type SessionId = String;

/// Prefix used by pending tokens returned to players still waiting in queue
pub const PENDING_TOKEN_PREFIX: &str = "pending:";

/// A matched group of players bound to exactly one provisioned compute unit.
///
/// Once `ended_at` is set the record is immutable; a non-empty
/// `connect_host`/`connect_port` pair never changes after it is first
/// recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    /// Ordered players, insertion order = queue order, fixed at creation
    pub players: Vec<PlayerId>,
    /// Identity of the orchestrator replica that created the session
    pub backend_instance: String,
    /// Identity of the provisioned backing process, set once after provisioning
    pub compute_unit_id: Option<String>,
    /// Externally reachable host, empty until provisioned
    pub connect_host: String,
    /// Externally reachable port, zero until provisioned
    pub connect_port: u16,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Whether a complete connect endpoint has been published for this session
    pub fn has_endpoint(&self) -> bool {
        !self.connect_host.is_empty() && self.connect_port != 0
    }
}

/// Player status as reported by the status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Pending,
    Matched,
    Ended,
}

/// Request to join the matchmaking queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub player_id: PlayerId,
}

/// Reply to a join request.
///
/// While the player is still queued, `session_id` carries a pending token
/// embedding the player id so repeated polling recognizes the same player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinReply {
    pub session_id: SessionId,
    pub players: Vec<PlayerId>,
    #[serde(default)]
    pub connect_host: String,
    #[serde(default)]
    pub connect_port: u16,
}

impl JoinReply {
    /// Build the pending reply for a player still waiting in queue
    pub fn pending(player_id: PlayerId) -> Self {
        Self {
            session_id: format!("{PENDING_TOKEN_PREFIX}{player_id}"),
            players: vec![player_id],
            connect_host: String::new(),
            connect_port: 0,
        }
    }
}

/// Reply to a status poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: PlayerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_port: Option<u16>,
}

impl StatusReply {
    pub fn pending() -> Self {
        Self {
            status: PlayerStatus::Pending,
            session_id: None,
            connect_host: None,
            connect_port: None,
        }
    }

    pub fn ended(session_id: SessionId) -> Self {
        Self {
            status: PlayerStatus::Ended,
            session_id: Some(session_id),
            connect_host: None,
            connect_port: None,
        }
    }

    pub fn matched(session_id: SessionId, host: String, port: u16) -> Self {
        Self {
            status: PlayerStatus::Matched,
            session_id: Some(session_id),
            connect_host: Some(host),
            connect_port: Some(port),
        }
    }
}

/// Reply to an end request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndReply {
    pub status: String,
    pub session_id: SessionId,
}

impl EndReply {
    pub fn ended(session_id: SessionId) -> Self {
        Self {
            status: "ended".to_string(),
            session_id,
        }
    }
}

/// One entry in the active-sessions listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSessionEntry {
    pub session_id: SessionId,
    pub compute_unit_id: String,
}

/// Reply to an active-sessions query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSessionsReply {
    pub count: usize,
    pub sessions: Vec<ActiveSessionEntry>,
    /// Which backing store produced the listing ("index" or "store")
    pub source: String,
}

/// Reply to an orphan cleanup sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReply {
    pub cleaned: usize,
}
