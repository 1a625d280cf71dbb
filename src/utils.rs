//! Utility functions for the matchmaking and allocation service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique session ID
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Stable prefix of a session id used to key provisioned resources.
///
/// Eight characters of a v4 UUID are enough to keep concurrently live
/// sessions distinct while staying inside resource-name length limits.
pub fn session_prefix(session_id: &str) -> &str {
    let end = session_id
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(session_id.len());
    &session_id[..end]
}
