//! Error types for the matchmaking and allocation service
//!
//! This module defines all error types using anyhow for consistent error
//! handling throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific orchestration scenarios
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Queue store unavailable: {message}")]
    QueueUnavailable { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session store error: {message}")]
    SessionStoreFailed { message: String },

    #[error("Provisioning failed for session {session_id}: {message}")]
    ProvisioningFailed {
        session_id: String,
        message: String,
    },

    #[error("Teardown failed for session {session_id}: {message}")]
    TeardownFailed {
        session_id: String,
        message: String,
    },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
