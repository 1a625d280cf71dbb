//! Arena Broker - Matchmaking and session allocation service
//!
//! This crate matches players into fixed-size sessions, provisions one
//! ephemeral compute unit (an arena server) per session through a cluster
//! orchestration API, and tears it down when the session ends. It also
//! contains the authoritative per-session protocol server that owns match
//! state once provisioned.

pub mod arena;
pub mod config;
pub mod error;
pub mod matchmaker;
pub mod metrics;
pub mod provision;
pub mod queue;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{BrokerError, Result};
pub use types::*;

// Re-export key components
pub use matchmaker::{AdmissionPolicy, Matchmaker};
pub use provision::{ClusterApi, Provisioner};
pub use queue::QueueStore;
pub use store::SessionStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
