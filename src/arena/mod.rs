//! Authoritative per-session protocol server
//!
//! One arena runs inside each provisioned compute unit and owns match
//! progression independently of the orchestrator: open -> running -> stop,
//! driven by connected clients over a line-oriented text protocol.

pub mod protocol;
pub mod server;
pub mod state;

pub use protocol::Command;
pub use server::{ArenaServer, ArenaSettings};
pub use state::{Arena, MatchPhase};
