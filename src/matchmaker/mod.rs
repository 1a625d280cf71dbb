//! Matchmaking orchestration
//!
//! Admission policy over the queue store plus the manager that drives
//! session creation through the session store and the provisioner.

pub mod admission;
pub mod manager;

pub use admission::{AdmissionPolicy, FlushDecision};
pub use manager::Matchmaker;
