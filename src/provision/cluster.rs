//! Cluster orchestration API seam
//!
//! The provisioner drives this trait rather than a concrete client so every
//! provisioning rule (idempotent create, not-found-as-success teardown,
//! readiness polling, orphan reconciliation) can be exercised against an
//! in-process fake.

use crate::types::PlayerId;
use async_trait::async_trait;

/// Errors from the cluster orchestration API, pre-classified so idempotency
/// decisions live with the provisioner instead of each backend.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Resource already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Resource not found: {name}")]
    NotFound { name: String },

    #[error("Cluster API error: {message}")]
    Api { message: String },
}

/// Desired state of one backing process instance and its endpoint.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    /// Deterministic resource name derived from the session id
    pub name: String,
    pub session_id: String,
    /// Propagated to the unit as startup parameters
    pub players: Vec<PlayerId>,
    /// Port the unit listens on
    pub port: u16,
}

/// Observed state of one instance backing a unit.
#[derive(Debug, Clone, Copy)]
pub struct UnitInstance {
    /// Process has started
    pub running: bool,
    /// Application-level readiness, not just process start
    pub ready: bool,
}

/// Operations consumed from the cluster orchestration API.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create one backing process instance group (desired replicas = 1).
    async fn create_unit(&self, spec: &UnitSpec) -> Result<(), ClusterError>;

    /// Delete a backing process instance group by name.
    async fn delete_unit(&self, name: &str) -> Result<(), ClusterError>;

    /// Create the companion externally-reachable endpoint for a unit.
    async fn create_endpoint(&self, spec: &UnitSpec) -> Result<(), ClusterError>;

    /// Delete the companion endpoint by name.
    async fn delete_endpoint(&self, name: &str) -> Result<(), ClusterError>;

    /// Externally assigned port of the endpoint; 0 while not yet assigned.
    async fn endpoint_port(&self, name: &str) -> Result<u16, ClusterError>;

    /// Instances currently backing the session's unit.
    async fn unit_instances(&self, session_id: &str) -> Result<Vec<UnitInstance>, ClusterError>;

    /// Names of all provisioned units, across sessions.
    async fn list_unit_names(&self) -> Result<Vec<String>, ClusterError>;

    /// A routable node address for clients, if the API exposes one.
    async fn node_address(&self) -> Result<Option<String>, ClusterError>;
}
