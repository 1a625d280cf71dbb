//! Compute provisioning for session arenas
//!
//! Creates and destroys one backing process instance plus its reachable
//! endpoint per session, discovers the externally reachable address, polls
//! for readiness, retries destructive operations with backoff, and
//! reconciles orphaned units against the durable session store.

pub mod cluster;
pub mod kube;

pub use cluster::{ClusterApi, ClusterError, UnitInstance, UnitSpec};
pub use self::kube::KubeClusterApi;

use crate::error::{BrokerError, Result};
use crate::store::SessionStore;
use crate::types::PlayerId;
use crate::utils::session_prefix;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

/// Name prefix for every provisioned unit and its endpoint
pub const UNIT_NAME_PREFIX: &str = "arena-";

/// Bounded retry with exponential backoff for destructive operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before re-running after the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Polling parameters for the post-create readiness wait.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            deadline: Duration::from_secs(45),
        }
    }
}

/// Provisioner behavior knobs.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Port the arena server listens on inside each unit
    pub unit_port: u16,
    /// Explicit connect host handed to clients; overrides node discovery
    pub connect_host_override: Option<String>,
    /// Pause before reading back the externally assigned port
    pub endpoint_read_delay: Duration,
    pub destroy_retry: RetryPolicy,
    pub readiness: ReadinessProbe,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            unit_port: 8080,
            connect_host_override: None,
            endpoint_read_delay: Duration::from_millis(500),
            destroy_retry: RetryPolicy::default(),
            readiness: ReadinessProbe::default(),
        }
    }
}

/// Result of a successful allocation.
///
/// `connect_port` of zero is the recognizable "not yet available" sentinel;
/// clients retry their own connection attempts against it.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub compute_unit_id: String,
    pub connect_host: String,
    pub connect_port: u16,
}

/// Creates and destroys one compute unit per session.
pub struct Provisioner {
    cluster: Arc<dyn ClusterApi>,
    config: ProvisionerConfig,
}

impl Provisioner {
    pub fn new(cluster: Arc<dyn ClusterApi>, config: ProvisionerConfig) -> Self {
        Self { cluster, config }
    }

    /// Deterministic unit name for a session, stable across calls so that
    /// duplicate-create and blind-delete-by-session-id are idempotent.
    pub fn unit_name(session_id: &str) -> String {
        format!("{UNIT_NAME_PREFIX}{}", session_prefix(session_id))
    }

    /// Inverse of [`unit_name`](Self::unit_name): the session-id prefix a
    /// unit was created for, or `None` for resources this service does not
    /// own.
    pub fn session_prefix_of(unit_name: &str) -> Option<&str> {
        unit_name.strip_prefix(UNIT_NAME_PREFIX)
    }

    /// Allocate the backing unit and endpoint for a session and wait for it
    /// to become ready.
    ///
    /// Blocks for up to the readiness deadline (~45s). Readiness timeout is
    /// non-fatal: the endpoint is returned anyway and clients absorb it with
    /// their own connect retries.
    pub async fn allocate(&self, session_id: &str, players: &[PlayerId]) -> Result<Allocation> {
        let name = Self::unit_name(session_id);
        let spec = UnitSpec {
            name: name.clone(),
            session_id: session_id.to_string(),
            players: players.to_vec(),
            port: self.config.unit_port,
        };

        info!("Creating compute unit {name} for session {session_id}");
        match self.cluster.create_unit(&spec).await {
            Ok(()) => {}
            Err(ClusterError::AlreadyExists { .. }) => {
                info!("Compute unit {name} already exists");
            }
            Err(e) => {
                return Err(BrokerError::ProvisioningFailed {
                    session_id: session_id.to_string(),
                    message: e.to_string(),
                }
                .into());
            }
        }

        match self.cluster.create_endpoint(&spec).await {
            Ok(()) => {}
            Err(ClusterError::AlreadyExists { .. }) => {}
            Err(e) => {
                warn!("Failed to create endpoint for {name}: {e}");
                return Ok(Allocation {
                    compute_unit_id: name,
                    connect_host: String::new(),
                    connect_port: 0,
                });
            }
        }

        let connect_port = self.read_endpoint_port(&name).await;
        let connect_host = self.resolve_connect_host().await;

        if !self.wait_until_ready(session_id).await {
            warn!(
                "Compute unit {} not ready within {:?}; clients may need to retry connect",
                name, self.config.readiness.deadline
            );
        }

        Ok(Allocation {
            compute_unit_id: name,
            connect_host,
            connect_port,
        })
    }

    /// Tear down the endpoint and unit for a session.
    ///
    /// Safe to call repeatedly and concurrently: "not found" counts as
    /// success at every step. Exhausting retries on any other error is
    /// surfaced to the caller.
    pub async fn destroy(&self, session_id: &str) -> Result<()> {
        let name = Self::unit_name(session_id);

        match self.cluster.delete_endpoint(&name).await {
            Ok(()) => info!("Deleted endpoint {name}"),
            Err(ClusterError::NotFound { .. }) => {}
            Err(e) => warn!("Failed to delete endpoint {name}: {e}"),
        }

        let attempts = self.config.destroy_retry.max_attempts;
        for attempt in 0..attempts {
            match self.cluster.delete_unit(&name).await {
                Ok(()) => {
                    info!("Deleted compute unit {name}");
                    return Ok(());
                }
                Err(ClusterError::NotFound { .. }) => {
                    info!("Compute unit {name} already deleted");
                    return Ok(());
                }
                Err(e) if attempt + 1 < attempts => {
                    let delay = self.config.destroy_retry.delay_for(attempt);
                    warn!(
                        "Failed to delete {} (attempt {}/{}): {}; retrying in {:?}",
                        name,
                        attempt + 1,
                        attempts,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    error!("Failed to delete {name} after {attempts} attempts: {e}");
                    return Err(BrokerError::TeardownFailed {
                        session_id: session_id.to_string(),
                        message: e.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Destroy units whose session shows `ended_at` in the durable store.
    ///
    /// Repairs teardown calls that failed after the session was marked ended
    /// but before the unit was removed. Best-effort per unit; returns how
    /// many were cleaned.
    pub async fn reconcile_orphans(&self, store: &dyn SessionStore) -> Result<usize> {
        let names = self
            .cluster
            .list_unit_names()
            .await
            .map_err(|e| BrokerError::InternalError {
                message: format!("Failed to list compute units: {e}"),
            })?;

        let mut cleaned = 0;
        for name in names {
            let Some(prefix) = Self::session_prefix_of(&name) else {
                continue;
            };

            let session = match store.session_by_prefix(prefix).await {
                Ok(session) => session,
                Err(e) => {
                    warn!("Orphan lookup failed for unit {name}: {e}");
                    continue;
                }
            };
            let Some(session) = session else { continue };
            if session.ended_at.is_none() {
                continue;
            }

            match self.cluster.delete_endpoint(&name).await {
                Ok(()) | Err(ClusterError::NotFound { .. }) => {}
                Err(e) => warn!("Failed to delete orphaned endpoint {name}: {e}"),
            }
            match self.cluster.delete_unit(&name).await {
                Ok(()) => {
                    info!("Cleaned up orphaned compute unit {name}");
                    cleaned += 1;
                }
                Err(ClusterError::NotFound { .. }) => {}
                Err(e) => warn!("Failed to delete orphaned unit {name}: {e}"),
            }
        }
        Ok(cleaned)
    }

    async fn read_endpoint_port(&self, name: &str) -> u16 {
        // Give the API a moment to reflect the assigned port.
        sleep(self.config.endpoint_read_delay).await;
        match self.cluster.endpoint_port(name).await {
            Ok(port) => port,
            Err(e) => {
                warn!("Could not read endpoint port for {name} yet: {e}");
                0
            }
        }
    }

    async fn resolve_connect_host(&self) -> String {
        if let Some(host) = &self.config.connect_host_override {
            return host.clone();
        }

        match self.cluster.node_address().await {
            Ok(Some(address)) => return address,
            Ok(None) => {}
            Err(e) => warn!("Failed to auto-detect node address for connect host: {e}"),
        }

        warn!("Falling back to localhost for connect host; this may be unreachable for clients");
        "localhost".to_string()
    }

    async fn wait_until_ready(&self, session_id: &str) -> bool {
        let deadline = Instant::now() + self.config.readiness.deadline;
        while Instant::now() < deadline {
            match self.cluster.unit_instances(session_id).await {
                Ok(instances) => {
                    if instances.iter().any(|i| i.running && i.ready) {
                        return true;
                    }
                }
                Err(e) => {
                    warn!("Error while waiting for unit readiness ({session_id}): {e}");
                }
            }
            sleep(self.config.readiness.interval).await;
        }
        false
    }
}
