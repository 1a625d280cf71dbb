//! Production application state
//!
//! Builds every component once at process start with explicit ownership: the
//! durable store (fatal if unreachable), the shared keyed store (optional —
//! its absence selects the degraded in-process queue), the cluster API, the
//! provisioner and the matchmaker.

use crate::config::AppConfig;
use crate::matchmaker::{AdmissionPolicy, Matchmaker};
use crate::metrics::MetricsCollector;
use crate::provision::{KubeClusterApi, Provisioner, ProvisionerConfig};
use crate::queue::{LocalQueueStore, QueueStore, RedisQueueStore};
use crate::store::{ActiveSessionIndex, PgSessionStore, SessionStore};
use redis::aio::MultiplexedConnection;
use std::env;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Coarse service health as reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Degraded,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Degraded => "degraded",
        }
    }
}

/// Main application state containing all service components.
pub struct AppState {
    config: AppConfig,
    matchmaker: Arc<Matchmaker>,
    metrics: Arc<MetricsCollector>,
    store: Arc<dyn SessionStore>,
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl AppState {
    /// Initialize the application with all dependencies.
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing arena-broker service components");

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {e}"),
            }
        })?);

        let store: Arc<dyn SessionStore> = Arc::new(
            PgSessionStore::connect(&config.postgres.url, config.postgres.max_connections)
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Session store unavailable: {e}"),
                })?,
        );

        let redis_conn = Self::connect_redis(&config).await;
        let queue: Arc<dyn QueueStore> = match &redis_conn {
            Some(conn) => Arc::new(RedisQueueStore::with_connection(
                conn.clone(),
                config.matchmaking.queue_entry_ttl_seconds,
            )),
            None => {
                warn!(
                    "Shared store unavailable; using in-process queue \
                     (single-replica degraded mode)"
                );
                Arc::new(LocalQueueStore::new())
            }
        };
        let index =
            ActiveSessionIndex::new(redis_conn, config.matchmaking.index_ttl_seconds);

        let cluster = KubeClusterApi::connect(
            config.cluster.namespace.clone(),
            config.cluster.unit_image.clone(),
        )
        .await
        .map_err(|e| ServiceError::Initialization {
            message: format!("Cluster API unavailable: {e}"),
        })?;
        let provisioner = Arc::new(Provisioner::new(
            Arc::new(cluster),
            ProvisionerConfig {
                unit_port: config.cluster.unit_port,
                connect_host_override: config.cluster.connect_host_override.clone(),
                ..ProvisionerConfig::default()
            },
        ));

        let backend_instance = env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
        let matchmaker = Arc::new(Matchmaker::new(
            queue,
            store.clone(),
            index,
            provisioner,
            AdmissionPolicy::from_settings(&config.matchmaking),
            backend_instance,
            metrics.clone(),
        ));

        // The periodic sweep fires wait-based partial flushes even when no
        // new player joins to re-trigger the admission policy.
        let sweeper = {
            let matchmaker = matchmaker.clone();
            let interval = config.flush_sweep_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    match matchmaker.flush_if_due().await {
                        Ok(Some(reply)) => {
                            info!("Sweep flushed session {}", reply.session_id);
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Flush sweep failed: {e}"),
                    }
                }
            })
        };

        Ok(Self {
            config,
            matchmaker,
            metrics,
            store,
            background_tasks: vec![sweeper],
        })
    }

    /// Abort background tasks during graceful shutdown.
    pub fn stop_background_tasks(&self) {
        for task in &self.background_tasks {
            task.abort();
        }
    }

    async fn connect_redis(config: &AppConfig) -> Option<MultiplexedConnection> {
        let attempt = async {
            let client = redis::Client::open(config.redis.url.as_str())?;
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
            Ok::<_, redis::RedisError>(conn)
        };

        match tokio::time::timeout(config.redis_connect_timeout(), attempt).await {
            Ok(Ok(conn)) => {
                info!("Connected to shared store at {}", config.redis.url);
                Some(conn)
            }
            Ok(Err(e)) => {
                warn!("Shared store connection failed: {e}; continuing without it");
                None
            }
            Err(_) => {
                warn!(
                    "Shared store connection timed out after {:?}; continuing without it",
                    config.redis_connect_timeout()
                );
                None
            }
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Probe the durable store so health reflects its availability.
    pub async fn health(&self) -> HealthStatus {
        match self.store.session("health-probe").await {
            Ok(_) => HealthStatus::Ok,
            Err(_) => HealthStatus::Degraded,
        }
    }
}
