//! Prometheus metrics for the orchestrator

use crate::error::Result;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Collector owning the registry and the orchestrator's counters.
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Registry,
    pub players_queued: IntCounter,
    pub full_flushes: IntCounter,
    pub partial_flushes: IntCounter,
    pub sessions_created: IntCounter,
    pub sessions_ended: IntCounter,
    pub provisioning_failures: IntCounter,
    pub teardown_failures: IntCounter,
    pub orphans_cleaned: IntCounter,
    pub queue_depth: IntGauge,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let players_queued = IntCounter::new(
            "broker_players_queued_total",
            "Players admitted to the matchmaking queue",
        )?;
        let full_flushes = IntCounter::new(
            "broker_full_flushes_total",
            "Queue flushes at full session size",
        )?;
        let partial_flushes = IntCounter::new(
            "broker_partial_flushes_total",
            "Wait-based partial queue flushes",
        )?;
        let sessions_created =
            IntCounter::new("broker_sessions_created_total", "Sessions persisted")?;
        let sessions_ended = IntCounter::new("broker_sessions_ended_total", "Sessions ended")?;
        let provisioning_failures = IntCounter::new(
            "broker_provisioning_failures_total",
            "Compute unit allocations that failed outright",
        )?;
        let teardown_failures = IntCounter::new(
            "broker_teardown_failures_total",
            "Compute unit teardowns that exhausted retries",
        )?;
        let orphans_cleaned = IntCounter::new(
            "broker_orphans_cleaned_total",
            "Orphaned compute units removed by reconciliation",
        )?;
        let queue_depth =
            IntGauge::new("broker_queue_depth", "Players currently waiting in queue")?;

        registry.register(Box::new(players_queued.clone()))?;
        registry.register(Box::new(full_flushes.clone()))?;
        registry.register(Box::new(partial_flushes.clone()))?;
        registry.register(Box::new(sessions_created.clone()))?;
        registry.register(Box::new(sessions_ended.clone()))?;
        registry.register(Box::new(provisioning_failures.clone()))?;
        registry.register(Box::new(teardown_failures.clone()))?;
        registry.register(Box::new(orphans_cleaned.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            players_queued,
            full_flushes,
            partial_flushes,
            sessions_created,
            sessions_ended,
            provisioning_failures,
            teardown_failures,
            orphans_cleaned,
            queue_depth,
        })
    }

    /// Encode all registered metrics in the Prometheus text format.
    pub fn export(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
