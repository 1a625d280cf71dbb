//! The matchmaking manager
//!
//! Owns the join/status/end lifecycle: evaluates the admission policy after
//! every enqueue, persists flushed sessions before the blocking provisioning
//! call, publishes connect endpoints, and keeps session end idempotent.

use crate::error::Result;
use crate::matchmaker::admission::{AdmissionPolicy, FlushDecision};
use crate::metrics::MetricsCollector;
use crate::provision::Provisioner;
use crate::queue::QueueStore;
use crate::store::{ActiveSessionIndex, NewSession, SessionStore};
use crate::types::{
    ActiveSessionEntry, ActiveSessionsReply, CleanupReply, EndReply, JoinReply, PlayerId,
    StatusReply,
};
use crate::utils::generate_session_id;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Orchestrates queue admission, session persistence and provisioning.
pub struct Matchmaker {
    queue: Arc<dyn QueueStore>,
    store: Arc<dyn SessionStore>,
    index: ActiveSessionIndex,
    provisioner: Arc<Provisioner>,
    policy: AdmissionPolicy,
    /// Identity of this orchestrator replica, recorded on created sessions
    backend_instance: String,
    metrics: Arc<MetricsCollector>,
}

impl Matchmaker {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        store: Arc<dyn SessionStore>,
        index: ActiveSessionIndex,
        provisioner: Arc<Provisioner>,
        policy: AdmissionPolicy,
        backend_instance: String,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            queue,
            store,
            index,
            provisioner,
            policy,
            backend_instance,
            metrics,
        }
    }

    /// Enqueue a player and flush a session if the admission policy fires.
    ///
    /// Queue store failures degrade this request to "pending" rather than
    /// surfacing an error; the player simply polls again.
    pub async fn join(&self, player_id: &str) -> Result<JoinReply> {
        self.metrics.players_queued.inc();

        if let Err(e) = self.queue.enqueue(player_id).await {
            warn!("Enqueue failed for player '{player_id}': {e}; reporting pending");
            return Ok(JoinReply::pending(player_id.to_string()));
        }

        match self.flush_if_due().await {
            Ok(Some(reply)) if reply.players.iter().any(|p| p == player_id) => Ok(reply),
            Ok(Some(_)) => {
                // A concurrent drain produced a batch without this player;
                // they stay queued for the next flush.
                Ok(JoinReply::pending(player_id.to_string()))
            }
            Ok(None) => Ok(JoinReply::pending(player_id.to_string())),
            Err(e) => {
                warn!("Queue flush failed: {e}; reporting pending");
                Ok(JoinReply::pending(player_id.to_string()))
            }
        }
    }

    /// Evaluate the admission policy against current queue state and flush a
    /// session if it is due.
    ///
    /// Called after every enqueue and from the periodic sweep, so a
    /// wait-based partial flush fires even when nobody else joins. Returns
    /// the created session's join reply, or `None` when the queue holds.
    pub async fn flush_if_due(&self) -> Result<Option<JoinReply>> {
        let batch_size = match self.evaluate_admission().await? {
            FlushDecision::Hold => return Ok(None),
            FlushDecision::FlushFull(size) => {
                self.metrics.full_flushes.inc();
                size
            }
            FlushDecision::FlushPartial(size) => {
                self.metrics.partial_flushes.inc();
                info!("Wait threshold reached; flushing partial session of {size}");
                size
            }
        };

        let players = self.queue.dequeue_batch(batch_size).await?;
        // A concurrent replica may have drained the queue between the length
        // check and the pop; a short batch still forms a session, an empty
        // one is a no-op.
        if players.is_empty() {
            return Ok(None);
        }

        self.start_session(players).await.map(Some)
    }

    /// Resolve a player's current status.
    ///
    /// Precedence: ended session, then published endpoint (cache first, then
    /// the durable store), then pending.
    pub async fn status(&self, player_id: &str) -> Result<StatusReply> {
        let Some(session) = self.store.latest_session_for_player(player_id).await? else {
            return Ok(StatusReply::pending());
        };

        if session.ended_at.is_some() {
            return Ok(StatusReply::ended(session.session_id));
        }

        if let Some((host, port)) = self.index.endpoint(&session.session_id).await {
            return Ok(StatusReply::matched(session.session_id, host, port));
        }
        if session.has_endpoint() {
            return Ok(StatusReply::matched(
                session.session_id.clone(),
                session.connect_host,
                session.connect_port,
            ));
        }

        Ok(StatusReply::pending())
    }

    /// End a session: tear down its compute unit and mark it ended.
    ///
    /// Idempotent — repeat calls converge on the same terminal state without
    /// error. A teardown failure still marks the session ended (so the
    /// reconciliation sweep can retry destruction later) and is surfaced to
    /// the caller.
    pub async fn end(&self, session_id: &str) -> Result<EndReply> {
        let destroy_result = self.provisioner.destroy(session_id).await;

        if self.store.mark_ended(session_id).await? {
            self.metrics.sessions_ended.inc();
            info!("Session {session_id} ended");
        }
        self.index.remove(session_id).await;

        if let Err(e) = destroy_result {
            self.metrics.teardown_failures.inc();
            error!("Teardown failed for session {session_id}; unit left for reconciliation: {e}");
            return Err(e);
        }

        Ok(EndReply::ended(session_id.to_string()))
    }

    /// List active sessions from the index, falling back to the durable
    /// store when the index is unavailable.
    pub async fn active_sessions(&self) -> Result<ActiveSessionsReply> {
        if let Some(session_ids) = self.index.members().await {
            let mut sessions = Vec::with_capacity(session_ids.len());
            for session_id in session_ids {
                let compute_unit_id = self
                    .index
                    .compute_unit(&session_id)
                    .await
                    .unwrap_or_else(|| "unknown".to_string());
                sessions.push(ActiveSessionEntry {
                    session_id,
                    compute_unit_id,
                });
            }
            return Ok(ActiveSessionsReply {
                count: sessions.len(),
                sessions,
                source: "index".to_string(),
            });
        }

        let sessions: Vec<ActiveSessionEntry> = self
            .store
            .active_sessions()
            .await?
            .into_iter()
            .map(|session| ActiveSessionEntry {
                session_id: session.session_id,
                compute_unit_id: session
                    .compute_unit_id
                    .unwrap_or_else(|| "unknown".to_string()),
            })
            .collect();
        Ok(ActiveSessionsReply {
            count: sessions.len(),
            sessions,
            source: "store".to_string(),
        })
    }

    /// Destroy compute units whose session already ended.
    pub async fn cleanup_orphans(&self) -> Result<CleanupReply> {
        let cleaned = self
            .provisioner
            .reconcile_orphans(self.store.as_ref())
            .await?;
        if cleaned > 0 {
            self.metrics.orphans_cleaned.inc_by(cleaned as u64);
        }
        Ok(CleanupReply { cleaned })
    }

    /// Probe queue depth and head-of-queue wait, then ask the policy.
    async fn evaluate_admission(&self) -> Result<FlushDecision> {
        let queue_length = self.queue.length().await?;
        self.metrics.queue_depth.set(queue_length as i64);
        let oldest_wait = self.queue.oldest_wait_seconds().await?;
        Ok(self
            .policy
            .evaluate(queue_length, Duration::from_secs_f64(oldest_wait)))
    }

    /// Persist a flushed batch as a session, provision its arena and publish
    /// the endpoint.
    async fn start_session(&self, players: Vec<PlayerId>) -> Result<JoinReply> {
        let session_id = generate_session_id();
        info!(
            "Flushing {} players into session {session_id}",
            players.len()
        );

        self.store
            .create_session(&NewSession {
                session_id: session_id.clone(),
                players: players.clone(),
                backend_instance: self.backend_instance.clone(),
            })
            .await?;
        self.metrics.sessions_created.inc();

        // This blocks for up to the readiness deadline. The session is
        // already durable, so a caller that times out loses nothing; it can
        // pick the endpoint up from the status endpoint.
        let allocation = match self.provisioner.allocate(&session_id, &players).await {
            Ok(allocation) => allocation,
            Err(e) => {
                self.metrics.provisioning_failures.inc();
                error!("Provisioning failed for session {session_id}: {e}");
                return Err(e);
            }
        };

        self.store
            .record_endpoint(
                &session_id,
                &allocation.compute_unit_id,
                &allocation.connect_host,
                allocation.connect_port,
            )
            .await?;
        self.index
            .publish(
                &session_id,
                &allocation.compute_unit_id,
                &allocation.connect_host,
                allocation.connect_port,
            )
            .await;

        info!(
            "Session {} ready at {}:{} ({})",
            session_id,
            allocation.connect_host,
            allocation.connect_port,
            allocation.compute_unit_id
        );
        Ok(JoinReply {
            session_id,
            players,
            connect_host: allocation.connect_host,
            connect_port: allocation.connect_port,
        })
    }
}
