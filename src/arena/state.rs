//! Match state machine for one arena
//!
//! All mutable state lives behind a single mutex. Clients are represented by
//! unbounded line channels drained by per-connection writer tasks, so a
//! broadcast never blocks the guarded region on a slow or dead client.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::debug;

/// Phase of the match owned by this arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Open,
    Running,
    Stop,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPhase::Open => write!(f, "open"),
            MatchPhase::Running => write!(f, "running"),
            MatchPhase::Stop => write!(f, "stop"),
        }
    }
}

/// Identifier of one live connection.
pub type ClientId = u64;

/// Outcome of a REQUEST_MATCH command.
#[derive(Debug, Clone, Copy)]
pub struct RequestOutcome {
    /// The duration the match is fixed to, in whole seconds — the first
    /// requester's value, regardless of what this requester asked for.
    pub fixed_duration_seconds: u64,
    /// Whether this request was the one that started the match.
    pub started: bool,
}

#[derive(Debug)]
struct MatchState {
    phase: MatchPhase,
    match_duration: Option<f64>,
    running_started_at: Option<Instant>,
    clients: HashMap<ClientId, mpsc::UnboundedSender<String>>,
}

/// Shared, lock-guarded state of one arena process.
pub struct Arena {
    state: Mutex<MatchState>,
    next_client_id: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(MatchState {
                phase: MatchPhase::Open,
                match_duration: None,
                running_started_at: None,
                clients: HashMap::new(),
            }),
            next_client_id: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    /// Receiver that resolves once shutdown has been triggered.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Begin shutdown; idempotent. The value is replaced even with no
    /// subscriber yet, so a later subscriber still observes it.
    pub fn trigger_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Register a connected client.
    pub async fn attach(&self, sender: mpsc::UnboundedSender<String>) -> ClientId {
        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.state.lock().await.clients.insert(client_id, sender);
        client_id
    }

    /// Remove a disconnected client.
    ///
    /// Returns `true` when this was the last client while the match was
    /// running: the match stops immediately and shutdown is triggered — an
    /// abandoned match is not worth keeping alive.
    pub async fn detach(&self, client_id: ClientId) -> bool {
        let stopped = {
            let mut state = self.state.lock().await;
            state.clients.remove(&client_id);
            if state.phase == MatchPhase::Running && state.clients.is_empty() {
                state.phase = MatchPhase::Stop;
                true
            } else {
                false
            }
        };
        if stopped {
            self.trigger_shutdown();
        }
        stopped
    }

    pub async fn phase(&self) -> MatchPhase {
        self.state.lock().await.phase
    }

    /// Fixed match duration in whole seconds; 0 while undecided.
    pub async fn running_length_seconds(&self) -> u64 {
        self.state.lock().await.match_duration.unwrap_or(0.0) as u64
    }

    pub async fn client_count(&self) -> usize {
        self.state.lock().await.clients.len()
    }

    /// Apply a REQUEST_MATCH with an already-validated duration.
    ///
    /// The first requester while the match is open wins; later requests (in
    /// any phase) have no state effect and just observe the fixed duration.
    pub async fn request_match(&self, seconds: f64) -> RequestOutcome {
        let mut state = self.state.lock().await;
        let started = state.match_duration.is_none() && state.phase == MatchPhase::Open;
        if started {
            state.match_duration = Some(seconds);
            state.phase = MatchPhase::Running;
            state.running_started_at = Some(Instant::now());
        }
        RequestOutcome {
            fixed_duration_seconds: state.match_duration.unwrap_or(0.0) as u64,
            started,
        }
    }

    /// Countdown expiry. Transitions to stop only if still running; returns
    /// whether this call performed the transition.
    pub async fn expire(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.phase != MatchPhase::Running {
            return false;
        }
        state.phase = MatchPhase::Stop;
        if let Some(started) = state.running_started_at {
            debug!("Match ran for {:?}", started.elapsed());
        }
        true
    }

    /// Send a line to every connected client.
    ///
    /// A failed send (client already gone) is swallowed and never prevents
    /// delivery to the others.
    pub async fn broadcast(&self, line: &str) {
        let state = self.state.lock().await;
        for sender in state.clients.values() {
            let _ = sender.send(line.to_string());
        }
    }

    /// Drop every client channel, closing the per-connection writer tasks.
    pub async fn close_all(&self) {
        self.state.lock().await.clients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_request_wins() {
        let arena = Arena::new();
        assert_eq!(arena.phase().await, MatchPhase::Open);
        assert_eq!(arena.running_length_seconds().await, 0);

        let first = arena.request_match(10.0).await;
        assert!(first.started);
        assert_eq!(first.fixed_duration_seconds, 10);
        assert_eq!(arena.phase().await, MatchPhase::Running);

        let second = arena.request_match(9999.0).await;
        assert!(!second.started);
        assert_eq!(second.fixed_duration_seconds, 10);
        assert_eq!(arena.running_length_seconds().await, 10);
    }

    #[tokio::test]
    async fn test_request_after_stop_echoes_duration() {
        let arena = Arena::new();
        arena.request_match(30.0).await;
        assert!(arena.expire().await);
        assert_eq!(arena.phase().await, MatchPhase::Stop);

        let outcome = arena.request_match(5.0).await;
        assert!(!outcome.started);
        assert_eq!(outcome.fixed_duration_seconds, 30);
    }

    #[tokio::test]
    async fn test_expire_only_fires_while_running() {
        let arena = Arena::new();
        assert!(!arena.expire().await);
        arena.request_match(10.0).await;
        assert!(arena.expire().await);
        assert!(!arena.expire().await);
    }

    #[tokio::test]
    async fn test_last_disconnect_while_running_stops() {
        let arena = Arena::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let a = arena.attach(tx_a).await;
        let b = arena.attach(tx_b).await;

        arena.request_match(600.0).await;
        assert!(!arena.detach(a).await);
        assert_eq!(arena.phase().await, MatchPhase::Running);

        let mut shutdown = arena.shutdown_signal();
        assert!(arena.detach(b).await);
        assert_eq!(arena.phase().await, MatchPhase::Stop);
        assert!(*shutdown.borrow_and_update());
    }

    #[tokio::test]
    async fn test_disconnect_while_open_does_not_stop() {
        let arena = Arena::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = arena.attach(tx).await;
        assert!(!arena.detach(id).await);
        assert_eq!(arena.phase().await, MatchPhase::Open);
    }

    #[tokio::test]
    async fn test_broadcast_survives_dead_client() {
        let arena = Arena::new();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        arena.attach(tx_dead).await;
        arena.attach(tx_live).await;
        drop(rx_dead);

        arena.broadcast("STATE running").await;
        assert_eq!(rx_live.recv().await.unwrap(), "STATE running");
    }
}
