//! TCP server for one arena
//!
//! Accepts persistent client connections, runs the line protocol against the
//! shared [`Arena`] state, and exits the process-owning run loop when the
//! match stops. Shutdown also races safely against the orchestrator's
//! external teardown of the compute unit: whichever side closes first, the
//! other observes ordinary connection/listener closure.

use crate::arena::protocol::{self, Command};
use crate::arena::state::{Arena, MatchPhase};
use crate::error::Result;
use anyhow::Context;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Startup parameters passed by the provisioner to each compute unit.
#[derive(Debug, Clone)]
pub struct ArenaSettings {
    pub session_id: String,
    pub players: Vec<String>,
    pub port: u16,
}

impl ArenaSettings {
    /// Read `SESSION_ID`, `PLAYERS` (JSON array) and `PORT` from the
    /// environment.
    pub fn from_env() -> Result<Self> {
        let session_id = env::var("SESSION_ID").unwrap_or_else(|_| "unknown".to_string());
        let players = match env::var("PLAYERS") {
            Ok(raw) => serde_json::from_str(&raw).context("Invalid PLAYERS value")?,
            Err(_) => Vec::new(),
        };
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT value: {raw}"))?,
            Err(_) => 8080,
        };
        Ok(Self {
            session_id,
            players,
            port,
        })
    }
}

/// Listening arena server bound to a local address.
pub struct ArenaServer {
    arena: Arc<Arena>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ArenaServer {
    pub async fn bind(addr: impl ToSocketAddrs, arena: Arc<Arena>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            arena,
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the match stops, then close everything.
    ///
    /// Returning from this is the compute unit's natural termination signal.
    pub async fn run(self) -> Result<()> {
        info!("Arena server listening on {}", self.local_addr);
        let mut shutdown = self.arena.shutdown_signal();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tokio::spawn(handle_client(self.arena.clone(), stream, peer));
                        }
                        Err(e) => warn!("Accept failed: {e}"),
                    }
                }
                _ = shutdown_triggered(&mut shutdown) => break,
            }
        }

        drop(self.listener);
        self.arena.close_all().await;
        info!("Arena server stopped");
        Ok(())
    }
}

async fn shutdown_triggered(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn handle_client(arena: Arc<Arena>, stream: TcpStream, peer: SocketAddr) {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let client_id = arena.attach(tx.clone()).await;
    debug!("Client {client_id} connected from {peer}");

    // Writer task: drains this client's line channel so a slow connection
    // never holds the state lock.
    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if write_half
                .write_all(format!("{line}\n").as_bytes())
                .await
                .is_err()
            {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        handle_command(&arena, &tx, &line).await;
    }

    drop(tx);
    if arena.detach(client_id).await {
        info!("Last client disconnected while running; stopping match");
    }
    let _ = writer.await;
    debug!("Client {client_id} disconnected");
}

async fn handle_command(arena: &Arc<Arena>, reply: &mpsc::UnboundedSender<String>, line: &str) {
    match protocol::parse_line(line) {
        Command::GetState => {
            let _ = reply.send(protocol::state_line(arena.phase().await));
        }
        Command::GetRunningLength => {
            let _ = reply.send(protocol::running_length_line(
                arena.running_length_seconds().await,
            ));
        }
        Command::RequestMatch(seconds) => {
            let outcome = arena.request_match(seconds).await;
            let _ = reply.send(protocol::running_length_line(
                outcome.fixed_duration_seconds,
            ));
            if outcome.started {
                info!(
                    "Match started: running for {}s",
                    outcome.fixed_duration_seconds
                );
                arena
                    .broadcast(&protocol::state_line(MatchPhase::Running))
                    .await;
                spawn_countdown(arena.clone(), seconds);
            }
        }
        Command::Unknown => {
            let _ = reply.send(protocol::UNKNOWN_REPLY.to_string());
        }
    }
}

fn spawn_countdown(arena: Arc<Arena>, seconds: f64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        if arena.expire().await {
            info!("Match duration elapsed; stopping");
            arena
                .broadcast(&protocol::state_line(MatchPhase::Stop))
                .await;
            arena.trigger_shutdown();
        }
    });
}
