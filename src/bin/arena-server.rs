//! Per-session arena server binary
//!
//! Runs inside each provisioned compute unit. Reads its session identity and
//! player list from the startup environment, serves the line protocol until
//! the match stops, then exits — which is the unit's termination signal.

use anyhow::Result;
use arena_broker::arena::{Arena, ArenaServer, ArenaSettings};
use std::sync::Arc;
use tracing::info;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let settings = ArenaSettings::from_env()?;
    info!(
        "Arena server starting for session {} ({} players expected)",
        settings.session_id,
        settings.players.len()
    );

    let arena = Arc::new(Arena::new());
    let server = ArenaServer::bind(("0.0.0.0", settings.port), arena).await?;
    server.run().await?;

    info!("Arena server for session {} exiting", settings.session_id);
    Ok(())
}
