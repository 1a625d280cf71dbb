//! HTTP surface of the orchestrator
//!
//! Consumed by the edge-forwarding service. Join and status never expose
//! internal error detail; administrative endpoints surface counts and
//! best-effort partial success.

use crate::error::Result;
use crate::service::app::AppState;
use crate::types::JoinRequest;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Build the orchestrator router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/match/join", post(join_handler))
        .route("/match/status", get(status_handler))
        .route("/match/{session_id}/end", post(end_handler))
        .route("/sessions/active", get(active_sessions_handler))
        .route("/cleanup/orphaned-units", post(cleanup_handler))
        .with_state(state)
}

/// Serve the router until the shutdown future resolves.
pub async fn serve(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("Orchestrator HTTP surface listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Orchestrator HTTP surface stopped");
    Ok(())
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "arena-broker",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/health",
            "/metrics",
            "/match/join",
            "/match/status",
            "/sessions/active",
            "/cleanup/orphaned-units",
        ]
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.health().await;
    Json(json!({ "status": status.as_str() }))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics().export() {
        Ok(text) => text.into_response(),
        Err(e) => {
            error!("Metrics export failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "export failed").into_response()
        }
    }
}

async fn join_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JoinRequest>,
) -> Response {
    if request.player_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "player_id is required" })),
        )
            .into_response();
    }

    match state.matchmaker().join(&request.player_id).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            error!("Join failed for player '{}': {e}", request.player_id);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "matchmaking temporarily unavailable" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    player_id: String,
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Response {
    match state.matchmaker().status(&query.player_id).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            error!("Status lookup failed for player '{}': {e}", query.player_id);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "status temporarily unavailable" })),
            )
                .into_response()
        }
    }
}

async fn end_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    match state.matchmaker().end(&session_id).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string(), "session_id": session_id })),
        )
            .into_response(),
    }
}

async fn active_sessions_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.matchmaker().active_sessions().await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            error!("Active-session listing failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "listing temporarily unavailable" })),
            )
                .into_response()
        }
    }
}

async fn cleanup_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.matchmaker().cleanup_orphans().await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            error!("Orphan cleanup sweep failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
