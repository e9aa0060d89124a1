//! System endpoints: health check and peer listing.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::app_state::AppState;
use crate::auth::authorize;
use crate::domain::PeerSummary;

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    peers: usize,
    buffered: usize,
    timestamp: String,
    version: String,
}

/// `GET /health`: Service health status with peer and buffer counts.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            peers: state.registry.len().await,
            buffered: state.registry.buffered_len().await,
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Peer listing response.
#[derive(Debug, Serialize)]
struct PeersResponse {
    peers: Vec<PeerSummary>,
    count: usize,
}

/// `GET /peers`: Connected peers, oldest first.
///
/// Peer labels carry remote addresses, so this requires the same secret as
/// the upgrade endpoint.
pub async fn peers_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(state.config.api_key.as_ref(), &headers) {
        return e.into_response();
    }
    let peers = state.registry.peers().await;
    let count = peers.len();
    (StatusCode::OK, Json(PeersResponse { peers, count })).into_response()
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/peers", get(peers_handler))
}
