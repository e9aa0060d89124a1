//! Authenticated WebSocket upgrade handler.

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::rejection::QueryRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::connection::run_peer;
use crate::app_state::AppState;
use crate::auth::{API_KEY_HEADER, ApiKey, authorize};

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Overrides the server's replay default for this peer.
    pub replay: Option<bool>,
}

/// `GET /`: Authenticate, then upgrade to a relay link.
///
/// The secret is checked before the upgrade and before the query string is
/// looked at; a mismatch answers 401 and no peer is registered. On success the response echoes the server's key
/// so the client can verify it reached the right server.
pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    query: Result<Query<ConnectParams>, QueryRejection>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    tracing::info!(%remote, "new connection");

    if let Err(e) = authorize(state.config.api_key.as_ref(), &headers) {
        tracing::warn!(%remote, "unauthorized connection");
        return e.into_response();
    }

    let Query(params) = match query {
        Ok(query) => query,
        Err(rejection) => return rejection.into_response(),
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let echo = match state.config.api_key.as_ref().map(ApiKey::header_value).transpose() {
        Ok(echo) => echo,
        Err(e) => return e.into_response(),
    };

    let replay = params.replay.unwrap_or(state.config.replay);
    tracing::debug!(%remote, replay, "upgrading connection");

    let mut response = ws
        .on_failed_upgrade(move |e| tracing::warn!(%remote, error = %e, "upgrade failed"))
        .on_upgrade(move |socket| run_peer(socket, remote, replay, state));
    if let Some(value) = echo {
        response.headers_mut().insert(API_KEY_HEADER, value);
    }
    response
}
