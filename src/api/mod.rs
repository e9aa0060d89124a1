//! HTTP surface of the server relay: the upgrade endpoint plus system
//! routes, composed into one router.

pub mod system;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete router: `GET /` upgrades, system routes alongside.
///
/// Requests that do not produce a response within `handshake_timeout` are
/// answered with 408. Upgraded links are not affected once the 101 has
/// been sent.
pub fn build_router(state: AppState, handshake_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .merge(system::routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    handshake_timeout,
                )),
        )
        .with_state(state)
}
