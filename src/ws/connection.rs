//! Per-peer task on the server side.
//!
//! Registers the peer (with replay), runs the shared read loop, and
//! deregisters the peer however the loop ends.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocket;
use futures_util::StreamExt;

use super::endpoint::{FrameReader, FrameWriter};
use super::inbound::{InboundContext, read_loop};
use crate::app_state::AppState;

/// Runs one upgraded peer until it disconnects.
pub async fn run_peer(socket: WebSocket, remote: SocketAddr, replay: bool, state: AppState) {
    let (sink, stream) = socket.split();
    let writer = FrameWriter::shared(sink, state.config.write_timeout);
    let mut reader = FrameReader::new(stream);
    let label = format!("Client-{remote}");

    let peer_id = match state
        .registry
        .join(label.clone(), Arc::clone(&writer), replay)
        .await
    {
        Ok(peer_id) => peer_id,
        Err(e) => {
            tracing::warn!(peer = %label, error = %e, "dropping peer during replay");
            return;
        }
    };
    tracing::info!(peer = %label, %peer_id, "peer joined");

    let ctx = InboundContext {
        gateway: Arc::clone(&state.gateway),
        actions: state.actions.clone(),
        peer: label.clone(),
        acknowledge: state.config.acknowledge,
    };

    match read_loop(&mut reader, writer.as_ref(), &ctx).await {
        Ok(()) => tracing::info!(peer = %label, "peer disconnected"),
        Err(e) => tracing::warn!(peer = %label, error = %e, "dropping peer"),
    }
    state.registry.remove(peer_id).await;
}
