//! Shared server state injected into all Axum handlers.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;

use crate::config::ServerConfig;
use crate::domain::{ActionGateway, ActionQueue, PeerRegistry};
use crate::ws::endpoint::FrameWriter;

/// Write half of a server-side peer link.
pub type ServerWriter = FrameWriter<SplitSink<WebSocket, Message>, Message>;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live peers and relay buffer.
    pub registry: Arc<PeerRegistry<ServerWriter>>,
    /// Parser for inbound lines.
    pub gateway: Arc<dyn ActionGateway>,
    /// Destination for parsed actions.
    pub actions: ActionQueue,
    /// Server settings.
    pub config: Arc<ServerConfig>,
}
