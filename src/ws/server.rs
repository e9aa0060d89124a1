//! Server relay: accepts authenticated peers and fans out broadcasts.
//!
//! [`RelayServer::start`] binds the listener, spawns the Axum server and a
//! broadcaster task that drains the broadcast queue into the
//! [`PeerRegistry`]. The returned handle reports the bound port. On
//! [`RelayServer::shutdown`] or drop it stops both tasks and closes every
//! registered peer.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::api;
use crate::app_state::{AppState, ServerWriter};
use crate::auth::require_key_for;
use crate::config::ServerConfig;
use crate::domain::{ActionGateway, ActionQueue, BroadcastDrain, PeerRegistry, PeerSummary};
use crate::error::RelayError;

/// A running server relay.
#[derive(Debug)]
pub struct RelayServer {
    local_addr: SocketAddr,
    registry: Arc<PeerRegistry<ServerWriter>>,
    serve_task: JoinHandle<()>,
    broadcaster: JoinHandle<()>,
}

impl RelayServer {
    /// Binds the listener and starts serving.
    ///
    /// Port `0` binds an ephemeral port; read it back with
    /// [`RelayServer::port`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MissingApiKey`] when the listen address is not
    /// local and no key is configured (checked before binding), or
    /// [`RelayError::Bind`] if the address cannot be bound.
    pub async fn start(
        config: ServerConfig,
        gateway: Arc<dyn ActionGateway>,
        actions: ActionQueue,
        broadcasts: BroadcastDrain,
    ) -> Result<Self, RelayError> {
        require_key_for(&config.listen, config.api_key.as_ref())?;
        if config.api_key.is_none() {
            tracing::warn!(listen = %config.listen, "no api key configured; accepting every local peer");
        }

        let addr = config.listen.to_string();
        let listener = TcpListener::bind((config.listen.host.as_str(), config.listen.port))
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| RelayError::Bind { addr, source })?;

        // One write deadline covers a peer's entire replay.
        let registry = Arc::new(PeerRegistry::new(
            config.buffer_capacity,
            config.write_timeout,
        ));
        let handshake_timeout = config.handshake_timeout;
        let state = AppState {
            registry: Arc::clone(&registry),
            gateway,
            actions,
            config: Arc::new(config),
        };
        let app = api::build_router(state, handshake_timeout);

        let broadcaster = tokio::spawn(run_broadcaster(Arc::clone(&registry), broadcasts));
        let serve_task = tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                tracing::error!(error = %e, "relay server stopped");
            }
        });

        tracing::info!(addr = %local_addr, "relay server listening");
        Ok(Self {
            local_addr,
            registry,
            serve_task,
            broadcaster,
        })
    }

    /// The bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// The bound socket address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of registered peers.
    pub async fn peer_count(&self) -> usize {
        self.registry.len().await
    }

    /// Number of messages currently held for replay.
    pub async fn buffered(&self) -> usize {
        self.registry.buffered_len().await
    }

    /// Registered peers, oldest first.
    pub async fn peers(&self) -> Vec<PeerSummary> {
        self.registry.peers().await
    }

    /// Stops accepting peers and closes every registered link.
    pub async fn shutdown(self) {
        self.serve_task.abort();
        self.broadcaster.abort();
        self.registry.clear().await;
        tracing::info!(addr = %self.local_addr, "relay server shut down");
    }
}

// Dropping without `shutdown` still stops accepting and closes every
// registered link, so upgraded peers stop feeding the action queue once
// they answer the close.
impl Drop for RelayServer {
    fn drop(&mut self) {
        self.serve_task.abort();
        self.broadcaster.abort();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let registry = Arc::clone(&self.registry);
            runtime.spawn(async move { registry.clear().await });
        }
    }
}

/// Drains the broadcast queue into the registry until every producer is
/// gone.
async fn run_broadcaster(registry: Arc<PeerRegistry<ServerWriter>>, mut broadcasts: BroadcastDrain) {
    while let Some(message) = broadcasts.recv().await {
        let delivered = registry.publish(message).await;
        tracing::debug!(peers = delivered, "broadcast delivered");
    }
    tracing::info!("broadcast queue closed, broadcaster stopped");
}
