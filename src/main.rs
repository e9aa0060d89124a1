//! action-relay entry point.
//!
//! Runs one relay role chosen by `RELAY_MODE`. Lines read from stdin are
//! broadcast; actions received from peers are logged.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use action_relay::config::{RelayConfig, RelayMode};
use action_relay::domain::{
    ActionDrain, ActionGateway, BroadcastQueue, LineParser, action_queue, broadcast_queue,
};
use action_relay::ws::client::supervise;
use action_relay::ws::server::RelayServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = RelayConfig::from_env().context("invalid relay configuration")?;
    tracing::info!(mode = ?config.mode, "starting action-relay");

    let gateway: Arc<dyn ActionGateway> = Arc::new(LineParser::new());
    let (actions, action_drain) = action_queue();
    let (broadcasts, broadcast_drain) = broadcast_queue();

    tokio::spawn(log_actions(action_drain));
    tokio::spawn(forward_stdin(broadcasts));

    match config.mode {
        RelayMode::Server => {
            let server =
                RelayServer::start(config.server_config(), gateway, actions, broadcast_drain)
                    .await
                    .context("failed to start server relay")?;
            tracing::info!(port = server.port(), "server relay ready");

            tokio::signal::ctrl_c().await?;
            server.shutdown().await;
        }
        RelayMode::Client => {
            let client_config = config.client_config()?;
            tokio::select! {
                result = supervise(
                    &client_config,
                    config.upstream_policy,
                    gateway,
                    actions,
                    broadcast_drain,
                ) => result.context("client relay stopped")?,
                signal = tokio::signal::ctrl_c() => signal?,
            }
        }
    }

    tracing::info!("action-relay stopped");
    Ok(())
}

/// Broadcasts each stdin line until EOF.
async fn forward_stdin(broadcasts: BroadcastQueue) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if broadcasts.push(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        }
    }
    tracing::debug!("stdin closed");
}

/// Stand-in for the host application: logs every action it receives.
async fn log_actions(mut drain: ActionDrain) {
    while let Some(batch) = drain.recv().await {
        for action in batch {
            tracing::info!(%action, "action received");
        }
    }
}
