//! Client relay: one outbound link to an upstream server relay.
//!
//! Local broadcasts are forwarded upstream; text arriving from upstream
//! runs through the same inbound pipeline as on the server, with replies
//! sent back upstream. [`supervise`] applies an [`UpstreamPolicy`] when the
//! link drops.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::endpoint::{FrameReader, FrameSink, FrameSource, FrameWriter, SharedWriter};
use super::inbound::{Flow, InboundContext, handle_frame};
use crate::auth::API_KEY_HEADER;
use crate::config::{ClientConfig, UpstreamPolicy};
use crate::domain::{ActionGateway, ActionQueue, BroadcastDrain};
use crate::error::RelayError;

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the upstream link.
pub type ClientWriter = FrameWriter<SplitSink<ClientStream, Message>, Message>;

type ClientReader = FrameReader<SplitStream<ClientStream>>;

/// An established, authenticated upstream link.
#[derive(Debug)]
pub struct RelayClient {
    url: String,
    writer: SharedWriter<ClientWriter>,
    reader: ClientReader,
    acknowledge: bool,
}

impl RelayClient {
    /// Dials the server, presenting the key, and verifies the server
    /// echoes the same key back.
    ///
    /// # Errors
    ///
    /// - [`RelayError::MissingApiKey`] if no key is configured.
    /// - [`RelayError::InvalidAddress`] if the URL is not a WebSocket URL.
    /// - [`RelayError::Timeout`] if dial plus handshake exceed the deadline.
    /// - [`RelayError::Unauthorized`] if the server answered 401.
    /// - [`RelayError::Dial`] for any other dial or handshake failure.
    /// - [`RelayError::ImposterServer`] if the echoed key is missing or
    ///   different; the link is closed first.
    pub async fn connect(config: &ClientConfig) -> Result<Self, RelayError> {
        let api_key = config
            .api_key
            .as_ref()
            .ok_or(RelayError::MissingApiKey("to use the relay client"))?;

        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::InvalidAddress(format!("{}: {e}", config.url)))?;
        let key_value = HeaderValue::from_str(api_key.as_str())
            .map_err(|e| RelayError::InvalidApiKey(e.to_string()))?;
        request.headers_mut().insert(API_KEY_HEADER, key_value);

        tracing::debug!(url = %config.url, "dialing upstream");
        let (mut stream, response) =
            tokio::time::timeout(config.handshake_timeout, connect_async(request))
                .await
                .map_err(|_| RelayError::Timeout(config.handshake_timeout))?
                .map_err(|e| dial_error(&config.url, e))?;

        let echoed = response.headers().get(API_KEY_HEADER).map(|v| v.as_bytes());
        if !api_key.matches(echoed) {
            tracing::warn!(url = %config.url, "server did not provide a valid api key");
            let _ = stream.close(None).await;
            return Err(RelayError::ImposterServer);
        }

        let (sink, stream) = stream.split();
        tracing::info!(url = %config.url, "connected to upstream");
        Ok(Self {
            url: config.url.clone(),
            writer: FrameWriter::shared(sink, config.write_timeout),
            reader: FrameReader::new(stream),
            acknowledge: config.acknowledge,
        })
    }

    /// The URL this client is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Pumps the link until it ends.
    ///
    /// Broadcasts drained from `broadcasts` are written upstream in order.
    /// Text from upstream is parsed and pushed onto `actions`.
    ///
    /// Returns `Ok(())` when the broadcast queue closes, which means the
    /// host is shutting down.
    ///
    /// # Errors
    ///
    /// [`RelayError::UpstreamClosed`] if the server closed the link, or the
    /// read, write or protocol error that ended it.
    pub async fn run(
        self,
        gateway: Arc<dyn ActionGateway>,
        actions: ActionQueue,
        broadcasts: &mut BroadcastDrain,
    ) -> Result<(), RelayError> {
        let Self {
            url,
            writer,
            mut reader,
            acknowledge,
        } = self;
        let ctx = InboundContext {
            gateway,
            actions,
            peer: url,
            acknowledge,
        };

        let result = loop {
            tokio::select! {
                frame = reader.next_frame() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => break Err(e),
                        None => break Err(RelayError::UpstreamClosed),
                    };
                    match handle_frame(frame, writer.as_ref(), &ctx).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Closed) => break Err(RelayError::UpstreamClosed),
                        Err(e) => break Err(e),
                    }
                }
                message = broadcasts.recv() => {
                    let Some(message) = message else {
                        break Ok(());
                    };
                    if let Err(e) = writer.lock().await.send_text(&message).await {
                        break Err(e);
                    }
                }
            }
        };

        writer.lock().await.close().await;
        result
    }
}

fn dial_error(url: &str, err: tungstenite::Error) -> RelayError {
    match err {
        tungstenite::Error::Http(response) if response.status() == StatusCode::UNAUTHORIZED => {
            RelayError::Unauthorized
        }
        other => RelayError::Dial {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Runs a client relay under `policy` until the host closes the broadcast
/// queue or the policy gives up.
///
/// The first dial is not retried: a client that cannot connect at startup
/// reports why.
///
/// # Errors
///
/// The initial connect error, or the error that ended the link when the
/// policy is [`UpstreamPolicy::Terminate`], or the last dial error once
/// reconnect attempts are exhausted.
pub async fn supervise(
    config: &ClientConfig,
    policy: UpstreamPolicy,
    gateway: Arc<dyn ActionGateway>,
    actions: ActionQueue,
    mut broadcasts: BroadcastDrain,
) -> Result<(), RelayError> {
    let mut client = RelayClient::connect(config).await?;
    loop {
        let lost = match client
            .run(Arc::clone(&gateway), actions.clone(), &mut broadcasts)
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        tracing::error!(url = %config.url, error = %lost, "upstream lost");
        client = reconnect(config, policy, lost).await?;
    }
}

async fn reconnect(
    config: &ClientConfig,
    policy: UpstreamPolicy,
    lost: RelayError,
) -> Result<RelayClient, RelayError> {
    let UpstreamPolicy::Reconnect {
        delay,
        max_attempts,
    } = policy
    else {
        return Err(lost);
    };

    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        tokio::time::sleep(delay).await;
        match RelayClient::connect(config).await {
            Ok(client) => {
                tracing::info!(url = %config.url, attempt, "reconnected to upstream");
                return Ok(client);
            }
            Err(e) if e.is_configuration() || is_rejection(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(url = %config.url, attempt, error = %e, "reconnect failed");
                if max_attempts.is_some_and(|max| attempt >= max) {
                    return Err(e);
                }
            }
        }
    }
}

/// Failures that another attempt cannot fix.
const fn is_rejection(e: &RelayError) -> bool {
    matches!(e, RelayError::Unauthorized | RelayError::ImposterServer)
}
