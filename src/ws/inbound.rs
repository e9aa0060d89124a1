//! Inbound pipeline shared by both relay roles.
//!
//! Each received frame is dispatched on its kind. Text is trimmed of line
//! terminators and handed to the [`ActionGateway`]; rejected or empty lines
//! get a `[bad]` reply on the same link, accepted ones go onto the
//! [`ActionQueue`]. Anything that ends the connection comes back as a
//! [`RelayError`] so the caller can deregister exactly that peer.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::endpoint::{FrameSink, FrameSource};
use super::frame::Frame;
use crate::domain::{ActionGateway, ActionQueue};
use crate::error::RelayError;

/// A line-oriented reply to the peer that sent the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The line was rejected.
    Bad(String),
    /// The line was accepted.
    Good(String),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bad(reason) => write!(f, "[bad] {reason}"),
            Self::Good(reason) => write!(f, "[good] {reason}"),
        }
    }
}

impl Reply {
    /// Returns `true` if `line` is a reply from the other side rather than
    /// input. Replies are logged, never parsed or answered.
    #[must_use]
    pub fn is_reply(line: &str) -> bool {
        line.starts_with("[bad] ") || line.starts_with("[good] ")
    }
}

/// Reason sent when a line parses to no actions.
pub const NO_ACTION: &str = "no action specified";

/// What a read loop needs besides the link itself.
#[derive(Debug, Clone)]
pub struct InboundContext {
    /// Parser for inbound lines.
    pub gateway: Arc<dyn ActionGateway>,
    /// Where parsed actions go.
    pub actions: ActionQueue,
    /// Peer label for logs.
    pub peer: String,
    /// Send `[good]` replies for accepted lines.
    pub acknowledge: bool,
}

/// Whether the link stays open after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// The peer sent a close frame.
    Closed,
}

/// Handles one frame.
///
/// # Errors
///
/// Returns [`RelayError::ProtocolViolation`] for frame kinds the relay does
/// not accept, or the write error if a reply could not be sent.
pub async fn handle_frame<W: FrameSink>(
    frame: Frame,
    writer: &Mutex<W>,
    ctx: &InboundContext,
) -> Result<Flow, RelayError> {
    match frame {
        Frame::Text(text) => {
            handle_line(&text, writer, ctx).await?;
            Ok(Flow::Continue)
        }
        Frame::Ping(payload) => {
            writer.lock().await.send_pong(payload).await?;
            Ok(Flow::Continue)
        }
        Frame::Pong => Ok(Flow::Continue),
        Frame::Close => Ok(Flow::Closed),
        Frame::Other(kind) => Err(RelayError::ProtocolViolation(kind)),
    }
}

async fn handle_line<W: FrameSink>(
    text: &str,
    writer: &Mutex<W>,
    ctx: &InboundContext,
) -> Result<(), RelayError> {
    tracing::debug!(peer = %ctx.peer, text = %text, "received message");
    let line = text.trim_matches(['\r', '\n']);
    if Reply::is_reply(line) {
        tracing::debug!(peer = %ctx.peer, response = %line, "peer replied");
        return Ok(());
    }

    let actions = match ctx.gateway.parse(line) {
        Ok(actions) if actions.is_empty() => {
            return reply(writer, ctx, Reply::Bad(NO_ACTION.to_string())).await;
        }
        Ok(actions) => actions,
        Err(e) => return reply(writer, ctx, Reply::Bad(e.to_string())).await,
    };

    let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
    let summary = names.join("+");
    tracing::info!(peer = %ctx.peer, actions = %summary, "received actions");

    if let Err(e) = ctx.actions.push(actions) {
        // The host stopped draining; the peer is not at fault.
        tracing::error!(peer = %ctx.peer, error = %e, "dropping actions");
        return Ok(());
    }
    if ctx.acknowledge {
        reply(writer, ctx, Reply::Good(summary)).await?;
    }
    Ok(())
}

async fn reply<W: FrameSink>(
    writer: &Mutex<W>,
    ctx: &InboundContext,
    response: Reply,
) -> Result<(), RelayError> {
    let text = response.to_string();
    tracing::debug!(peer = %ctx.peer, response = %text, "sending response");
    writer.lock().await.send_text(&text).await
}

/// Reads frames until the peer closes or the link fails.
///
/// Returns `Ok(())` when the peer sent a close frame or the stream ended,
/// and the connection-scoped error otherwise.
///
/// # Errors
///
/// Read and write failures, timeouts and protocol violations.
pub async fn read_loop<S: FrameSource, W: FrameSink>(
    source: &mut S,
    writer: &Mutex<W>,
    ctx: &InboundContext,
) -> Result<(), RelayError> {
    while let Some(frame) = source.next_frame().await {
        if handle_frame(frame?, writer, ctx).await? == Flow::Closed {
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Action, ActionDrain, LineParser, action_queue};
    use crate::ws::testing::{RecordingSink, ScriptedSource};

    fn context(acknowledge: bool) -> (InboundContext, ActionDrain) {
        let (actions, drain) = action_queue();
        let ctx = InboundContext {
            gateway: Arc::new(LineParser::new()),
            actions,
            peer: "Client-test".to_string(),
            acknowledge,
        };
        (ctx, drain)
    }

    #[test]
    fn replies_carry_their_tag() {
        assert_eq!(Reply::Bad("nope".to_string()).to_string(), "[bad] nope");
        assert_eq!(Reply::Good("reload".to_string()).to_string(), "[good] reload");
    }

    #[test]
    fn reply_lines_are_recognised() {
        assert!(Reply::is_reply("[bad] no action specified"));
        assert!(Reply::is_reply("[good] reload"));
        assert!(!Reply::is_reply("reload"));
        assert!(!Reply::is_reply("[badly] formed"));
    }

    #[tokio::test]
    async fn replies_from_the_other_side_are_not_answered() {
        let (ctx, mut drain) = context(true);
        let sink = RecordingSink::default();
        let writer = Mutex::new(sink.clone());
        let mut source = ScriptedSource::texts([
            "[bad] invalid action name near `hello`",
            "[good] reload\n",
        ]);

        tokio_test::assert_ok!(read_loop(&mut source, &writer, &ctx).await);

        assert!(sink.texts().is_empty());
        assert!(drain.try_recv().is_none());
    }

    #[tokio::test]
    async fn valid_line_reaches_action_queue() {
        let (ctx, mut drain) = context(false);
        let sink = RecordingSink::default();
        let writer = Mutex::new(sink.clone());
        let mut source = ScriptedSource::texts(["reload()\r\n"]);

        tokio_test::assert_ok!(read_loop(&mut source, &writer, &ctx).await);

        assert_eq!(drain.try_recv(), Some(vec![Action::new("reload")]));
        assert!(sink.texts().is_empty());
    }

    #[tokio::test]
    async fn rejected_line_gets_one_bad_reply_and_nothing_queued() {
        let (ctx, mut drain) = context(false);
        let sink = RecordingSink::default();
        let writer = Mutex::new(sink.clone());
        let mut source = ScriptedSource::texts(["reload(now"]);

        tokio_test::assert_ok!(read_loop(&mut source, &writer, &ctx).await);

        let texts = sink.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts.iter().all(|t| t.starts_with("[bad] ")));
        assert!(drain.try_recv().is_none());
    }

    #[tokio::test]
    async fn empty_line_is_no_action_specified() {
        let (ctx, mut drain) = context(false);
        let sink = RecordingSink::default();
        let writer = Mutex::new(sink.clone());
        let mut source = ScriptedSource::texts(["\n"]);

        tokio_test::assert_ok!(read_loop(&mut source, &writer, &ctx).await);

        assert_eq!(sink.texts(), ["[bad] no action specified"]);
        assert!(drain.try_recv().is_none());
    }

    #[tokio::test]
    async fn peer_stays_open_after_bad_input() {
        let (ctx, mut drain) = context(false);
        let sink = RecordingSink::default();
        let writer = Mutex::new(sink.clone());
        let mut source = ScriptedSource::texts(["???", "accept"]);

        tokio_test::assert_ok!(read_loop(&mut source, &writer, &ctx).await);

        assert_eq!(sink.texts().len(), 1);
        assert_eq!(drain.try_recv(), Some(vec![Action::new("accept")]));
    }

    #[tokio::test]
    async fn acknowledge_sends_good_reply() {
        let (ctx, mut drain) = context(true);
        let sink = RecordingSink::default();
        let writer = Mutex::new(sink.clone());
        let mut source = ScriptedSource::texts(["first+second"]);

        tokio_test::assert_ok!(read_loop(&mut source, &writer, &ctx).await);

        assert_eq!(sink.texts(), ["[good] first+second"]);
        assert!(drain.try_recv().is_some());
    }

    #[tokio::test]
    async fn ping_is_answered_and_pong_ignored() {
        let (ctx, _drain) = context(false);
        let sink = RecordingSink::default();
        let writer = Mutex::new(sink.clone());
        let mut source = ScriptedSource::new([Ok(Frame::Ping(vec![1, 2])), Ok(Frame::Pong)]);

        tokio_test::assert_ok!(read_loop(&mut source, &writer, &ctx).await);

        assert_eq!(sink.with(|r| r.pongs.clone()), vec![vec![1, 2]]);
        assert!(sink.texts().is_empty());
    }

    #[tokio::test]
    async fn close_frame_stops_reading() {
        let (ctx, mut drain) = context(false);
        let writer = Mutex::new(RecordingSink::default());
        let mut source = ScriptedSource::new([
            Ok(Frame::Close),
            Ok(Frame::Text("never".to_string())),
        ]);

        tokio_test::assert_ok!(read_loop(&mut source, &writer, &ctx).await);
        assert!(drain.try_recv().is_none());
    }

    #[tokio::test]
    async fn binary_frame_is_a_protocol_violation() {
        let (ctx, _drain) = context(false);
        let writer = Mutex::new(RecordingSink::default());
        let mut source = ScriptedSource::new([Ok(Frame::Other("binary"))]);

        let result = read_loop(&mut source, &writer, &ctx).await;
        assert!(matches!(result, Err(RelayError::ProtocolViolation("binary"))));
    }

    #[tokio::test]
    async fn read_error_ends_the_loop() {
        let (ctx, _drain) = context(false);
        let writer = Mutex::new(RecordingSink::default());
        let mut source = ScriptedSource::new([Err(RelayError::Read("reset".to_string()))]);

        let result = read_loop(&mut source, &writer, &ctx).await;
        assert!(matches!(result, Err(RelayError::Read(_))));
    }

    #[tokio::test]
    async fn failed_reply_ends_the_loop() {
        let (ctx, _drain) = context(false);
        let sink = RecordingSink::failing_after(0);
        let writer = Mutex::new(sink);
        let mut source = ScriptedSource::texts(["", "reload"]);

        let result = read_loop(&mut source, &writer, &ctx).await;
        assert!(matches!(result, Err(RelayError::Write(_))));
    }

    #[tokio::test]
    async fn closed_action_queue_does_not_drop_the_peer() {
        let (ctx, drain) = context(false);
        drop(drain);
        let writer = Mutex::new(RecordingSink::default());
        let mut source = ScriptedSource::texts(["reload", "reload"]);

        tokio_test::assert_ok!(read_loop(&mut source, &writer, &ctx).await);
    }
}
