//! One duplex link to a peer.
//!
//! A WebSocket is split into a write half ([`FrameSink`]) and a read half
//! ([`FrameSource`]). The write half is shared between the peer's own read
//! loop (for replies) and the broadcaster (for fan-out), so it lives behind
//! a [`SharedWriter`]. [`FrameWriter`] and [`FrameReader`] implement the two
//! traits over any split socket whose messages implement [`WireFrame`].

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;

use super::frame::{Frame, WireFrame};
use crate::error::RelayError;

/// Write half of a peer link.
pub trait FrameSink: Send + 'static {
    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Write`] or [`RelayError::Timeout`]; either
    /// means the peer is dead.
    fn send_text(&mut self, text: &str) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Answers a ping.
    ///
    /// # Errors
    ///
    /// Same as [`FrameSink::send_text`].
    fn send_pong(
        &mut self,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Closes the link. Closing twice is harmless.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Read half of a peer link.
pub trait FrameSource: Send {
    /// Waits for the next frame. `None` means the stream ended.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<Frame, RelayError>>> + Send;
}

/// A write half shared between a read loop and the broadcaster.
pub type SharedWriter<W> = Arc<Mutex<W>>;

/// [`FrameSink`] over a split WebSocket sink with a per-write deadline.
pub struct FrameWriter<S, M> {
    sink: S,
    write_timeout: Duration,
    closed: bool,
    _message: PhantomData<fn() -> M>,
}

impl<S, M> fmt::Debug for FrameWriter<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameWriter")
            .field("write_timeout", &self.write_timeout)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<S, M> FrameWriter<S, M> {
    /// Wraps `sink`. Every write fails with [`RelayError::Timeout`] if it
    /// takes longer than `write_timeout`.
    #[must_use]
    pub fn new(sink: S, write_timeout: Duration) -> Self {
        Self {
            sink,
            write_timeout,
            closed: false,
            _message: PhantomData,
        }
    }

    /// Wraps `sink` in a [`SharedWriter`].
    #[must_use]
    pub fn shared(sink: S, write_timeout: Duration) -> SharedWriter<Self> {
        Arc::new(Mutex::new(Self::new(sink, write_timeout)))
    }
}

impl<S, M> FrameWriter<S, M>
where
    S: Sink<M> + Unpin + Send,
    S::Error: fmt::Display,
    M: WireFrame + Send,
{
    async fn send(&mut self, message: M) -> Result<(), RelayError> {
        if self.closed {
            return Err(RelayError::Write("connection closed".to_string()));
        }
        match tokio::time::timeout(self.write_timeout, self.sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RelayError::Write(e.to_string())),
            Err(_) => Err(RelayError::Timeout(self.write_timeout)),
        }
    }
}

impl<S, M> FrameSink for FrameWriter<S, M>
where
    S: Sink<M> + Unpin + Send + 'static,
    S::Error: fmt::Display,
    M: WireFrame + Send + 'static,
{
    async fn send_text(&mut self, text: &str) -> Result<(), RelayError> {
        self.send(M::text(text)).await
    }

    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<(), RelayError> {
        self.send(M::pong(payload)).await
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Best effort: a peer that is already gone cannot be told.
        let _ = tokio::time::timeout(self.write_timeout, self.sink.close()).await;
    }
}

/// [`FrameSource`] over a split WebSocket stream.
pub struct FrameReader<R> {
    stream: R,
}

impl<R> fmt::Debug for FrameReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameReader").finish_non_exhaustive()
    }
}

impl<R> FrameReader<R> {
    /// Wraps `stream`.
    #[must_use]
    pub const fn new(stream: R) -> Self {
        Self { stream }
    }
}

impl<R, M, E> FrameSource for FrameReader<R>
where
    R: Stream<Item = Result<M, E>> + Unpin + Send,
    M: WireFrame,
    E: fmt::Display,
{
    async fn next_frame(&mut self) -> Option<Result<Frame, RelayError>> {
        match self.stream.next().await? {
            Ok(message) => Some(Ok(message.into_frame())),
            Err(e) => Some(Err(RelayError::Read(e.to_string()))),
        }
    }
}
