//! In-memory endpoints for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::endpoint::{FrameSink, FrameSource, SharedWriter};
use super::frame::Frame;
use crate::error::RelayError;

/// What a [`RecordingSink`] has seen.
#[derive(Debug, Default)]
pub(crate) struct Recorded {
    pub(crate) texts: Vec<String>,
    pub(crate) pongs: Vec<Vec<u8>>,
    pub(crate) closes: usize,
    /// Fail every write once this many texts have been accepted.
    pub(crate) fail_after: Option<usize>,
    /// Pause before accepting each text.
    pub(crate) delay: Option<Duration>,
}

/// Sink that records writes and can be told to start failing.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSink {
    log: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub(crate) fn failing_after(n: usize) -> Self {
        let sink = Self::default();
        sink.with(|r| r.fail_after = Some(n));
        sink
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        let sink = Self::default();
        sink.with(|r| r.delay = Some(delay));
        sink
    }

    pub(crate) fn shared(&self) -> SharedWriter<Self> {
        Arc::new(tokio::sync::Mutex::new(self.clone()))
    }

    pub(crate) fn with<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        let mut guard = match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.with(|r| r.texts.clone())
    }

    pub(crate) fn closes(&self) -> usize {
        self.with(|r| r.closes)
    }

    pub(crate) fn break_now(&self) {
        self.with(|r| r.fail_after = Some(r.texts.len()));
    }
}

impl FrameSink for RecordingSink {
    async fn send_text(&mut self, text: &str) -> Result<(), RelayError> {
        if let Some(delay) = self.with(|r| r.delay) {
            tokio::time::sleep(delay).await;
        }
        self.with(|r| {
            if r.closes > 0 || r.fail_after.is_some_and(|n| r.texts.len() >= n) {
                return Err(RelayError::Write("broken pipe".to_string()));
            }
            r.texts.push(text.to_string());
            Ok(())
        })
    }

    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<(), RelayError> {
        self.with(|r| {
            if r.closes > 0 {
                return Err(RelayError::Write("broken pipe".to_string()));
            }
            r.pongs.push(payload);
            Ok(())
        })
    }

    async fn close(&mut self) {
        self.with(|r| r.closes += 1);
    }
}

/// Source that replays a fixed script of frames, then ends.
#[derive(Debug, Default)]
pub(crate) struct ScriptedSource {
    frames: VecDeque<Result<Frame, RelayError>>,
}

impl ScriptedSource {
    pub(crate) fn new(frames: impl IntoIterator<Item = Result<Frame, RelayError>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub(crate) fn texts<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(lines.into_iter().map(|l| Ok(Frame::Text(l.to_string()))))
    }
}

impl FrameSource for ScriptedSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, RelayError>> {
        self.frames.pop_front()
    }
}
