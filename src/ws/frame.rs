//! Transport-neutral WebSocket frames.
//!
//! The server side speaks axum's [`Message`](axum::extract::ws::Message),
//! the client side tungstenite's. [`WireFrame`] maps both onto [`Frame`] so
//! the inbound pipeline handles one tagged variant regardless of role.

use axum::extract::ws::Message as AxumMessage;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

/// A received frame, classified by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame: one line of relay input.
    Text(String),
    /// Ping with its payload, to be echoed in a pong.
    Ping(Vec<u8>),
    /// Pong; ignored.
    Pong,
    /// Close frame: the peer is leaving.
    Close,
    /// Any frame kind the relay does not accept, by name.
    Other(&'static str),
}

/// A library message type that can be classified into [`Frame`] and built
/// from the few frames the relay sends.
pub trait WireFrame: Sized {
    /// Builds a text frame.
    fn text(text: &str) -> Self;
    /// Builds a pong echoing `payload`.
    fn pong(payload: Vec<u8>) -> Self;
    /// Classifies a received message.
    fn into_frame(self) -> Frame;
}

impl WireFrame for AxumMessage {
    fn text(text: &str) -> Self {
        Self::Text(text.to_owned().into())
    }

    fn pong(payload: Vec<u8>) -> Self {
        Self::Pong(payload.into())
    }

    fn into_frame(self) -> Frame {
        match self {
            Self::Text(text) => Frame::Text(text.as_str().to_owned()),
            Self::Ping(payload) => Frame::Ping(payload.to_vec()),
            Self::Pong(_) => Frame::Pong,
            Self::Close(_) => Frame::Close,
            Self::Binary(_) => Frame::Other("binary"),
        }
    }
}

impl WireFrame for TungsteniteMessage {
    fn text(text: &str) -> Self {
        Self::Text(text.to_owned().into())
    }

    fn pong(payload: Vec<u8>) -> Self {
        Self::Pong(payload.into())
    }

    fn into_frame(self) -> Frame {
        match self {
            Self::Text(text) => Frame::Text(text.as_str().to_owned()),
            Self::Ping(payload) => Frame::Ping(payload.to_vec()),
            Self::Pong(_) => Frame::Pong,
            Self::Close(_) => Frame::Close,
            Self::Binary(_) => Frame::Other("binary"),
            Self::Frame(_) => Frame::Other("raw"),
        }
    }
}
