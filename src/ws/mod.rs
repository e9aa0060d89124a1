//! WebSocket layer: both relay roles and the link plumbing they share.
//!
//! The server accepts peers through the authenticated upgrade at `/`; the
//! client dials one upstream server. Both run received text through
//! [`inbound`] and write through a [`endpoint::FrameSink`].

pub mod client;
pub mod connection;
pub mod endpoint;
pub mod frame;
pub mod handler;
pub mod inbound;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;
