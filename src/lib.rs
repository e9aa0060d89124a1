//! # action-relay
//!
//! Authenticated WebSocket relay that carries text commands ("actions")
//! between processes.
//!
//! A **server relay** accepts many peers, checks a shared secret during
//! the handshake, replays past broadcasts to newcomers and fans out new
//! ones. A **client relay** keeps one outbound link to a server and
//! forwards local broadcasts upstream. In both roles, text received from
//! the other side is parsed into actions and pushed onto an action queue
//! for the host application.
//!
//! ## Architecture
//!
//! ```text
//! Peers (WebSocket)              Host application
//!     │                              │        ▲
//!     ├── Upgrade + auth (ws/, auth) │        │
//!     ├── Read loops (ws/inbound)    │        │
//!     │        │                     │        │
//!     │        └── ActionGateway ──► ActionQueue
//!     │                              │
//!     └── PeerRegistry ◄── Broadcaster ◄── BroadcastQueue
//!          └── RelayBuffer (replay)
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod ws;
