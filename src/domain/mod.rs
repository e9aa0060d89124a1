//! Domain layer: actions, queues, peers and the relay buffer.
//!
//! This module holds the relay's state model: the action gateway boundary,
//! the two process-wide queues, peer identity, the replay buffer and the
//! registry that guards peers and buffer together.

pub mod action;
pub mod peer_id;
pub mod peer_registry;
pub mod queues;
pub mod relay_buffer;

pub use action::{Action, ActionGateway, LineParser, ParseError};
pub use peer_id::PeerId;
pub use peer_registry::{PeerRegistry, PeerSummary};
pub use queues::{
    ActionDrain, ActionQueue, BroadcastDrain, BroadcastQueue, Drain, Queue, action_queue,
    broadcast_queue,
};
pub use relay_buffer::RelayBuffer;
