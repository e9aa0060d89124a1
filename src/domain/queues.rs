//! Process-wide FIFO queues crossing the relay boundary.
//!
//! [`ActionQueue`] carries parsed actions inward to the host application;
//! [`BroadcastQueue`] carries host events outward to peers. Both wrap an
//! unbounded [`tokio::sync::mpsc`] channel: any number of producers, one
//! consumer, order preserved.

use tokio::sync::mpsc;

use super::Action;
use crate::error::RelayError;

/// Producer side of a relay queue. Cheap to clone.
#[derive(Debug)]
pub struct Queue<T> {
    name: &'static str,
    sender: mpsc::UnboundedSender<T>,
}

// Manual impl so `T` need not be `Clone`.
impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: self.sender.clone(),
        }
    }
}

/// Consumer side of a relay queue.
#[derive(Debug)]
pub struct Drain<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

/// Actions parsed from peer input, drained by the host application.
pub type ActionQueue = Queue<Vec<Action>>;
/// Consumer end of the [`ActionQueue`].
pub type ActionDrain = Drain<Vec<Action>>;
/// Host events to relay to peers, drained by a relay.
pub type BroadcastQueue = Queue<String>;
/// Consumer end of the [`BroadcastQueue`].
pub type BroadcastDrain = Drain<String>;

fn queue<T>(name: &'static str) -> (Queue<T>, Drain<T>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Queue { name, sender }, Drain { receiver })
}

/// Creates the inbound action queue.
#[must_use]
pub fn action_queue() -> (ActionQueue, ActionDrain) {
    queue("action")
}

/// Creates the outbound broadcast queue.
#[must_use]
pub fn broadcast_queue() -> (BroadcastQueue, BroadcastDrain) {
    queue("broadcast")
}

impl<T> Queue<T> {
    /// Enqueues `item` behind everything pushed before it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::QueueClosed`] if the [`Drain`] was dropped.
    pub fn push(&self, item: T) -> Result<(), RelayError> {
        self.sender
            .send(item)
            .map_err(|_| RelayError::QueueClosed(self.name))
    }

    /// Returns `true` once the consumer is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<T> Drain<T> {
    /// Waits for the next item. Returns `None` once every producer is
    /// dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Returns the next item if one is ready.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}
