//! Live peers and the relay buffer, guarded together.
//!
//! [`PeerRegistry`] keeps the peer map and the [`RelayBuffer`] behind one
//! [`tokio::sync::Mutex`]. Joining (with replay), publishing and removal
//! all take that lock, so a joining peer sees the buffer and then every
//! later publish, never an interleaving of the two.
//!
//! # Lock order
//!
//! Registry lock first, then a peer's writer lock. Read loops only take
//! their own writer lock for replies and never hold it while calling into
//! the registry.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::{PeerId, RelayBuffer};
use crate::error::RelayError;
use crate::ws::endpoint::{FrameSink, SharedWriter};

/// A registered peer.
#[derive(Debug)]
struct PeerEntry<W> {
    label: String,
    writer: SharedWriter<W>,
    joined_at: DateTime<Utc>,
}

#[derive(Debug)]
struct RegistryState<W> {
    peers: HashMap<PeerId, PeerEntry<W>>,
    buffer: RelayBuffer,
}

/// Lightweight view of a peer for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PeerSummary {
    /// Registry key.
    pub peer_id: PeerId,
    /// Identity label, e.g. `Client-127.0.0.1:53412`.
    pub label: String,
    /// When the peer finished joining.
    pub joined_at: DateTime<Utc>,
}

/// Registry of live peers plus the relay buffer.
#[derive(Debug)]
pub struct PeerRegistry<W> {
    state: Mutex<RegistryState<W>>,
    replay_timeout: Duration,
}

impl<W: FrameSink> PeerRegistry<W> {
    /// Creates an empty registry whose buffer holds at most
    /// `buffer_capacity` messages (`None` for unbounded).
    ///
    /// `replay_timeout` bounds a whole replay, however many messages are
    /// buffered, and with it how long a joining peer can hold the lock.
    #[must_use]
    pub fn new(buffer_capacity: Option<usize>, replay_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                peers: HashMap::new(),
                buffer: RelayBuffer::new(buffer_capacity),
            }),
            replay_timeout,
        }
    }

    /// Registers a peer, first replaying the buffer to it if `replay`.
    ///
    /// Replay runs under the registry lock, so no publish can slip in
    /// between the replayed history and the peer's first live message.
    ///
    /// # Errors
    ///
    /// Returns the write error if replay fails, or [`RelayError::Timeout`]
    /// if it does not finish within the replay timeout. Either way the
    /// writer is closed and the peer is not registered.
    pub async fn join(
        &self,
        label: String,
        writer: SharedWriter<W>,
        replay: bool,
    ) -> Result<PeerId, RelayError> {
        let mut state = self.state.lock().await;

        if replay {
            tracing::debug!(peer = %label, count = state.buffer.len(), "replaying relay buffer");
            let buffer = &state.buffer;
            let replayed = tokio::time::timeout(self.replay_timeout, async {
                let mut w = writer.lock().await;
                for message in buffer.iter() {
                    w.send_text(message).await?;
                }
                Ok::<(), RelayError>(())
            })
            .await
            .unwrap_or(Err(RelayError::Timeout(self.replay_timeout)));

            if let Err(e) = replayed {
                tracing::warn!(peer = %label, error = %e, "replay failed");
                writer.lock().await.close().await;
                return Err(e);
            }
        }

        let peer_id = PeerId::new();
        state.peers.insert(
            peer_id,
            PeerEntry {
                label,
                writer,
                joined_at: Utc::now(),
            },
        );
        Ok(peer_id)
    }

    /// Appends `message` to the buffer, then sends it to every peer.
    ///
    /// Peers whose write fails are removed and closed; the rest still get
    /// the message. Returns how many peers received it.
    pub async fn publish(&self, message: String) -> usize {
        let mut state = self.state.lock().await;
        state.buffer.push(message.clone());

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (peer_id, entry) in &state.peers {
            match entry.writer.lock().await.send_text(&message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(peer = %entry.label, error = %e, "broadcast write failed");
                    failed.push(*peer_id);
                }
            }
        }

        for peer_id in failed {
            if let Some(entry) = state.peers.remove(&peer_id) {
                entry.writer.lock().await.close().await;
                tracing::info!(peer = %entry.label, "peer removed after failed write");
            }
        }

        delivered
    }

    /// Removes and closes a peer.
    ///
    /// Idempotent: returns `false` if the peer was already gone, in which
    /// case nothing is closed again.
    pub async fn remove(&self, peer_id: PeerId) -> bool {
        let removed = self.state.lock().await.peers.remove(&peer_id);
        match removed {
            Some(entry) => {
                entry.writer.lock().await.close().await;
                tracing::info!(peer = %entry.label, "peer removed");
                true
            }
            None => false,
        }
    }

    /// Removes and closes every peer.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        for (_, entry) in state.peers.drain() {
            entry.writer.lock().await.close().await;
        }
    }

    /// Returns `true` if `peer_id` is registered.
    pub async fn contains(&self, peer_id: PeerId) -> bool {
        self.state.lock().await.peers.contains_key(&peer_id)
    }

    /// Returns the number of live peers.
    pub async fn len(&self) -> usize {
        self.state.lock().await.peers.len()
    }

    /// Returns `true` if no peer is connected.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.peers.is_empty()
    }

    /// Returns the number of buffered messages.
    pub async fn buffered_len(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    /// Returns summaries of all live peers, oldest first.
    pub async fn peers(&self) -> Vec<PeerSummary> {
        let state = self.state.lock().await;
        let mut peers: Vec<PeerSummary> = state
            .peers
            .iter()
            .map(|(peer_id, entry)| PeerSummary {
                peer_id: *peer_id,
                label: entry.label.clone(),
                joined_at: entry.joined_at,
            })
            .collect();
        peers.sort_by_key(|p| p.joined_at);
        peers
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ws::testing::RecordingSink;

    const REPLAY_TIMEOUT: Duration = Duration::from_secs(5);

    async fn join(
        registry: &PeerRegistry<RecordingSink>,
        sink: &RecordingSink,
        replay: bool,
    ) -> PeerId {
        let Ok(id) = registry.join("peer".to_string(), sink.shared(), replay).await else {
            panic!("join should succeed");
        };
        id
    }

    #[tokio::test]
    async fn every_peer_sees_publish_order() {
        let registry: PeerRegistry<RecordingSink> = PeerRegistry::new(None, REPLAY_TIMEOUT);
        let a = RecordingSink::default();
        let b = RecordingSink::default();
        join(&registry, &a, true).await;
        join(&registry, &b, true).await;

        for msg in ["m1", "m2", "m3"] {
            assert_eq!(registry.publish(msg.to_string()).await, 2);
        }
        assert_eq!(a.texts(), ["m1", "m2", "m3"]);
        assert_eq!(b.texts(), ["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn late_joiner_gets_replay_before_new_messages() {
        let registry: PeerRegistry<RecordingSink> = PeerRegistry::new(None, REPLAY_TIMEOUT);
        registry.publish("m1".to_string()).await;
        registry.publish("m2".to_string()).await;

        let late = RecordingSink::default();
        join(&registry, &late, true).await;
        registry.publish("m3".to_string()).await;

        assert_eq!(late.texts(), ["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn replay_opt_out_sees_only_new_messages() {
        let registry: PeerRegistry<RecordingSink> = PeerRegistry::new(None, REPLAY_TIMEOUT);
        registry.publish("old".to_string()).await;

        let peer = RecordingSink::default();
        join(&registry, &peer, false).await;
        registry.publish("new".to_string()).await;

        assert_eq!(peer.texts(), ["new"]);
    }

    #[tokio::test]
    async fn capped_buffer_replays_newest() {
        let registry: PeerRegistry<RecordingSink> = PeerRegistry::new(Some(2), REPLAY_TIMEOUT);
        for msg in ["m1", "m2", "m3"] {
            registry.publish(msg.to_string()).await;
        }
        assert_eq!(registry.buffered_len().await, 2);

        let peer = RecordingSink::default();
        join(&registry, &peer, true).await;
        assert_eq!(peer.texts(), ["m2", "m3"]);
    }

    #[tokio::test]
    async fn failed_replay_leaves_registry_untouched() {
        let registry: PeerRegistry<RecordingSink> = PeerRegistry::new(None, REPLAY_TIMEOUT);
        registry.publish("m1".to_string()).await;
        registry.publish("m2".to_string()).await;

        let broken = RecordingSink::failing_after(1);
        let result = registry.join("broken".to_string(), broken.shared(), true).await;
        assert!(matches!(result, Err(RelayError::Write(_))));
        assert!(registry.is_empty().await);
        assert_eq!(broken.closes(), 1);
    }

    #[tokio::test]
    async fn failed_write_removes_only_that_peer() {
        let registry: PeerRegistry<RecordingSink> = PeerRegistry::new(None, REPLAY_TIMEOUT);
        let healthy = RecordingSink::default();
        let broken = RecordingSink::default();
        let healthy_id = join(&registry, &healthy, true).await;
        let broken_id = join(&registry, &broken, true).await;

        broken.break_now();
        assert_eq!(registry.publish("m1".to_string()).await, 1);
        registry.publish("m2".to_string()).await;

        assert!(registry.contains(healthy_id).await);
        assert!(!registry.contains(broken_id).await);
        assert_eq!(healthy.texts(), ["m1", "m2"]);
        assert_eq!(broken.closes(), 1);
        // The message is buffered even though one write failed.
        assert_eq!(registry.buffered_len().await, 2);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry: PeerRegistry<RecordingSink> = PeerRegistry::new(None, REPLAY_TIMEOUT);
        let sink = RecordingSink::default();
        let id = join(&registry, &sink, true).await;

        assert!(registry.remove(id).await);
        assert!(!registry.remove(id).await);
        assert_eq!(sink.closes(), 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_removal_closes_once() {
        let registry = Arc::new(PeerRegistry::<RecordingSink>::new(None, REPLAY_TIMEOUT));
        let sink = RecordingSink::default();
        let id = join(&registry, &sink, true).await;

        let r1 = Arc::clone(&registry);
        let r2 = Arc::clone(&registry);
        let (first, second) = tokio::join!(
            tokio::spawn(async move { r1.remove(id).await }),
            tokio::spawn(async move { r2.remove(id).await }),
        );
        let (Ok(first), Ok(second)) = (first, second) else {
            panic!("removal tasks panicked");
        };
        assert!(first ^ second, "exactly one removal should win");
        assert_eq!(sink.closes(), 1);
    }

    #[tokio::test]
    async fn peers_lists_labels() {
        let registry: PeerRegistry<RecordingSink> = PeerRegistry::new(None, REPLAY_TIMEOUT);
        let sink = RecordingSink::default();
        let Ok(id) = registry
            .join("Client-127.0.0.1:1".to_string(), sink.shared(), false)
            .await
        else {
            panic!("join should succeed");
        };

        let peers = registry.peers().await;
        assert_eq!(peers.len(), 1);
        assert!(peers.iter().all(|p| p.peer_id == id && p.label == "Client-127.0.0.1:1"));

        registry.clear().await;
        assert_eq!(registry.len().await, 0);
        assert_eq!(sink.closes(), 1);
    }

    #[tokio::test]
    async fn slow_replay_is_cut_off_and_releases_the_lock() {
        let registry: PeerRegistry<RecordingSink> =
            PeerRegistry::new(None, Duration::from_millis(50));
        for i in 0..10 {
            registry.publish(format!("m{i}")).await;
        }

        // Each write fits any per-write deadline; the whole replay does not.
        let slow = RecordingSink::slow(Duration::from_millis(20));
        let result = registry.join("slow".to_string(), slow.shared(), true).await;

        let Err(RelayError::Timeout(after)) = result else {
            panic!("expected the replay deadline to expire, got {result:?}");
        };
        assert_eq!(after, Duration::from_millis(50));
        assert!(slow.texts().len() < 10);
        assert_eq!(slow.closes(), 1);
        assert!(registry.is_empty().await);

        let healthy = RecordingSink::default();
        join(&registry, &healthy, false).await;
        assert_eq!(registry.publish("after".to_string()).await, 1);
        assert_eq!(healthy.texts(), ["after"]);
    }
}
