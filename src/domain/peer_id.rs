//! Registry key for a connected peer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for one live peer connection.
///
/// Wraps a UUID v4 minted when the peer joins. Two connections from the
/// same remote address still get distinct ids, so removing one never
/// touches the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(uuid::Uuid);

impl PeerId {
    /// Creates a new random `PeerId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
