//! Ordered history of broadcast messages for replay to new peers.

use std::collections::VecDeque;

/// Append-only message history.
///
/// Order is publish order. Without a capacity the buffer keeps every
/// message; with one, appending past it drops the oldest entry.
#[derive(Debug, Clone, Default)]
pub struct RelayBuffer {
    entries: VecDeque<String>,
    capacity: Option<usize>,
}

impl RelayBuffer {
    /// Creates a buffer. `None` means unbounded.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.filter(|&c| c > 0),
        }
    }

    /// Appends `message`, evicting the oldest entry if the buffer is full.
    pub fn push(&mut self, message: String) {
        if let Some(cap) = self.capacity {
            while self.entries.len() >= cap {
                self.entries.pop_front();
            }
        }
        self.entries.push_back(message);
    }

    /// Iterates the buffered messages oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Returns the number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the configured capacity, if any.
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
