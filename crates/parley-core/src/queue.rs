//! Totally ordered queue of pending critical section requests.

use std::collections::BTreeSet;

use parley_proto::{NodeId, Timestamp};

/// A pending request: ordered by timestamp, ties broken by node id.
///
/// Field order matters; the derived `Ord` compares `timestamp` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestEntry {
    /// Lamport timestamp of the REQUEST
    pub timestamp: Timestamp,
    /// Requesting node
    pub node_id: NodeId,
}

impl RequestEntry {
    /// Entry for `node_id` requesting at `timestamp`.
    #[must_use]
    pub const fn new(timestamp: Timestamp, node_id: NodeId) -> Self {
        Self { timestamp, node_id }
    }
}

/// Set of pending requests in `(timestamp, node_id)` order.
///
/// Every node keeps its own copy. Given FIFO channels, all copies agree on
/// the relative order of any two entries they both hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQueue {
    entries: BTreeSet<RequestEntry>,
}

impl RequestQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Returns `false` if the identical entry was already
    /// queued, in which case nothing changes.
    pub fn insert(&mut self, entry: RequestEntry) -> bool {
        self.entries.insert(entry)
    }

    /// Remove every entry of `node_id`. Returns whether anything was removed.
    pub fn remove(&mut self, node_id: NodeId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.node_id != node_id);
        self.entries.len() != before
    }

    /// Smallest entry.
    #[must_use]
    pub fn head(&self) -> Option<&RequestEntry> {
        self.entries.first()
    }

    /// Whether the smallest entry belongs to `node_id`.
    #[must_use]
    pub fn is_head(&self, node_id: NodeId) -> bool {
        self.head().is_some_and(|entry| entry.node_id == node_id)
    }

    /// Entry queued by `node_id`, if any.
    #[must_use]
    pub fn entry_for(&self, node_id: NodeId) -> Option<&RequestEntry> {
        self.entries.iter().find(|entry| entry.node_id == node_id)
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in total order.
    pub fn iter(&self) -> impl Iterator<Item = &RequestEntry> {
        self.entries.iter()
    }
}
