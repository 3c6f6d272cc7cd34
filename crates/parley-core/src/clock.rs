//! Lamport logical clock.

use parley_proto::Timestamp;

/// Scalar Lamport clock owned by a single node.
///
/// # Invariants
///
/// - The value never decreases.
/// - Every send stamps a value strictly greater than anything the node has
///   sent or observed before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicalClock {
    time: Timestamp,
}

impl LogicalClock {
    /// Clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance for a local event or send. Returns the new value.
    ///
    /// `None` once the clock has reached `Timestamp::MAX`; the value is left
    /// unchanged.
    pub fn tick(&mut self) -> Option<Timestamp> {
        self.time = self.time.checked_add(1)?;
        Some(self.time)
    }

    /// Merge a received timestamp: `max(local, received) + 1`.
    ///
    /// `None` if the merge would overflow; the value is left unchanged.
    pub fn observe(&mut self, received: Timestamp) -> Option<Timestamp> {
        self.time = self.time.max(received).checked_add(1)?;
        Some(self.time)
    }

    /// True if `received` can be merged with `ticks` further ticks after it.
    #[must_use]
    pub fn has_room(&self, received: Timestamp, ticks: u64) -> bool {
        self.time.max(received).checked_add(1).and_then(|t| t.checked_add(ticks)).is_some()
    }

    /// Current value, without advancing.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.time
    }
}
