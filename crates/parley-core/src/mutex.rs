//! Lamport mutual exclusion state machine.
//!
//! One [`MutexCoordinator`] per node. It owns the node's logical clock and
//! request queue and decides when the node may enter the critical section.
//! Uses the action pattern: methods return [`MutexAction`]s for the driver to
//! execute, and the coordinator itself performs no I/O.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ request_cs ┌─────────┐ all ACKs + head ┌──────┐
//! │ Idle │───────────>│ Waiting │────────────────>│ InCs │
//! └──────┘            └─────────┘                 └──────┘
//!    ↑                                                │
//!    └──────────────────── release_cs ────────────────┘
//! ```
//!
//! # Entry condition
//!
//! A Waiting node enters when (a) every peer has acknowledged its REQUEST and
//! (b) its own entry is the head of its queue. With FIFO channels, (a)
//! guarantees that every request with a smaller timestamp has already been
//! queued, so (b) is decided on complete information.

use std::collections::BTreeSet;

use parley_proto::{MutexMessage, NodeId, Timestamp};

use crate::{
    clock::LogicalClock,
    error::MutexError,
    queue::{RequestEntry, RequestQueue},
};

/// Mutual exclusion state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexState {
    /// Not interested in the critical section
    Idle,
    /// REQUEST broadcast, collecting ACKs
    Waiting,
    /// Inside the critical section
    InCs,
}

/// Actions returned by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutexAction {
    /// Send `message` to one peer
    Send {
        /// Destination node
        to: NodeId,
        /// Message to send
        message: MutexMessage,
    },

    /// Send `message` to every peer
    Broadcast(MutexMessage),

    /// The node may now run its critical section
    Enter {
        /// Timestamp of the request being granted
        timestamp: Timestamp,
    },

    /// The node has left the critical section
    Exit {
        /// Timestamp of the request that was granted
        timestamp: Timestamp,
    },
}

/// Per-node Lamport mutual exclusion state machine.
#[derive(Debug, Clone)]
pub struct MutexCoordinator {
    id: NodeId,
    peers: BTreeSet<NodeId>,
    clock: LogicalClock,
    queue: RequestQueue,
    state: MutexState,
    /// Peers that acknowledged the current request
    acks: BTreeSet<NodeId>,
    /// Timestamp of the current request while Waiting or InCs
    request: Option<Timestamp>,
}

impl MutexCoordinator {
    /// Create a coordinator for `id` in a cluster of `members`.
    ///
    /// `members` may include `id` itself; it is never treated as a peer.
    pub fn new(id: NodeId, members: impl IntoIterator<Item = NodeId>) -> Self {
        let peers = members.into_iter().filter(|&peer| peer != id).collect();
        Self {
            id,
            peers,
            clock: LogicalClock::new(),
            queue: RequestQueue::new(),
            state: MutexState::Idle,
            acks: BTreeSet::new(),
            request: None,
        }
    }

    /// This node's id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MutexState {
        self.state
    }

    /// Current logical clock value.
    #[must_use]
    pub fn clock(&self) -> Timestamp {
        self.clock.now()
    }

    /// Local copy of the request queue.
    #[must_use]
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Every other node in the cluster.
    #[must_use]
    pub fn peers(&self) -> &BTreeSet<NodeId> {
        &self.peers
    }

    /// Timestamp of the outstanding request. `None` when Idle.
    #[must_use]
    pub fn pending_request(&self) -> Option<Timestamp> {
        self.request
    }

    /// Peers that have acknowledged the outstanding request.
    #[must_use]
    pub fn acks(&self) -> &BTreeSet<NodeId> {
        &self.acks
    }

    /// Ask for the critical section.
    ///
    /// Ticks the clock, queues the node's own entry and broadcasts a REQUEST.
    /// A node without peers enters immediately.
    ///
    /// # Errors
    ///
    /// - `MutexError::InvariantViolation` unless Idle
    /// - `MutexError::ClockExhausted` if the clock is at `Timestamp::MAX`
    pub fn request_cs(&mut self) -> Result<Vec<MutexAction>, MutexError> {
        if self.state != MutexState::Idle {
            return Err(MutexError::InvariantViolation {
                state: self.state,
                operation: "request_cs",
            });
        }

        let timestamp = self.tick()?;
        self.queue.insert(RequestEntry::new(timestamp, self.id));
        self.acks.clear();
        self.request = Some(timestamp);
        self.state = MutexState::Waiting;

        tracing::debug!(node = self.id, timestamp, "requesting critical section");

        let mut actions = Vec::with_capacity(2);
        if !self.peers.is_empty() {
            actions.push(MutexAction::Broadcast(MutexMessage::Request { timestamp }));
        }
        actions.extend(self.try_enter());
        Ok(actions)
    }

    /// Process a message from `from`.
    ///
    /// The clock observes every inbound timestamp before anything else.
    ///
    /// # Errors
    ///
    /// - `MutexError::MalformedMessage` if `from` is not a configured peer, or
    ///   if the timestamp leaves the clock no room to merge and reply. The
    ///   message has no effect.
    pub fn handle_message(
        &mut self,
        from: NodeId,
        message: MutexMessage,
    ) -> Result<Vec<MutexAction>, MutexError> {
        if !self.peers.contains(&from) {
            return Err(MutexError::MalformedMessage {
                from,
                reason: format!("node {from} is not a peer of node {}", self.id),
            });
        }

        let received = message.timestamp();
        if !self.clock.has_room(received, 1) {
            return Err(MutexError::MalformedMessage {
                from,
                reason: format!("timestamp {received} would overflow the local clock"),
            });
        }

        if self.clock.observe(received).is_none() {
            return Err(MutexError::ClockExhausted { clock: self.clock() });
        }

        let mut actions = Vec::with_capacity(2);
        match message {
            MutexMessage::Request { timestamp } => {
                self.queue.insert(RequestEntry::new(timestamp, from));
                actions.push(self.acknowledge(from)?);
            },
            MutexMessage::Ack { timestamp } => self.record_ack(from, timestamp),
            MutexMessage::Release { .. } => {
                self.queue.remove(from);
            },
        }

        actions.extend(self.try_enter());
        Ok(actions)
    }

    /// Leave the critical section.
    ///
    /// Removes the node's own entry, ticks the clock and broadcasts RELEASE.
    ///
    /// # Errors
    ///
    /// - `MutexError::InvariantViolation` unless InCs
    /// - `MutexError::ClockExhausted` if the clock is at `Timestamp::MAX`
    pub fn release_cs(&mut self) -> Result<Vec<MutexAction>, MutexError> {
        let (MutexState::InCs, Some(request)) = (self.state, self.request) else {
            return Err(MutexError::InvariantViolation {
                state: self.state,
                operation: "release_cs",
            });
        };

        let timestamp = self.tick()?;
        self.queue.remove(self.id);
        self.state = MutexState::Idle;
        self.request = None;
        self.acks.clear();

        tracing::debug!(node = self.id, request, timestamp, "released critical section");

        // Exit precedes the RELEASE so the driver records leaving before any
        // peer can be granted entry.
        let mut actions = vec![MutexAction::Exit { timestamp: request }];
        if !self.peers.is_empty() {
            actions.push(MutexAction::Broadcast(MutexMessage::Release { timestamp }));
        }
        Ok(actions)
    }

    /// Reply to a REQUEST.
    ///
    /// Unconditional: a node acknowledges every REQUEST whatever its own
    /// state, including while Waiting or InCs. The queue, not the ACK,
    /// carries priority.
    fn acknowledge(&mut self, to: NodeId) -> Result<MutexAction, MutexError> {
        let timestamp = self.tick()?;
        Ok(MutexAction::Send { to, message: MutexMessage::Ack { timestamp } })
    }

    fn tick(&mut self) -> Result<Timestamp, MutexError> {
        self.clock.tick().ok_or(MutexError::ClockExhausted { clock: self.clock() })
    }

    fn record_ack(&mut self, from: NodeId, timestamp: Timestamp) {
        match (self.state, self.request) {
            // An ACK for the current request was stamped after the peer
            // observed it, so its timestamp is strictly larger.
            (MutexState::Waiting, Some(request)) if timestamp > request => {
                self.acks.insert(from);
            },
            _ => {
                tracing::debug!(
                    node = self.id,
                    from,
                    timestamp,
                    state = ?self.state,
                    "ignoring stale ACK"
                );
            },
        }
    }

    fn try_enter(&mut self) -> Option<MutexAction> {
        let request = self.request?;
        if self.state != MutexState::Waiting
            || self.acks.len() != self.peers.len()
            || !self.queue.is_head(self.id)
        {
            return None;
        }

        self.state = MutexState::InCs;
        tracing::debug!(node = self.id, timestamp = request, "entering critical section");
        Some(MutexAction::Enter { timestamp: request })
    }
}
