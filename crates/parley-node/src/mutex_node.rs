//! Lamport mutual exclusion node actor.
//!
//! Wraps one [`MutexCoordinator`] and executes its actions over a
//! [`Transport`]. The driver calls [`MutexNode::acquire`] and
//! [`MutexNode::release`]; inbound messages arrive through [`Inbound`]
//! concurrently with it.
//!
//! # Ordering
//!
//! State updates happen under the coordinator lock. Before that lock is
//! released the update takes a place in the send queue, so actions leave the
//! node in the same order as the updates that produced them. Per-peer FIFO
//! then holds end to end, which the protocol's ordering property needs.

use std::sync::{Arc, PoisonError};

use parley_core::{MutexAction, MutexCoordinator, MutexError, MutexState};
use parley_proto::{NodeId, Payload, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::{error::NodeError, server::Inbound, transport::Transport};

/// Whether a node entered or left the critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsEventKind {
    /// Entered
    Enter,
    /// Left
    Exit,
}

/// One critical section transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsEvent {
    /// Node that moved
    pub node: NodeId,
    /// Enter or exit
    pub kind: CsEventKind,
    /// Timestamp of the request being served
    pub timestamp: Timestamp,
    /// Node's logical clock right after the transition
    pub clock: Timestamp,
}

/// Append-only record of critical section transitions.
///
/// Clones share the same log, so one log handed to every node of an
/// in-process cluster yields a single global order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<std::sync::Mutex<Vec<CsEvent>>>,
}

impl EventLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event`.
    pub fn record(&self, event: CsEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }

    /// Copy of every event so far, in recording order.
    #[must_use]
    pub fn events(&self) -> Vec<CsEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of events recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First entry that happened while another node was inside.
    ///
    /// Returns the holder's entry and the intruding entry.
    #[must_use]
    pub fn first_overlap(&self) -> Option<(CsEvent, CsEvent)> {
        let mut holder: Option<CsEvent> = None;
        for event in self.events() {
            match (event.kind, holder) {
                (CsEventKind::Enter, Some(inside)) => return Some((inside, event)),
                (CsEventKind::Enter, None) => holder = Some(event),
                (CsEventKind::Exit, Some(inside)) if inside.node == event.node => holder = None,
                (CsEventKind::Exit, _) => {},
            }
        }
        None
    }
}

/// Mutual exclusion node.
#[derive(Debug)]
pub struct MutexNode<T> {
    id: NodeId,
    coordinator: Mutex<MutexCoordinator>,
    send_order: Mutex<()>,
    entered: Notify,
    transport: T,
    log: EventLog,
}

impl<T: Transport> MutexNode<T> {
    /// Node for `transport`'s id in a cluster of `members`.
    pub fn new(members: impl IntoIterator<Item = NodeId>, transport: T, log: EventLog) -> Self {
        let id = transport.local_id();
        Self {
            id,
            coordinator: Mutex::new(MutexCoordinator::new(id, members)),
            send_order: Mutex::new(()),
            entered: Notify::new(),
            transport,
            log,
        }
    }

    /// This node's id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Shared event log.
    #[must_use]
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Current protocol state.
    pub async fn state(&self) -> MutexState {
        self.coordinator.lock().await.state()
    }

    /// Current logical clock.
    pub async fn clock(&self) -> Timestamp {
        self.coordinator.lock().await.clock()
    }

    /// Request the critical section and wait until it is granted.
    ///
    /// Returns the request timestamp.
    ///
    /// # Errors
    ///
    /// - `NodeError::Mutex` if the node is not Idle
    /// - `NodeError::Transport` if the REQUEST could not reach every peer.
    ///   The request stays outstanding.
    pub async fn acquire(&self) -> Result<Timestamp, NodeError> {
        let mut coordinator = self.coordinator.lock().await;
        let actions = coordinator.request_cs()?;
        let Some(timestamp) = coordinator.pending_request() else {
            return Err(MutexError::InvariantViolation {
                state: coordinator.state(),
                operation: "request_cs",
            }
            .into());
        };

        self.commit(coordinator, actions).await?;
        self.entered.notified().await;
        Ok(timestamp)
    }

    /// Leave the critical section.
    ///
    /// # Errors
    ///
    /// - `NodeError::Mutex` if the node is not in the critical section
    /// - `NodeError::Transport` if the RELEASE could not reach every peer
    pub async fn release(&self) -> Result<(), NodeError> {
        let mut coordinator = self.coordinator.lock().await;
        let actions = coordinator.release_cs()?;
        self.commit(coordinator, actions).await
    }

    /// Execute `actions` in the order their update happened.
    ///
    /// Takes the send slot while still holding the coordinator, then lets
    /// the coordinator go before any I/O.
    async fn commit(
        &self,
        coordinator: MutexGuard<'_, MutexCoordinator>,
        actions: Vec<MutexAction>,
    ) -> Result<(), NodeError> {
        let clock = coordinator.clock();
        let _send_slot = self.send_order.lock().await;
        drop(coordinator);

        let mut first_error = None;
        for action in actions {
            let result = match action {
                MutexAction::Send { to, message } => self.transport.send(to, message.into()).await,
                MutexAction::Broadcast(message) => self.transport.broadcast(message.into()).await,
                MutexAction::Enter { timestamp } => {
                    tracing::info!(node = self.id, timestamp, clock, "entered critical section");
                    self.record(CsEventKind::Enter, timestamp, clock);
                    self.entered.notify_one();
                    Ok(())
                },
                MutexAction::Exit { timestamp } => {
                    tracing::info!(node = self.id, timestamp, clock, "left critical section");
                    self.record(CsEventKind::Exit, timestamp, clock);
                    Ok(())
                },
            };
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), |err| Err(err.into()))
    }

    fn record(&self, kind: CsEventKind, timestamp: Timestamp, clock: Timestamp) {
        self.log.record(CsEvent { node: self.id, kind, timestamp, clock });
    }
}

impl<T: Transport> Inbound for MutexNode<T> {
    async fn deliver(&self, from: NodeId, payload: Payload) {
        let Payload::Mutex(message) = payload else {
            tracing::warn!(node = self.id, from, "ignoring agreement message on a mutex node");
            return;
        };

        let mut coordinator = self.coordinator.lock().await;
        let actions = match coordinator.handle_message(from, message) {
            Ok(actions) => actions,
            Err(err) => {
                tracing::warn!(node = self.id, from, error = %err, "discarding message");
                return;
            },
        };

        if let Err(err) = self.commit(coordinator, actions).await {
            tracing::warn!(node = self.id, from, error = %err, "failed to answer message");
        }
    }
}
