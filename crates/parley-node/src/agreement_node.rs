//! Byzantine agreement node actors.
//!
//! A [`LieutenantNode`] wraps one [`Lieutenant`] the way a mutex node wraps
//! its coordinator: inbound values update the tree under a lock, the relays
//! they produce are sent in update order, and anyone waiting in
//! [`LieutenantNode::decision`] wakes once the tree resolves. The Commander
//! holds no state across messages, so [`issue_order`] is a plain function.

use parley_core::{AgreementAction, Commander, Lieutenant, RelayPolicy};
use parley_proto::{NodeId, Order, Payload};
use tokio::sync::{Mutex, Notify};

use crate::{error::NodeError, server::Inbound, transport::Transport};

/// Send the Commander's order to every Lieutenant.
///
/// # Errors
///
/// - `NodeError::Transport` if any Lieutenant could not be reached. Every
///   Lieutenant is still attempted.
pub async fn issue_order<T, P>(
    commander: &Commander<P>,
    transport: &T,
    value: Order,
) -> Result<(), NodeError>
where
    T: Transport,
    P: RelayPolicy,
{
    let mut first_error = None;
    for action in commander.broadcast_order(value) {
        if let AgreementAction::Send { to, message } = action
            && let Err(err) = transport.send(to, message.into()).await
        {
            tracing::warn!(node = commander.id(), to, error = %err, "order not delivered");
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), |err| Err(err.into()))
}

/// Lieutenant node.
#[derive(Debug)]
pub struct LieutenantNode<T, P> {
    id: NodeId,
    lieutenant: Mutex<Lieutenant<P>>,
    send_order: Mutex<()>,
    decided: Notify,
    transport: T,
}

impl<T, P> LieutenantNode<T, P>
where
    T: Transport,
    P: RelayPolicy + 'static,
{
    /// Node around `lieutenant`, sending through `transport`.
    pub fn new(lieutenant: Lieutenant<P>, transport: T) -> Self {
        Self {
            id: lieutenant.id(),
            lieutenant: Mutex::new(lieutenant),
            send_order: Mutex::new(()),
            decided: Notify::new(),
            transport,
        }
    }

    /// This node's id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Decision so far, without waiting.
    pub async fn current_decision(&self) -> Option<Order> {
        self.lieutenant.lock().await.decision()
    }

    /// Number of values received so far.
    pub async fn received(&self) -> usize {
        self.lieutenant.lock().await.tree().len()
    }

    /// Wait until the tree is complete and return the decision.
    pub async fn decision(&self) -> Order {
        loop {
            let notified = self.decided.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.current_decision().await {
                return value;
            }
            notified.await;
        }
    }

    /// Decide now from whatever has arrived, treating missing values as
    /// the default order.
    pub async fn decide_now(&self) -> Order {
        let value = self.lieutenant.lock().await.decide_now();
        self.decided.notify_waiters();
        value
    }

    async fn execute(&self, actions: Vec<AgreementAction>) {
        for action in actions {
            match action {
                AgreementAction::Send { to, message } => {
                    if let Err(err) = self.transport.send(to, message.into()).await {
                        tracing::warn!(node = self.id, to, error = %err, "relay not delivered");
                    }
                },
                AgreementAction::Decided { value } => {
                    tracing::info!(node = self.id, %value, "decision reached");
                    self.decided.notify_waiters();
                },
            }
        }
    }
}

impl<T, P> Inbound for LieutenantNode<T, P>
where
    T: Transport,
    P: RelayPolicy + 'static,
{
    async fn deliver(&self, from: NodeId, payload: Payload) {
        let Payload::Agreement(message) = payload else {
            tracing::warn!(node = self.id, from, "ignoring mutex message on an agreement node");
            return;
        };

        let mut lieutenant = self.lieutenant.lock().await;
        let actions = match lieutenant.handle_message(from, message) {
            Ok(actions) => actions,
            Err(err) => {
                tracing::warn!(node = self.id, from, error = %err, "discarding message");
                return;
            },
        };
        let _send_slot = self.send_order.lock().await;
        drop(lieutenant);

        self.execute(actions).await;
    }
}
