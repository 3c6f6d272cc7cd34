//! In-process transport over unbounded channels.

use std::{collections::BTreeMap, sync::Arc};

use parley_proto::{NodeId, Payload};
use tokio::sync::mpsc;

use super::{Transport, TransportError};

/// Payload in flight, tagged with its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sending node
    pub from: NodeId,
    /// Message
    pub payload: Payload,
}

/// Builder for a set of in-process nodes.
///
/// Each node gets one inbox. A single channel per receiver keeps every
/// sender's messages in order.
#[derive(Debug, Default)]
pub struct LocalNetwork {
    inboxes: BTreeMap<NodeId, mpsc::UnboundedSender<Envelope>>,
    receivers: BTreeMap<NodeId, mpsc::UnboundedReceiver<Envelope>>,
}

impl LocalNetwork {
    /// Network with one inbox per id.
    pub fn new(ids: impl IntoIterator<Item = NodeId>) -> Self {
        let mut network = Self::default();
        for id in ids {
            let (tx, rx) = mpsc::unbounded_channel();
            network.inboxes.insert(id, tx);
            network.receivers.insert(id, rx);
        }
        network
    }

    /// Split into one transport and one inbox per node.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> BTreeMap<NodeId, (LocalTransport, mpsc::UnboundedReceiver<Envelope>)> {
        let inboxes = Arc::new(self.inboxes);
        self.receivers
            .into_iter()
            .map(|(id, rx)| (id, (LocalTransport { id, inboxes: Arc::clone(&inboxes) }, rx)))
            .collect()
    }
}

/// One node's view of a [`LocalNetwork`].
#[derive(Debug, Clone)]
pub struct LocalTransport {
    id: NodeId,
    inboxes: Arc<BTreeMap<NodeId, mpsc::UnboundedSender<Envelope>>>,
}

impl Transport for LocalTransport {
    fn local_id(&self) -> NodeId {
        self.id
    }

    fn peers(&self) -> Vec<NodeId> {
        self.inboxes.keys().copied().filter(|&id| id != self.id).collect()
    }

    async fn send(&self, to: NodeId, payload: Payload) -> Result<(), TransportError> {
        let inbox = self
            .inboxes
            .get(&to)
            .filter(|_| to != self.id)
            .ok_or(TransportError::MissingPeer(to))?;

        inbox.send(Envelope { from: self.id, payload }).map_err(|_| TransportError::Unreachable {
            peer: to,
            reason: "inbox closed".to_string(),
        })
    }
}
