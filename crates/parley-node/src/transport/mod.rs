//! Point-to-point message delivery between nodes.
//!
//! The protocols only need two guarantees from a transport: a message either
//! arrives intact or not at all, and messages from one node to another arrive
//! in the order they were sent. Both implementations here provide them:
//!
//! - [`PeerTransport`]: one TCP connection per ordered pair of nodes
//! - [`LocalNetwork`]: in-process channels for single-process clusters

mod local;
mod tcp;

use std::future::Future;

pub use local::{Envelope, LocalNetwork, LocalTransport};
use parley_proto::{NodeId, Payload};
pub use tcp::{ConnectPolicy, Connector, PeerTransport, TokioConnector};
use thiserror::Error;

/// Errors raised when sending.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Destination is not a configured peer
    #[error("unknown peer: node {0}")]
    MissingPeer(NodeId),

    /// Destination could not be reached
    #[error("node {peer} unreachable: {reason}")]
    Unreachable {
        /// Destination node
        peer: NodeId,
        /// Underlying failure
        reason: String,
    },

    /// Payload could not be encoded
    #[error("cannot encode payload: {0}")]
    Encode(String),
}

/// Sends payloads to peers.
///
/// Implementations preserve per-destination order for calls that are not
/// concurrent with each other.
pub trait Transport: Send + Sync + 'static {
    /// Node this transport sends as.
    fn local_id(&self) -> NodeId;

    /// Every node this transport can reach.
    fn peers(&self) -> Vec<NodeId>;

    /// Deliver `payload` to `to`, at most once.
    ///
    /// # Errors
    ///
    /// - `TransportError::MissingPeer` if `to` is not a peer
    /// - `TransportError::Unreachable` if delivery failed
    fn send(
        &self,
        to: NodeId,
        payload: Payload,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Send `payload` to every peer.
    ///
    /// Every peer is attempted; the first failure is returned.
    fn broadcast(
        &self,
        payload: Payload,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            let mut first_error = None;
            for peer in self.peers() {
                if let Err(err) = self.send(peer, payload.clone()).await {
                    tracing::warn!(
                        node = self.local_id(),
                        peer,
                        error = %err,
                        "broadcast send failed"
                    );
                    first_error.get_or_insert(err);
                }
            }
            first_error.map_or(Ok(()), Err)
        }
    }
}
