//! TCP transport: one outbound connection per peer.
//!
//! Connections are opened lazily on first send and reused afterwards. All
//! frames to one peer are written over the same stream under a per-peer lock,
//! which gives FIFO delivery per ordered pair. A failed write drops the
//! connection; the next send reconnects.

use std::{collections::BTreeMap, future::Future, io, time::Duration};

use parley_proto::{NodeId, Payload, codec};
use tokio::{io::AsyncWrite, net::TcpStream, sync::Mutex};

use super::{Transport, TransportError};

/// Opens outbound byte streams.
pub trait Connector: Send + Sync + 'static {
    /// Stream produced by a successful connect.
    type Stream: AsyncWrite + Unpin + Send + 'static;

    /// Connect to `addr`.
    fn connect(&self, addr: &str) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Connects with [`tokio::net::TcpStream`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioConnector;

impl Connector for TokioConnector {
    type Stream = TcpStream;

    async fn connect(&self, addr: &str) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// How hard to try before declaring a peer unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectPolicy {
    /// Connection attempts per send
    pub attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self { attempts: 20, backoff: Duration::from_millis(250) }
    }
}

struct Peer<S> {
    addr: String,
    stream: Mutex<Option<S>>,
}

/// Sends frames to peers over persistent connections.
pub struct PeerTransport<C: Connector> {
    id: NodeId,
    connector: C,
    policy: ConnectPolicy,
    peers: BTreeMap<NodeId, Peer<C::Stream>>,
}

impl<C: Connector> std::fmt::Debug for PeerTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerTransport")
            .field("id", &self.id)
            .field("peers", &self.peers.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> PeerTransport<C> {
    /// Transport for node `id` reaching each peer at its address.
    pub fn new(id: NodeId, peers: BTreeMap<NodeId, String>, connector: C) -> Self {
        let peers = peers
            .into_iter()
            .filter(|(peer, _)| *peer != id)
            .map(|(peer, addr)| (peer, Peer { addr, stream: Mutex::new(None) }))
            .collect();
        Self { id, connector, policy: ConnectPolicy::default(), peers }
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ConnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn connect(&self, to: NodeId, addr: &str) -> Result<C::Stream, TransportError> {
        let mut last_error = None;
        for attempt in 1..=self.policy.attempts.max(1) {
            match self.connector.connect(addr).await {
                Ok(stream) => {
                    tracing::debug!(node = self.id, peer = to, addr, attempt, "connected");
                    return Ok(stream);
                },
                Err(err) => {
                    tracing::trace!(
                        node = self.id,
                        peer = to,
                        attempt,
                        error = %err,
                        "connect failed"
                    );
                    last_error = Some(err);
                    tokio::time::sleep(self.policy.backoff).await;
                },
            }
        }
        Err(TransportError::Unreachable {
            peer: to,
            reason: last_error.map_or_else(|| "no attempts".to_string(), |e| e.to_string()),
        })
    }
}

impl<C: Connector> Transport for PeerTransport<C> {
    fn local_id(&self) -> NodeId {
        self.id
    }

    fn peers(&self) -> Vec<NodeId> {
        self.peers.keys().copied().collect()
    }

    async fn send(&self, to: NodeId, payload: Payload) -> Result<(), TransportError> {
        let peer = self.peers.get(&to).ok_or(TransportError::MissingPeer(to))?;
        let frame =
            payload.into_frame(self.id).map_err(|e| TransportError::Encode(e.to_string()))?;

        let mut slot = peer.stream.lock().await;
        let stream = match slot.take() {
            Some(stream) => stream,
            None => self.connect(to, &peer.addr).await?,
        };
        let stream = slot.insert(stream);

        if let Err(err) = codec::write_frame(stream, &frame).await {
            *slot = None;
            tracing::warn!(
                node = self.id,
                peer = to,
                error = %err,
                "send failed, dropping connection"
            );
            return Err(TransportError::Unreachable { peer: to, reason: err.to_string() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parley_proto::MutexMessage;
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn frames_arrive_in_order_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let transport = PeerTransport::new(3, BTreeMap::from([(1, addr)]), TokioConnector);

        let reader = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut received = Vec::new();
            while let Some(frame) = codec::read_frame(&mut socket).await.expect("valid frame") {
                received.push((frame.sender_id(), Payload::from_frame(&frame).expect("payload")));
            }
            received
        });

        for ts in 1..=5 {
            transport.send(1, MutexMessage::Request { timestamp: ts }.into()).await.expect("send");
        }
        drop(transport);

        let received = reader.await.expect("reader");
        let expected: Vec<(NodeId, Payload)> =
            (1..=5).map(|ts| (3, MutexMessage::Request { timestamp: ts }.into())).collect();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn unreachable_peer_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        drop(listener);

        let transport = PeerTransport::new(0, BTreeMap::from([(1, addr)]), TokioConnector)
            .with_policy(ConnectPolicy { attempts: 2, backoff: Duration::from_millis(1) });

        let result = transport.send(1, MutexMessage::Ack { timestamp: 1 }.into()).await;
        assert!(matches!(result, Err(TransportError::Unreachable { peer: 1, .. })));
        assert_eq!(
            transport.send(2, MutexMessage::Ack { timestamp: 1 }.into()).await,
            Err(TransportError::MissingPeer(2))
        );
    }
}
