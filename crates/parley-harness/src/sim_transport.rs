//! Turmoil networking for nodes.
//!
//! Every node runs on a turmoil host named `node-{id}` and listens on
//! [`NODE_PORT`]. Outbound frames go through the production
//! [`PeerTransport`] with a turmoil [`Connector`], so the simulation exercises
//! the same connection handling as the binary.

use std::{collections::BTreeMap, io, net::Ipv4Addr, sync::Arc, time::Duration};

use parley_node::{ConnectPolicy, Connector, Inbound, PeerTransport, serve_connection};
use parley_proto::NodeId;
use turmoil::net::{TcpListener, TcpStream};

/// Port every simulated node listens on.
pub const NODE_PORT: u16 = 9000;

/// Turmoil host name of node `id`.
pub fn host_name(id: NodeId) -> String {
    format!("node-{id}")
}

/// Opens turmoil TCP streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurmoilConnector;

impl Connector for TurmoilConnector {
    type Stream = TcpStream;

    async fn connect(&self, addr: &str) -> io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }
}

/// Transport used by simulated nodes.
pub type SimTransport = PeerTransport<TurmoilConnector>;

/// Transport for node `id` reaching every other member on its host.
///
/// Peers that have not bound their listener yet are retried on simulated
/// time.
pub fn sim_transport(id: NodeId, members: &[NodeId]) -> SimTransport {
    let peers: BTreeMap<NodeId, String> = members
        .iter()
        .filter(|&&peer| peer != id)
        .map(|&peer| (peer, format!("{}:{NODE_PORT}", host_name(peer))))
        .collect();

    PeerTransport::new(id, peers, TurmoilConnector)
        .with_policy(ConnectPolicy { attempts: 100, backoff: Duration::from_millis(50) })
}

/// Bind the node listener on the current host.
pub async fn bind() -> io::Result<TcpListener> {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, NODE_PORT)).await
}

/// Accept turmoil connections forever, serving each on its own task.
pub async fn serve_sim_listener<H: Inbound>(
    listener: TcpListener,
    handler: Arc<H>,
) -> io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            if let Err(err) = serve_connection(stream, handler.as_ref()).await {
                tracing::warn!(%addr, error = %err, "simulated connection failed");
            }
        });
    }
}
