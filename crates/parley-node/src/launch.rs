//! Starting nodes from a cluster file over TCP.

use std::{net::SocketAddr, sync::Arc};

use parley_core::{Behavior, Commander, Lieutenant};
use parley_proto::{NodeId, Order};
use tokio::{net::TcpListener, task::JoinHandle};

use crate::{
    agreement_node::{LieutenantNode, issue_order},
    config::ClusterConfig,
    error::NodeError,
    mutex_node::{EventLog, MutexNode},
    server::{Inbound, serve_listener},
    transport::{PeerTransport, TokioConnector},
};

/// TCP transport used by the binary.
pub type TcpTransport = PeerTransport<TokioConnector>;

/// A node accepting connections in the background.
#[derive(Debug)]
pub struct Running<N> {
    /// The node
    pub node: Arc<N>,
    /// Address the listener is bound to
    pub local_addr: SocketAddr,
    server: JoinHandle<std::io::Result<()>>,
}

impl<N> Running<N> {
    /// Keep serving until the listener fails.
    ///
    /// # Errors
    ///
    /// - `NodeError::Io` if accepting fails or the server task dies
    pub async fn serve_forever(self) -> Result<(), NodeError> {
        self.server.await.map_err(std::io::Error::other)??;
        Ok(())
    }

    /// Stop accepting connections.
    pub fn shutdown(&self) {
        self.server.abort();
    }
}

fn start<N: Inbound>(listener: TcpListener, node: N) -> Result<Running<N>, NodeError> {
    let local_addr = listener.local_addr()?;
    let node = Arc::new(node);
    let server = tokio::spawn(serve_listener(listener, Arc::clone(&node)));
    Ok(Running { node, local_addr, server })
}

async fn bind(config: &ClusterConfig, id: NodeId) -> Result<TcpListener, NodeError> {
    let addr = &config.node(id)?.addr;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(node = id, %addr, "listening");
    Ok(listener)
}

fn transport(config: &ClusterConfig, id: NodeId) -> TcpTransport {
    PeerTransport::new(id, config.peer_addrs(id), TokioConnector)
}

/// Start mutual exclusion node `id` on its configured address.
///
/// # Errors
///
/// - `NodeError::Config` if `id` is not in the cluster
/// - `NodeError::Io` if the address cannot be bound
pub async fn start_mutex_node(
    config: &ClusterConfig,
    id: NodeId,
    log: EventLog,
) -> Result<Running<MutexNode<TcpTransport>>, NodeError> {
    let listener = bind(config, id).await?;
    start_mutex_node_on(listener, config, id, log)
}

/// Start mutual exclusion node `id` on an already bound listener.
///
/// # Errors
///
/// - `NodeError::Config` if `id` is not in the cluster
pub fn start_mutex_node_on(
    listener: TcpListener,
    config: &ClusterConfig,
    id: NodeId,
    log: EventLog,
) -> Result<Running<MutexNode<TcpTransport>>, NodeError> {
    config.node(id)?;
    start(listener, MutexNode::new(config.member_ids(), transport(config, id), log))
}

/// Start Lieutenant `id` on its configured address.
///
/// # Errors
///
/// - `NodeError::Config` if the cluster cannot run agreement
/// - `NodeError::Agreement` if `id` is the Commander
/// - `NodeError::Io` if the address cannot be bound
pub async fn start_lieutenant(
    config: &ClusterConfig,
    id: NodeId,
) -> Result<Running<LieutenantNode<TcpTransport, Behavior>>, NodeError> {
    config.validate_agreement()?;
    let listener = bind(config, id).await?;
    start_lieutenant_on(listener, config, id)
}

/// Start Lieutenant `id` on an already bound listener.
///
/// # Errors
///
/// - `NodeError::Config` if the cluster cannot run agreement
/// - `NodeError::Agreement` if `id` is the Commander
pub fn start_lieutenant_on(
    listener: TcpListener,
    config: &ClusterConfig,
    id: NodeId,
) -> Result<Running<LieutenantNode<TcpTransport, Behavior>>, NodeError> {
    config.validate_agreement()?;
    let behavior = config.node(id)?.behavior;
    let lieutenant =
        Lieutenant::new(id, config.commander, config.member_ids(), config.fault_bound, behavior)?;
    tracing::info!(node = id, %behavior, commander = config.commander, "lieutenant ready");
    start(listener, LieutenantNode::new(lieutenant, transport(config, id)))
}

/// Send one order from the configured Commander.
///
/// # Errors
///
/// - `NodeError::Config` if the cluster cannot run agreement
/// - `NodeError::Transport` if a Lieutenant could not be reached
pub async fn run_commander(config: &ClusterConfig, order: Order) -> Result<(), NodeError> {
    config.validate_agreement()?;
    let id = config.commander;
    let behavior = config.node(id)?.behavior;
    let commander = Commander::new(id, config.member_ids(), config.fault_bound, behavior);
    issue_order(&commander, &transport(config, id), order).await
}
