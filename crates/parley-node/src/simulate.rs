//! Whole clusters in one process over [`LocalNetwork`].

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use parley_core::{Behavior, Commander, Environment, Lieutenant, agreement::check_fault_bound};
use parley_proto::{NodeId, Order};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::{
    agreement_node::{LieutenantNode, issue_order},
    error::NodeError,
    mutex_node::{CsEvent, CsEventKind, EventLog, MutexNode},
    server::serve_channel,
    transport::{LocalNetwork, TransportError},
    workload::MutexWorkload,
};

/// Commander of every simulated agreement run.
pub const COMMANDER: NodeId = 0;

/// Result of a mutual exclusion run.
#[derive(Debug, Clone, Serialize)]
pub struct MutexReport {
    /// Every transition, in global order
    pub events: Vec<CsEvent>,
    /// Critical sections completed per node
    pub completed: BTreeMap<NodeId, u32>,
    /// First pair of overlapping entries, if any
    pub overlap: Option<(CsEvent, CsEvent)>,
}

impl MutexReport {
    /// Whether no two nodes were ever inside together.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.overlap.is_none()
    }

    /// Entries in grant order.
    pub fn entries(&self) -> impl Iterator<Item = &CsEvent> {
        self.events.iter().filter(|e| e.kind == CsEventKind::Enter)
    }
}

/// Run `size` mutual exclusion nodes, each performing `workload`.
///
/// # Errors
///
/// - The first error returned by any node's workload
pub async fn simulate_mutex<E: Environment>(
    size: u32,
    workload: MutexWorkload,
    env: E,
) -> Result<MutexReport, NodeError> {
    let members: Vec<NodeId> = (0..size).collect();
    let log = EventLog::new();
    let mut servers = JoinSet::new();
    let mut drivers = JoinSet::new();

    for (id, (transport, inbox)) in LocalNetwork::new(members.clone()).into_parts() {
        let node = Arc::new(MutexNode::new(members.clone(), transport, log.clone()));
        servers.spawn(serve_channel(inbox, Arc::clone(&node)));

        let env = env.clone();
        drivers.spawn(async move { (id, workload.run(&node, &env).await) });
    }

    let mut completed = BTreeMap::new();
    let mut first_error = None;
    while let Some(joined) = drivers.join_next().await {
        match joined {
            Ok((id, Ok(rounds))) => {
                completed.insert(id, rounds);
            },
            Ok((id, Err(err))) => {
                tracing::error!(node = id, error = %err, "workload failed");
                first_error.get_or_insert(err);
            },
            Err(err) => tracing::error!(error = %err, "workload task aborted"),
        }
    }
    servers.abort_all();

    if let Some(err) = first_error {
        return Err(err);
    }

    let overlap = log.first_overlap();
    if let Some((holder, intruder)) = overlap {
        tracing::error!(
            holder = holder.node,
            intruder = intruder.node,
            "mutual exclusion violated"
        );
    }
    Ok(MutexReport { events: log.events(), completed, overlap })
}

/// Result of an agreement run.
#[derive(Debug, Clone, Serialize)]
pub struct AgreementReport {
    /// Order given to the Commander
    pub order: Order,
    /// Faulty nodes
    pub traitors: BTreeSet<NodeId>,
    /// Decision of every Lieutenant
    pub decisions: BTreeMap<NodeId, Order>,
}

impl AgreementReport {
    /// Decisions of the loyal Lieutenants.
    pub fn loyal_decisions(&self) -> impl Iterator<Item = (NodeId, Order)> + '_ {
        self.decisions
            .iter()
            .filter(|(id, _)| !self.traitors.contains(id))
            .map(|(id, value)| (*id, *value))
    }

    /// Whether every loyal Lieutenant decided the same value.
    #[must_use]
    pub fn loyal_agree(&self) -> bool {
        let mut values = self.loyal_decisions().map(|(_, v)| v);
        values.next().is_none_or(|first| values.all(|v| v == first))
    }

    /// Whether, with a loyal Commander, every loyal Lieutenant followed it.
    #[must_use]
    pub fn commander_followed(&self) -> bool {
        self.traitors.contains(&COMMANDER) || self.loyal_decisions().all(|(_, v)| v == self.order)
    }
}

/// Faulty node ids for a cluster: the `traitors` highest.
#[must_use]
pub fn traitor_ids(size: u32, traitors: u32) -> BTreeSet<NodeId> {
    (size.saturating_sub(traitors)..size).collect()
}

/// Run OM(`traitors`) on `size` nodes with Commander 0 ordering `order`.
///
/// The highest `traitors` ids relay with [`Behavior::SplitBrain`].
///
/// # Errors
///
/// - `NodeError::Agreement` unless `size >= 3 * traitors + 1`
/// - `NodeError::Transport` if the order could not be delivered
pub async fn simulate_byzantine(
    size: u32,
    traitors: u32,
    order: Order,
) -> Result<AgreementReport, NodeError> {
    check_fault_bound(size as usize, traitors)?;

    let members: Vec<NodeId> = (0..size).collect();
    let faulty = traitor_ids(size, traitors);
    let behavior =
        |id: NodeId| if faulty.contains(&id) { Behavior::SplitBrain } else { Behavior::Loyal };

    tracing::info!(size, fault_bound = traitors, %order, traitors = ?faulty, "starting agreement");

    let mut parts = LocalNetwork::new(members.clone()).into_parts();
    let (commander_transport, _commander_inbox) =
        parts.remove(&COMMANDER).ok_or(TransportError::MissingPeer(COMMANDER))?;

    let mut servers = JoinSet::new();
    let mut nodes = Vec::new();
    for (id, (transport, inbox)) in parts {
        let lieutenant = Lieutenant::new(id, COMMANDER, members.clone(), traitors, behavior(id))?;
        let node = Arc::new(LieutenantNode::new(lieutenant, transport));
        servers.spawn(serve_channel(inbox, Arc::clone(&node)));
        nodes.push(node);
    }

    let commander = Commander::new(COMMANDER, members, traitors, behavior(COMMANDER));
    issue_order(&commander, &commander_transport, order).await?;

    let mut decisions = BTreeMap::new();
    for node in &nodes {
        decisions.insert(node.id(), node.decision().await);
    }
    servers.abort_all();

    let report = AgreementReport { order, traitors: faulty, decisions };
    if !report.loyal_agree() {
        tracing::error!(decisions = ?report.decisions, "loyal lieutenants disagree");
    }
    Ok(report)
}
