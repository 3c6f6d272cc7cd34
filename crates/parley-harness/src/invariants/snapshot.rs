//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture what a run made visible: critical section transitions
//! in global order, and each Lieutenant's decision. Invariants operate on
//! snapshots rather than live nodes so every check sees one consistent state.

use std::collections::{BTreeMap, BTreeSet};

use parley_node::{CsEvent, simulate::AgreementReport};
use parley_proto::{NodeId, Order};
use serde::Serialize;

/// Snapshot of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemSnapshot {
    /// Critical section transitions in the order they happened.
    pub cs_events: Vec<CsEvent>,
    /// Outcome of an agreement run, if there was one.
    pub agreement: Option<AgreementSnapshot>,
}

impl SystemSnapshot {
    /// Snapshot with nothing observed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot of a mutual exclusion run.
    pub fn from_events(cs_events: Vec<CsEvent>) -> Self {
        Self { cs_events, agreement: None }
    }

    /// Snapshot of an agreement run.
    pub fn from_agreement(agreement: AgreementSnapshot) -> Self {
        Self { cs_events: Vec::new(), agreement: Some(agreement) }
    }

    /// Clock values each node reported, in event order.
    pub fn clock_history(&self) -> BTreeMap<NodeId, Vec<u64>> {
        let mut history: BTreeMap<NodeId, Vec<u64>> = BTreeMap::new();
        for event in &self.cs_events {
            history.entry(event.node).or_default().push(event.clock);
        }
        history
    }
}

/// Snapshot of one OM(f) execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgreementSnapshot {
    /// Commander of the execution.
    pub commander: NodeId,
    /// Order the Commander was given.
    pub order: Order,
    /// Nodes running a non-loyal policy.
    pub faulty: BTreeSet<NodeId>,
    /// Every Lieutenant that was expected to decide.
    pub lieutenants: BTreeSet<NodeId>,
    /// Decisions reached.
    pub decisions: BTreeMap<NodeId, Order>,
}

impl AgreementSnapshot {
    /// Whether the Commander was loyal.
    pub fn commander_loyal(&self) -> bool {
        !self.faulty.contains(&self.commander)
    }

    /// Decisions of loyal Lieutenants.
    pub fn loyal_decisions(&self) -> impl Iterator<Item = (NodeId, Order)> + '_ {
        self.decisions
            .iter()
            .filter(|(id, _)| !self.faulty.contains(id))
            .map(|(id, value)| (*id, *value))
    }
}

impl From<&AgreementReport> for AgreementSnapshot {
    fn from(report: &AgreementReport) -> Self {
        Self {
            commander: parley_node::simulate::COMMANDER,
            order: report.order,
            faulty: report.traitors.clone(),
            lieutenants: report.decisions.keys().copied().collect(),
            decisions: report.decisions.clone(),
        }
    }
}
