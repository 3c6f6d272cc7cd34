//! The Lieutenant: receives, relays, and decides.
//!
//! Every value a Lieutenant accepts is one step of the OM recursion: it is
//! recorded at its path and, while relay rounds remain, forwarded as the
//! sub-Commander's order to every Lieutenant that has not yet seen it.
//! Relays received in turn are the sub-executions' values. The decision is
//! the recursive majority over all of them.

use parley_proto::{AgreementMessage, NodeId, Order, Path, RelayMessage};

use super::{AgreementAction, check_fault_bound, relay::RelayPolicy, tree::ValueTree};
use crate::error::AgreementError;

/// Lieutenant of one OM(f) execution.
#[derive(Debug, Clone)]
pub struct Lieutenant<P> {
    id: NodeId,
    commander: NodeId,
    fault_bound: u32,
    tree: ValueTree,
    policy: P,
    decision: Option<Order>,
}

impl<P: RelayPolicy> Lieutenant<P> {
    /// Lieutenant `id` in a cluster of `members` led by `commander`.
    ///
    /// # Errors
    ///
    /// - `AgreementError::InvalidConfig` if `id` or `commander` is not a
    ///   member, if `id` is the Commander, or if the cluster is smaller than
    ///   `3f + 1`
    pub fn new(
        id: NodeId,
        commander: NodeId,
        members: impl IntoIterator<Item = NodeId>,
        fault_bound: u32,
        policy: P,
    ) -> Result<Self, AgreementError> {
        let mut members: Vec<NodeId> = members.into_iter().collect();
        members.sort_unstable();
        members.dedup();

        if id == commander {
            return Err(AgreementError::InvalidConfig(format!(
                "node {id} cannot be both commander and lieutenant"
            )));
        }
        if !members.contains(&commander) || !members.contains(&id) {
            return Err(AgreementError::InvalidConfig(format!(
                "nodes {commander} and {id} must both be cluster members"
            )));
        }
        check_fault_bound(members.len(), fault_bound)?;

        Ok(Self {
            id,
            commander,
            fault_bound,
            tree: ValueTree::new(id, commander, members, fault_bound),
            policy,
            decision: None,
        })
    }

    /// This node's id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Commander of this execution.
    #[must_use]
    pub fn commander(&self) -> NodeId {
        self.commander
    }

    /// Number of faulty nodes tolerated.
    #[must_use]
    pub fn fault_bound(&self) -> u32 {
        self.fault_bound
    }

    /// Values received so far.
    #[must_use]
    pub fn tree(&self) -> &ValueTree {
        &self.tree
    }

    /// Relay policy in use.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Decided value, once there is one.
    #[must_use]
    pub fn decision(&self) -> Option<Order> {
        self.decision
    }

    /// Process an ORDER or RELAY sent by `from`.
    ///
    /// Returns the relays to send and, if this value completed the tree,
    /// [`AgreementAction::Decided`]. A value for a path that already has one
    /// is ignored.
    ///
    /// # Errors
    ///
    /// - `AgreementError::MalformedMessage` if the path or depth is
    ///   inconsistent with the sender. The message has no effect.
    pub fn handle_message(
        &mut self,
        from: NodeId,
        message: AgreementMessage,
    ) -> Result<Vec<AgreementAction>, AgreementError> {
        let (path, value, depth) = match message {
            AgreementMessage::Order(order) => {
                if from != self.commander {
                    return Err(AgreementError::malformed(
                        from,
                        "only the commander may send an order",
                    ));
                }
                (Path::root(self.commander), order.value, order.depth)
            },
            AgreementMessage::Relay(relay) => {
                self.validate_relay(from, &relay)?;
                (relay.path, relay.value, relay.depth)
            },
        };

        match self.tree.remaining_depth(&path) {
            Some(expected) if expected == depth => {},
            _ => {
                return Err(AgreementError::malformed(
                    from,
                    format!("depth {depth} does not match path {path}"),
                ));
            },
        }

        if !self.tree.record(path.clone(), value) {
            tracing::debug!(node = self.id, from, %path, "ignoring duplicate value");
            return Ok(Vec::new());
        }

        tracing::debug!(node = self.id, from, %path, %value, depth, "recorded value");

        let mut actions = self.relay(&path, value, depth);
        if self.decision.is_none() && self.tree.is_complete() {
            let decided = self.decide_now();
            actions.push(AgreementAction::Decided { value: decided });
        }
        Ok(actions)
    }

    /// Decide from whatever has arrived.
    ///
    /// Absent values count as the default order. Once a decision exists it
    /// never changes.
    pub fn decide_now(&mut self) -> Order {
        if let Some(value) = self.decision {
            return value;
        }

        let value = self.tree.decide();
        self.decision = Some(value);
        tracing::info!(
            node = self.id,
            %value,
            received = self.tree.len(),
            expected = self.tree.expected_len(),
            "decided"
        );
        value
    }

    fn validate_relay(&self, from: NodeId, relay: &RelayMessage) -> Result<(), AgreementError> {
        let path = &relay.path;
        if path.len() < 2 {
            return Err(AgreementError::malformed(from, "relay path too short"));
        }
        if path.first() != Some(self.commander) {
            return Err(AgreementError::malformed(
                from,
                format!("path {path} does not start at the commander"),
            ));
        }
        if path.last() != Some(from) {
            return Err(AgreementError::malformed(
                from,
                format!("path {path} does not end at the sender"),
            ));
        }
        if !path.is_simple() {
            return Err(AgreementError::malformed(from, format!("path {path} repeats a node")));
        }
        if let Some(stranger) =
            path.as_slice()[1..].iter().find(|&&id| !self.tree.is_lieutenant(id))
        {
            return Err(AgreementError::malformed(
                from,
                format!("path {path} names node {stranger}, which is not a lieutenant"),
            ));
        }
        if path.contains(self.id) {
            return Err(AgreementError::malformed(
                from,
                format!("path {path} already passed through node {}", self.id),
            ));
        }
        Ok(())
    }

    /// Forward the value stored at `path` as a sub-Commander.
    fn relay(&self, path: &Path, value: Order, depth: u32) -> Vec<AgreementAction> {
        if depth == 0 {
            return Vec::new();
        }

        let extended = path.extend(self.id);
        self.tree
            .successors(path)
            .map(|to| AgreementAction::Send {
                to,
                message: AgreementMessage::Relay(RelayMessage {
                    value: self.policy.relay(value, to, &extended),
                    path: extended.clone(),
                    depth: depth - 1,
                }),
            })
            .collect()
    }
}
