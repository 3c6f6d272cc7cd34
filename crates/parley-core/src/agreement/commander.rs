//! The Commander: origin of the order.

use parley_proto::{AgreementMessage, NodeId, Order, OrderMessage, Path};

use super::{AgreementAction, relay::RelayPolicy};

/// Commander of one OM(f) execution.
///
/// Sends one ORDER to each Lieutenant and takes no further part. A faulty
/// Commander is one whose policy sends different Lieutenants different
/// values.
#[derive(Debug, Clone)]
pub struct Commander<P> {
    id: NodeId,
    lieutenants: Vec<NodeId>,
    fault_bound: u32,
    policy: P,
}

impl<P: RelayPolicy> Commander<P> {
    /// Commander `id` of a cluster of `members` (which may include `id`).
    pub fn new(
        id: NodeId,
        members: impl IntoIterator<Item = NodeId>,
        fault_bound: u32,
        policy: P,
    ) -> Self {
        let mut lieutenants: Vec<NodeId> = members.into_iter().filter(|&m| m != id).collect();
        lieutenants.sort_unstable();
        lieutenants.dedup();
        Self { id, lieutenants, fault_bound, policy }
    }

    /// This node's id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Lieutenants the order goes to.
    #[must_use]
    pub fn lieutenants(&self) -> &[NodeId] {
        &self.lieutenants
    }

    /// Relay policy in use.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// One ORDER per Lieutenant at depth `f`.
    ///
    /// The value each Lieutenant gets passes through the policy, so a loyal
    /// Commander sends `value` to everyone.
    #[must_use]
    pub fn broadcast_order(&self, value: Order) -> Vec<AgreementAction> {
        let root = Path::root(self.id);
        tracing::info!(node = self.id, %value, depth = self.fault_bound, "issuing order");

        self.lieutenants
            .iter()
            .map(|&to| AgreementAction::Send {
                to,
                message: AgreementMessage::Order(OrderMessage {
                    value: self.policy.relay(value, to, &root),
                    depth: self.fault_bound,
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agreement::{Behavior, SplitBrain};

    #[test]
    fn loyal_commander_sends_same_order_to_all() {
        let commander = Commander::new(0, [0, 1, 2, 3], 1, Behavior::Loyal);
        let actions = commander.broadcast_order(Order::Attack);

        assert_eq!(actions.len(), 3);
        for (action, to) in actions.iter().zip([1, 2, 3]) {
            assert_eq!(
                action,
                &AgreementAction::Send {
                    to,
                    message: AgreementMessage::Order(OrderMessage {
                        value: Order::Attack,
                        depth: 1
                    }),
                }
            );
        }
    }

    #[test]
    fn faulty_commander_splits_values() {
        let commander = Commander::new(0, [0, 1, 2, 3], 1, SplitBrain);
        let values: Vec<_> = commander
            .broadcast_order(Order::Attack)
            .into_iter()
            .filter_map(|action| match action {
                AgreementAction::Send { message, .. } => Some(message.value()),
                AgreementAction::Decided { .. } => None,
            })
            .collect();

        assert_eq!(values, vec![Order::Attack, Order::Retreat, Order::Attack]);
    }
}
