//! Direct recursive OM(m), as in the original paper.
//!
//! ```text
//! OM(0): the commander sends its value to every lieutenant; each uses it.
//! OM(m): the commander sends its value to every lieutenant i, giving v_i.
//!        Each i acts as commander in OM(m-1), sending v_i to the others.
//!        Lieutenant i decides majority(v_i, w_j for j != i), where w_j is
//!        what i decided in the OM(m-1) that j commanded.
//! ```
//!
//! No messages, no trees: just recursive calls. Every value a node "sends"
//! goes through that node's relay policy with the same path the
//! message-driven implementation would attach.

use std::collections::BTreeMap;

use arbitrary::{Arbitrary, Unstructured};
use parley_core::{Behavior, RelayPolicy, agreement::DEFAULT_ORDER, majority};
use parley_proto::{NodeId, Order, Path};

/// Cluster description for one OM execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCluster {
    /// Number of nodes; ids are `0..size`
    pub size: u32,
    /// Recursion depth `f`
    pub fault_bound: u32,
    /// Commander id
    pub commander: NodeId,
    /// Faulty nodes and their policies; everyone else is loyal
    pub faulty: BTreeMap<NodeId, Behavior>,
}

impl ModelCluster {
    /// Loyal cluster.
    pub fn loyal(size: u32, fault_bound: u32) -> Self {
        Self { size, fault_bound, commander: 0, faulty: BTreeMap::new() }
    }

    /// Mark `id` faulty with `behavior`.
    #[must_use]
    pub fn with_faulty(mut self, id: NodeId, behavior: Behavior) -> Self {
        self.faulty.insert(id, behavior);
        self
    }

    /// All node ids.
    pub fn members(&self) -> Vec<NodeId> {
        (0..self.size).collect()
    }

    /// Every node except the Commander.
    pub fn lieutenants(&self) -> Vec<NodeId> {
        (0..self.size).filter(|&id| id != self.commander).collect()
    }

    /// Policy of `id`.
    pub fn behavior(&self, id: NodeId) -> Behavior {
        self.faulty.get(&id).copied().unwrap_or_default()
    }

    /// Decision of every Lieutenant when the Commander is given `value`.
    pub fn decide(&self, value: Order) -> BTreeMap<NodeId, Order> {
        let root = Path::root(self.commander);
        let lieutenants = self.lieutenants();
        let commander = self.behavior(self.commander);
        let received: BTreeMap<NodeId, Order> =
            lieutenants.iter().map(|&id| (id, commander.relay(value, id, &root))).collect();

        self.om(&root, &lieutenants, &received, self.fault_bound)
    }

    /// One level of the recursion.
    ///
    /// `received[i]` is what lieutenant `i` got from the sub-commander at
    /// the end of `path`. Returns what each lieutenant decides for `path`.
    fn om(
        &self,
        path: &Path,
        lieutenants: &[NodeId],
        received: &BTreeMap<NodeId, Order>,
        m: u32,
    ) -> BTreeMap<NodeId, Order> {
        if m == 0 {
            return received.clone();
        }

        let mut sub_decisions: BTreeMap<NodeId, BTreeMap<NodeId, Order>> = BTreeMap::new();
        for &j in lieutenants {
            let sub_path = path.extend(j);
            let others: Vec<NodeId> = lieutenants.iter().copied().filter(|&i| i != j).collect();
            let relayed = received.get(&j).copied().unwrap_or(DEFAULT_ORDER);
            let policy = self.behavior(j);
            let sent: BTreeMap<NodeId, Order> =
                others.iter().map(|&i| (i, policy.relay(relayed, i, &sub_path))).collect();
            sub_decisions.insert(j, self.om(&sub_path, &others, &sent, m - 1));
        }

        lieutenants
            .iter()
            .map(|&i| {
                let own = received.get(&i).copied().unwrap_or(DEFAULT_ORDER);
                let heard = lieutenants
                    .iter()
                    .filter(|&&j| j != i)
                    .filter_map(|j| sub_decisions.get(j).and_then(|d| d.get(&i)).copied());
                (i, majority(std::iter::once(own).chain(heard)))
            })
            .collect()
    }
}

fn behavior(u: &mut Unstructured<'_>) -> arbitrary::Result<Behavior> {
    Ok(match u.int_in_range(0u8..=4)? {
        0 => Behavior::Inverting,
        1 => Behavior::SplitBrain,
        2 => Behavior::Fixed(Order::Attack),
        3 => Behavior::Fixed(Order::Retreat),
        _ => Behavior::Loyal,
    })
}

impl<'a> Arbitrary<'a> for ModelCluster {
    /// Valid clusters only: `size >= 3f + 1`, at most `f` faulty nodes.
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let fault_bound = u.int_in_range(0u32..=2)?;
        let size = u.int_in_range((3 * fault_bound + 1).max(2)..=3 * fault_bound + 3)?;
        let commander = u.int_in_range(0..=size - 1)?;

        let mut faulty = BTreeMap::new();
        for _ in 0..fault_bound {
            let id = u.int_in_range(0..=size - 1)?;
            faulty.insert(id, behavior(u)?);
        }

        Ok(Self { size, fault_bound, commander, faulty })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn om0_trusts_commander() {
        let cluster = ModelCluster::loyal(3, 0).with_faulty(0, Behavior::SplitBrain);
        let decisions = cluster.decide(Order::Attack);
        assert_eq!(decisions, BTreeMap::from([(1, Order::Attack), (2, Order::Retreat)]));
    }

    #[test]
    fn om1_masks_split_brain_lieutenant() {
        // Lieutenant 3 relays different values to its two loyal peers.
        let path = Path::root(0).extend(3);
        assert_ne!(
            Behavior::SplitBrain.relay(Order::Attack, 1, &path),
            Behavior::SplitBrain.relay(Order::Attack, 2, &path)
        );

        let cluster = ModelCluster::loyal(4, 1).with_faulty(3, Behavior::SplitBrain);
        let decisions = cluster.decide(Order::Attack);
        assert_eq!(decisions.get(&1), Some(&Order::Attack));
        assert_eq!(decisions.get(&2), Some(&Order::Attack));
    }

    #[test]
    fn om1_loyal_lieutenants_agree_under_faulty_commander() {
        let cluster = ModelCluster::loyal(4, 1).with_faulty(0, Behavior::SplitBrain);
        let decisions = cluster.decide(Order::Attack);
        let values: Vec<Order> = decisions.values().copied().collect();
        assert!(values.windows(2).all(|w| w[0] == w[1]), "{decisions:?}");
    }

    #[test]
    fn arbitrary_clusters_are_valid() {
        let bytes: Vec<u8> = (0..=255).collect();
        let mut u = Unstructured::new(&bytes);
        for _ in 0..16 {
            let Ok(cluster) = ModelCluster::arbitrary(&mut u) else { break };
            assert!(cluster.size > 3 * cluster.fault_bound);
            assert!(cluster.faulty.len() <= cluster.fault_bound as usize);
            assert!(cluster.commander < cluster.size);
        }
    }
}
