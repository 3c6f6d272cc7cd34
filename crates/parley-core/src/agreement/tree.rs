//! Per-Lieutenant record of every value received, keyed by path.
//!
//! The tree is the state of one OM(f) execution as seen by one Lieutenant.
//! Node `[c]` holds the Commander's direct order, node `[c, j]` the value `j`
//! relayed, node `[c, j, k]` the value `k` claimed `j` relayed to it, and so
//! on down to depth `f`. Deciding walks the tree bottom-up, taking the
//! majority at each level.

use std::collections::BTreeMap;

use parley_proto::{NodeId, Order, Path};

use super::majority::{DEFAULT_ORDER, majority};

/// Values received by one Lieutenant.
///
/// # Invariants
///
/// - Every stored path starts with the Commander, is simple, does not contain
///   the owner, and has at most `fault_bound + 1` elements.
/// - A path holds the first value recorded for it; later values are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueTree {
    owner: NodeId,
    commander: NodeId,
    lieutenants: Vec<NodeId>,
    fault_bound: u32,
    values: BTreeMap<Path, Order>,
}

impl ValueTree {
    /// Empty tree for `owner`.
    ///
    /// `lieutenants` lists every Lieutenant in the cluster, `owner` included.
    pub fn new(
        owner: NodeId,
        commander: NodeId,
        lieutenants: impl IntoIterator<Item = NodeId>,
        fault_bound: u32,
    ) -> Self {
        let mut lieutenants: Vec<NodeId> =
            lieutenants.into_iter().filter(|&id| id != commander).collect();
        lieutenants.sort_unstable();
        lieutenants.dedup();

        Self { owner, commander, lieutenants, fault_bound, values: BTreeMap::new() }
    }

    /// Store `value` for `path`. Returns `false` if the path already had one.
    pub fn record(&mut self, path: Path, value: Order) -> bool {
        match self.values.entry(path) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            },
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Value stored for `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Order> {
        self.values.get(path).copied()
    }

    /// Number of stored paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of paths a complete execution delivers.
    ///
    /// With `L` Lieutenants this is `sum_{k=0..=f} P(L-1, k)`: the direct
    /// order plus every chain of `k` distinct other Lieutenants.
    #[must_use]
    pub fn expected_len(&self) -> usize {
        let others = self.lieutenants.len().saturating_sub(1);
        let mut total = 0usize;
        let mut chains = 1usize;
        for k in 0..=self.fault_bound as usize {
            if k > others {
                break;
            }
            total = total.saturating_add(chains);
            chains = chains.saturating_mul(others - k);
        }
        total
    }

    /// Whether every expected path has a value.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.values.len() >= self.expected_len()
    }

    /// Remaining relay rounds for a value stored at `path`.
    ///
    /// `None` if `path` is longer than the recursion allows.
    #[must_use]
    pub fn remaining_depth(&self, path: &Path) -> Option<u32> {
        let relays = u32::try_from(path.len().checked_sub(1)?).ok()?;
        self.fault_bound.checked_sub(relays)
    }

    /// Whether `id` is one of the Lieutenants.
    #[must_use]
    pub fn is_lieutenant(&self, id: NodeId) -> bool {
        self.lieutenants.binary_search(&id).is_ok()
    }

    /// Lieutenants that have not yet seen a value travelling along `path`.
    ///
    /// These are the targets when the owner relays the value it stored at
    /// `path`, and the children of `path` when resolving.
    pub fn successors<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = NodeId> + 'a {
        self.lieutenants.iter().copied().filter(move |&id| id != self.owner && !path.contains(id))
    }

    /// Recursive majority for the subtree rooted at `path`.
    ///
    /// Leaves return their stored value. Inner nodes take the majority of
    /// their own stored value and the resolved value of each child. Missing
    /// values count as [`DEFAULT_ORDER`].
    #[must_use]
    pub fn resolve(&self, path: &Path) -> Order {
        let own = self.get(path).unwrap_or(DEFAULT_ORDER);
        match self.remaining_depth(path) {
            Some(0) | None => own,
            Some(_) => {
                let children = self.successors(path).map(|k| self.resolve(&path.extend(k)));
                majority(std::iter::once(own).chain(children))
            },
        }
    }

    /// Decision for the whole execution.
    #[must_use]
    pub fn decide(&self) -> Order {
        self.resolve(&Path::root(self.commander))
    }

    /// Stored paths and values in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, Order)> {
        self.values.iter().map(|(path, value)| (path, *value))
    }
}
