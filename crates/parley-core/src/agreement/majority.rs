//! Majority vote with a fixed tie-break.

use parley_proto::Order;

/// Value chosen when a vote is tied or a value never arrived.
pub const DEFAULT_ORDER: Order = Order::Retreat;

/// Majority of `values`.
///
/// Exact ties, including the empty vote, resolve to [`DEFAULT_ORDER`] so
/// every loyal node breaks the same tie the same way.
pub fn majority(values: impl IntoIterator<Item = Order>) -> Order {
    let (attack, retreat) = values.into_iter().fold((0usize, 0usize), |(a, r), v| match v {
        Order::Attack => (a + 1, r),
        Order::Retreat => (a, r + 1),
    });

    match attack.cmp(&retreat) {
        std::cmp::Ordering::Greater => Order::Attack,
        std::cmp::Ordering::Less => Order::Retreat,
        std::cmp::Ordering::Equal => DEFAULT_ORDER,
    }
}
