//! Property-based tests for OM(f) agreement.
//!
//! Clusters of `N >= 3f + 1` nodes with up to `f` faulty members, random
//! relay policies and random delivery order. Loyal Lieutenants must always
//! agree, and must follow a loyal Commander.

use std::collections::BTreeMap;

use parley_core::{AgreementAction, Behavior, Commander, Lieutenant, RelayPolicy, majority};
use parley_proto::{AgreementMessage, NodeId, Order, OrderMessage};
use proptest::prelude::*;
use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;

const COMMANDER: NodeId = 0;

fn behavior() -> impl Strategy<Value = Behavior> {
    prop_oneof![
        Just(Behavior::Inverting),
        Just(Behavior::SplitBrain),
        Just(Behavior::Fixed(Order::Attack)),
        Just(Behavior::Fixed(Order::Retreat)),
    ]
}

fn order() -> impl Strategy<Value = Order> {
    prop_oneof![Just(Order::Attack), Just(Order::Retreat)]
}

/// Cluster size, fault bound, and the behavior of each faulty node.
fn cluster() -> impl Strategy<Value = (u32, u32, BTreeMap<NodeId, Behavior>)> {
    (0u32..=2)
        .prop_flat_map(|f| (Just(f), (3 * f + 1)..=(3 * f + 2)))
        .prop_flat_map(|(f, n)| {
            let traitors = prop::collection::btree_map(0..n, behavior(), 0..=f as usize);
            (Just(n), Just(f), traitors)
        })
}

/// Run one execution to completion and return each Lieutenant's decision.
fn run(
    size: u32,
    fault_bound: u32,
    traitors: &BTreeMap<NodeId, Behavior>,
    value: Order,
    seed: u64,
) -> BTreeMap<NodeId, Order> {
    let members: Vec<NodeId> = (0..size).collect();
    let policy = |id: NodeId| traitors.get(&id).copied().unwrap_or_default();

    let commander = Commander::new(COMMANDER, members.clone(), fault_bound, policy(COMMANDER));
    let mut lieutenants: BTreeMap<NodeId, Lieutenant<Behavior>> = (1..size)
        .map(|id| {
            let lt = Lieutenant::new(id, COMMANDER, members.clone(), fault_bound, policy(id))
                .expect("valid cluster");
            (id, lt)
        })
        .collect();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut in_flight: Vec<(NodeId, NodeId, AgreementMessage)> = Vec::new();
    let mut decisions = BTreeMap::new();

    let mut collect = |from: NodeId,
                       actions: Vec<AgreementAction>,
                       in_flight: &mut Vec<(NodeId, NodeId, AgreementMessage)>| {
        for action in actions {
            match action {
                AgreementAction::Send { to, message } => in_flight.push((from, to, message)),
                AgreementAction::Decided { value } => {
                    decisions.insert(from, value);
                },
            }
        }
    };

    collect(COMMANDER, commander.broadcast_order(value), &mut in_flight);
    in_flight.shuffle(&mut rng);

    while !in_flight.is_empty() {
        let (from, to, message) = in_flight.swap_remove(rng.gen_range(0..in_flight.len()));
        let lt = lieutenants.get_mut(&to).expect("messages only go to lieutenants");
        let actions = lt.handle_message(from, message).expect("well-formed message");
        collect(to, actions, &mut in_flight);
    }

    decisions
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: every Lieutenant decides once all messages are delivered
    #[test]
    fn prop_every_lieutenant_decides(
        (size, f, traitors) in cluster(),
        value in order(),
        seed in any::<u64>(),
    ) {
        let decisions = run(size, f, &traitors, value, seed);
        prop_assert_eq!(decisions.len(), size as usize - 1);
    }

    /// Property: all loyal Lieutenants decide the same value
    #[test]
    fn prop_loyal_lieutenants_agree(
        (size, f, traitors) in cluster(),
        value in order(),
        seed in any::<u64>(),
    ) {
        let decisions = run(size, f, &traitors, value, seed);
        let loyal: Vec<Order> = decisions
            .iter()
            .filter(|(id, _)| !traitors.contains_key(id))
            .map(|(_, v)| *v)
            .collect();
        prop_assert!(loyal.windows(2).all(|w| w[0] == w[1]), "loyal decisions {:?}", decisions);
    }

    /// Property: with a loyal Commander, loyal Lieutenants decide its order
    #[test]
    fn prop_loyal_commander_is_followed(
        (size, f, traitors) in cluster(),
        value in order(),
        seed in any::<u64>(),
    ) {
        prop_assume!(!traitors.contains_key(&COMMANDER));

        let decisions = run(size, f, &traitors, value, seed);
        for (id, decided) in &decisions {
            if !traitors.contains_key(id) {
                prop_assert_eq!(*decided, value, "lieutenant {} diverged", id);
            }
        }
    }

    /// Property: delivery order never changes the outcome
    #[test]
    fn prop_outcome_independent_of_schedule(
        (size, f, traitors) in cluster(),
        value in order(),
        seeds in (any::<u64>(), any::<u64>()),
    ) {
        let first = run(size, f, &traitors, value, seeds.0);
        let second = run(size, f, &traitors, value, seeds.1);
        prop_assert_eq!(first, second);
    }

    /// Property: an even split always resolves to RETREAT
    #[test]
    fn prop_tie_breaks_to_retreat(half in 0usize..8, seed in any::<u64>()) {
        let mut votes = vec![Order::Attack; half];
        votes.extend(std::iter::repeat_n(Order::Retreat, half));
        votes.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));

        prop_assert_eq!(majority(votes), Order::Retreat);
    }

    /// Property: loyal relaying is the identity for every target and path
    #[test]
    fn prop_loyal_policy_forwards_unchanged(value in order(), target in any::<u32>()) {
        let path = parley_proto::Path::root(COMMANDER).extend(1);
        prop_assert_eq!(Behavior::Loyal.relay(value, target, &path), value);
    }
}

#[test]
fn split_brain_lieutenant_cannot_break_four_node_agreement() {
    // N=4, f=1: Lieutenant 3 tells even targets the opposite, so Lieutenant 1
    // hears ATTACK from it and Lieutenant 2 hears RETREAT.
    let mut traitor =
        Lieutenant::new(3, COMMANDER, [0, 1, 2, 3], 1, Behavior::SplitBrain).expect("valid");
    let order = AgreementMessage::Order(OrderMessage { value: Order::Attack, depth: 1 });
    let relayed: BTreeMap<NodeId, Order> = traitor
        .handle_message(COMMANDER, order)
        .expect("valid order")
        .into_iter()
        .filter_map(|action| match action {
            AgreementAction::Send { to, message: AgreementMessage::Relay(relay) } => {
                Some((to, relay.value))
            },
            _ => None,
        })
        .collect();
    assert_eq!(relayed, BTreeMap::from([(1, Order::Attack), (2, Order::Retreat)]));

    // The loyal Commander orders ATTACK; Lieutenants 1 and 2 must decide it.
    let traitors = BTreeMap::from([(3, Behavior::SplitBrain)]);
    for seed in 0..16 {
        let decisions = run(4, 1, &traitors, Order::Attack, seed);
        assert_eq!(decisions.get(&1), Some(&Order::Attack));
        assert_eq!(decisions.get(&2), Some(&Order::Attack));
    }
}

#[test]
fn faulty_commander_still_yields_agreement() {
    // N=4, f=1 with a split-brain Commander: 1 and 3 hear ATTACK, 2 hears
    // RETREAT. All three loyal Lieutenants still agree.
    let traitors = BTreeMap::from([(COMMANDER, Behavior::SplitBrain)]);
    let decisions = run(4, 1, &traitors, Order::Attack, 7);

    let values: Vec<_> = decisions.values().copied().collect();
    assert_eq!(values.len(), 3);
    assert!(values.iter().all(|v| *v == values[0]));
}
