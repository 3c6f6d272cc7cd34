//! Property-based tests for the Lamport mutual exclusion state machine.
//!
//! A small in-memory network delivers messages between coordinators over
//! per-pair FIFO channels in a seeded random order. Every property must hold
//! for every schedule.

use std::collections::{BTreeMap, VecDeque};

use parley_core::{MutexAction, MutexCoordinator, MutexState, RequestEntry, RequestQueue};
use parley_proto::{MutexMessage, NodeId, Timestamp};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Observable outcome of one simulated run.
#[derive(Debug, Default)]
struct Outcome {
    /// Granted requests, in the order they entered the critical section
    entries: Vec<RequestEntry>,
    /// Most nodes ever observed in the critical section at once
    max_concurrent: usize,
    /// Completed critical sections per node
    completed: BTreeMap<NodeId, u32>,
    /// Whether every clock only ever moved forward
    clocks_monotonic: bool,
    /// Whether every node stamped strictly increasing timestamps
    sends_increasing: bool,
}

struct Network {
    nodes: Vec<MutexCoordinator>,
    channels: BTreeMap<(NodeId, NodeId), VecDeque<MutexMessage>>,
    last_sent: BTreeMap<NodeId, Timestamp>,
    outcome: Outcome,
}

impl Network {
    fn new(size: u32) -> Self {
        let ids: Vec<NodeId> = (0..size).collect();
        Self {
            nodes: ids.iter().map(|&id| MutexCoordinator::new(id, ids.clone())).collect(),
            channels: BTreeMap::new(),
            last_sent: BTreeMap::new(),
            outcome: Outcome {
                clocks_monotonic: true,
                sends_increasing: true,
                ..Outcome::default()
            },
        }
    }

    fn node(&mut self, id: NodeId) -> &mut MutexCoordinator {
        &mut self.nodes[id as usize]
    }

    fn send(&mut self, from: NodeId, to: NodeId, message: MutexMessage) {
        self.channels.entry((from, to)).or_default().push_back(message);
    }

    fn stamp(&mut self, from: NodeId, message: MutexMessage) {
        let ts = message.timestamp();
        if let Some(&last) = self.last_sent.get(&from)
            && ts <= last
        {
            self.outcome.sends_increasing = false;
        }
        self.last_sent.insert(from, ts);
    }

    fn apply(&mut self, from: NodeId, actions: Vec<MutexAction>) {
        for action in actions {
            match action {
                MutexAction::Send { to, message } => {
                    self.stamp(from, message);
                    self.send(from, to, message);
                },
                MutexAction::Broadcast(message) => {
                    self.stamp(from, message);
                    let peers: Vec<NodeId> = self.node(from).peers().iter().copied().collect();
                    for to in peers {
                        self.send(from, to, message);
                    }
                },
                MutexAction::Enter { timestamp } => {
                    self.outcome.entries.push(RequestEntry::new(timestamp, from));
                },
                MutexAction::Exit { .. } => {
                    *self.outcome.completed.entry(from).or_default() += 1;
                },
            }
        }
        let in_cs = self.nodes.iter().filter(|n| n.state() == MutexState::InCs).count();
        self.outcome.max_concurrent = self.outcome.max_concurrent.max(in_cs);
    }

    fn pending_channels(&self) -> Vec<(NodeId, NodeId)> {
        self.channels.iter().filter(|(_, q)| !q.is_empty()).map(|(k, _)| *k).collect()
    }

    /// Run until every node finished `rounds` critical sections or nothing
    /// can make progress.
    fn run(mut self, rounds: u32, seed: u64) -> Outcome {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let size = self.nodes.len() as u32;
        let mut requested: BTreeMap<NodeId, u32> = BTreeMap::new();

        for _ in 0..1_000_000 {
            let pending = self.pending_channels();
            let runnable: Vec<NodeId> = (0..size)
                .filter(|&id| match self.nodes[id as usize].state() {
                    MutexState::Idle => requested.get(&id).copied().unwrap_or(0) < rounds,
                    MutexState::InCs => true,
                    MutexState::Waiting => false,
                })
                .collect();

            if pending.is_empty() && runnable.is_empty() {
                break;
            }

            let deliver = !pending.is_empty() && (runnable.is_empty() || rng.gen_bool(0.7));
            if deliver {
                let (from, to) = pending[rng.gen_range(0..pending.len())];
                let Some(message) = self.channels.get_mut(&(from, to)).and_then(VecDeque::pop_front)
                else {
                    continue;
                };
                let before = self.node(to).clock();
                let actions = self.node(to).handle_message(from, message).expect("known peer");
                if self.node(to).clock() < before {
                    self.outcome.clocks_monotonic = false;
                }
                self.apply(to, actions);
            } else {
                let id = runnable[rng.gen_range(0..runnable.len())];
                let actions = match self.node(id).state() {
                    MutexState::Idle => {
                        *requested.entry(id).or_default() += 1;
                        self.node(id).request_cs().expect("idle")
                    },
                    _ => self.node(id).release_cs().expect("in cs"),
                };
                self.apply(id, actions);
            }
        }

        self.outcome
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: at most one node is ever in the critical section
    #[test]
    fn prop_mutual_exclusion(seed in any::<u64>(), size in 1u32..6, rounds in 1u32..4) {
        let outcome = Network::new(size).run(rounds, seed);
        prop_assert!(outcome.max_concurrent <= 1);
    }

    /// Property: every request is eventually granted and released
    #[test]
    fn prop_every_request_granted(seed in any::<u64>(), size in 1u32..6, rounds in 1u32..4) {
        let outcome = Network::new(size).run(rounds, seed);
        for id in 0..size {
            prop_assert_eq!(outcome.completed.get(&id).copied().unwrap_or(0), rounds);
        }
    }

    /// Property: grants follow (timestamp, node id) order
    #[test]
    fn prop_grants_in_timestamp_order(seed in any::<u64>(), size in 2u32..6, rounds in 1u32..4) {
        let outcome = Network::new(size).run(rounds, seed);
        for pair in outcome.entries.windows(2) {
            prop_assert!(pair[0] < pair[1], "{:?} granted before {:?}", pair[0], pair[1]);
        }
    }

    /// Property: clocks never decrease and sends are strictly increasing
    #[test]
    fn prop_clock_monotonic(seed in any::<u64>(), size in 2u32..6, rounds in 1u32..4) {
        let outcome = Network::new(size).run(rounds, seed);
        prop_assert!(outcome.clocks_monotonic);
        prop_assert!(outcome.sends_increasing);
    }

    /// Property: inserting an entry twice leaves the queue unchanged
    #[test]
    fn prop_queue_insert_idempotent(
        entries in prop::collection::vec((0u64..50, 0u32..8), 1..20),
        dup in any::<prop::sample::Index>(),
    ) {
        let mut queue = RequestQueue::new();
        for &(ts, id) in &entries {
            queue.insert(RequestEntry::new(ts, id));
        }
        let snapshot = queue.clone();

        let (ts, id) = entries[dup.index(entries.len())];
        prop_assert!(!queue.insert(RequestEntry::new(ts, id)));
        prop_assert_eq!(&queue, &snapshot);
        prop_assert_eq!(queue.head(), snapshot.head());
    }

    /// Property: a peer timestamp of any size is merged or rejected without
    /// overflowing the receiver's clock
    #[test]
    fn prop_peer_timestamp_merged_or_rejected(
        timestamp in prop_oneof![any::<u64>(), (u64::MAX - 3)..=u64::MAX],
        kind in 0u8..3,
        waiting in any::<bool>(),
    ) {
        let mut node = MutexCoordinator::new(0, [0, 1, 2]);
        if waiting {
            node.request_cs().expect("idle");
        }
        let before = node.clock();
        let queued = node.queue().len();

        let message = match kind {
            0 => MutexMessage::Request { timestamp },
            1 => MutexMessage::Ack { timestamp },
            _ => MutexMessage::Release { timestamp },
        };

        match node.handle_message(1, message) {
            Ok(_) => {
                let merged = before.max(timestamp) + 1;
                let replies = u64::from(matches!(message, MutexMessage::Request { .. }));
                prop_assert_eq!(node.clock(), merged + replies);
            },
            Err(err) => {
                prop_assert!(!err.is_fatal(), "{err}");
                prop_assert!(timestamp >= u64::MAX - 1);
                prop_assert_eq!(node.clock(), before);
                prop_assert_eq!(node.queue().len(), queued);
            },
        }
    }
}
