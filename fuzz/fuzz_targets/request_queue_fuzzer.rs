//! Fuzz target for the Lamport coordinator and its request queue
//!
//! Drives a small cluster of coordinators through arbitrary interleavings of
//! requests, releases and deliveries, plus forged messages from strangers and
//! from real peers carrying arbitrary timestamps.
//!
//! # Invariants
//!
//! - At most one node is in the critical section while no peer has lied
//! - The queue head is the smallest (timestamp, node id) entry
//! - Clocks never decrease
//! - NEVER panic; misuse returns an error

#![no_main]

use std::collections::{BTreeMap, VecDeque};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::{MutexAction, MutexCoordinator, MutexState};
use parley_proto::{MutexMessage, NodeId};

const NODES: u32 = 3;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Request { node: u8 },
    Release { node: u8 },
    Deliver { from: u8, to: u8 },
    Forged { to: u8, kind: u8, timestamp: u64 },
    PeerMessage { from: u8, to: u8, kind: u8, timestamp: u64 },
}

fn message(kind: u8, timestamp: u64) -> MutexMessage {
    match kind % 3 {
        0 => MutexMessage::Request { timestamp },
        1 => MutexMessage::Ack { timestamp },
        _ => MutexMessage::Release { timestamp },
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let ids: Vec<NodeId> = (0..NODES).collect();
    let mut nodes: Vec<MutexCoordinator> =
        ids.iter().map(|&id| MutexCoordinator::new(id, ids.clone())).collect();
    let mut channels: BTreeMap<(NodeId, NodeId), VecDeque<MutexMessage>> = BTreeMap::new();
    let mut honest = true;

    for op in ops {
        let clocks: Vec<_> = nodes.iter().map(MutexCoordinator::clock).collect();
        let (node, result) = match op {
            Op::Request { node } => {
                let id = u32::from(node) % NODES;
                (id, nodes[id as usize].request_cs())
            },
            Op::Release { node } => {
                let id = u32::from(node) % NODES;
                (id, nodes[id as usize].release_cs())
            },
            Op::Deliver { from, to } => {
                let (from, to) = (u32::from(from) % NODES, u32::from(to) % NODES);
                let Some(message) = channels.get_mut(&(from, to)).and_then(VecDeque::pop_front)
                else {
                    continue;
                };
                (to, nodes[to as usize].handle_message(from, message))
            },
            Op::Forged { to, kind, timestamp } => {
                let to = u32::from(to) % NODES;
                let result = nodes[to as usize].handle_message(NODES + 7, message(kind, timestamp));
                assert!(result.is_err(), "stranger accepted");
                continue;
            },
            Op::PeerMessage { from, to, kind, timestamp } => {
                let (from, to) = (u32::from(from) % NODES, u32::from(to) % NODES);
                if from == to {
                    continue;
                }
                let result = nodes[to as usize].handle_message(from, message(kind, timestamp));
                match &result {
                    Ok(_) => honest = false,
                    Err(err) => {
                        assert!(!err.is_fatal(), "peer input was fatal: {err}");
                        assert_eq!(nodes[to as usize].clock(), clocks[to as usize]);
                    },
                }
                (to, result)
            },
        };

        let Ok(actions) = result else {
            continue;
        };
        for (n, before) in nodes.iter().zip(&clocks) {
            assert!(n.clock() >= *before, "clock of node {} went backwards", n.id());
        }

        for action in actions {
            match action {
                MutexAction::Send { to, message } => {
                    channels.entry((node, to)).or_default().push_back(message);
                },
                MutexAction::Broadcast(message) => {
                    for &to in nodes[node as usize].peers() {
                        channels.entry((node, to)).or_default().push_back(message);
                    }
                },
                MutexAction::Enter { .. } | MutexAction::Exit { .. } => {},
            }
        }

        let in_cs = nodes.iter().filter(|n| n.state() == MutexState::InCs).count();
        assert!(!honest || in_cs <= 1, "{in_cs} nodes in the critical section");

        for n in &nodes {
            let smallest = n.queue().iter().min();
            assert_eq!(n.queue().head(), smallest);
        }
    }
});
