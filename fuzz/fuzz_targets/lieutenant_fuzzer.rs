//! Fuzz target for the OM(f) Lieutenant
//!
//! Feeds one Lieutenant of a seven-node, f=2 cluster arbitrary ORDER and
//! RELAY messages, valid or not, from arbitrary senders.
//!
//! # Invariants
//!
//! - Malformed messages are rejected and leave the tree unchanged
//! - Relays are only sent to Lieutenants not already on the path
//! - A decision, once made, never changes
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::{AgreementAction, Lieutenant, agreement::Honest};
use parley_proto::{AgreementMessage, NodeId, Order, OrderMessage, Path, RelayMessage};

const OWNER: NodeId = 1;
const COMMANDER: NodeId = 0;

#[derive(Debug, Clone, Arbitrary)]
enum Input {
    Order { from: u8, attack: bool, depth: u8 },
    Relay { attack: bool, path: Vec<u8>, depth: u8 },
    DecideNow,
}

fuzz_target!(|inputs: Vec<Input>| {
    let mut lt = Lieutenant::new(OWNER, COMMANDER, 0..7, 2, Honest).expect("valid cluster");
    let mut decided: Option<Order> = None;

    for input in inputs {
        let value = |attack: bool| if attack { Order::Attack } else { Order::Retreat };
        let (from, message) = match input {
            Input::Order { from, attack, depth } => (
                NodeId::from(from % 8),
                AgreementMessage::Order(OrderMessage {
                    value: value(attack),
                    depth: u32::from(depth % 4),
                }),
            ),
            Input::Relay { attack, path, depth } => {
                let ids: Vec<NodeId> =
                    path.iter().take(5).map(|&id| NodeId::from(id % 8)).collect();
                let Some(&from) = ids.last() else {
                    continue;
                };
                (
                    from,
                    AgreementMessage::Relay(RelayMessage {
                        value: value(attack),
                        path: Path::from_ids(ids),
                        depth: u32::from(depth % 4),
                    }),
                )
            },
            Input::DecideNow => {
                let value = lt.decide_now();
                assert!(decided.is_none_or(|d| d == value), "decision changed");
                decided = Some(value);
                continue;
            },
        };

        let before = lt.tree().len();
        let message_path = match &message {
            AgreementMessage::Order(_) => Path::root(COMMANDER),
            AgreementMessage::Relay(relay) => relay.path.clone(),
        };

        match lt.handle_message(from, message) {
            Ok(actions) => {
                for action in actions {
                    match action {
                        AgreementAction::Send { to, message } => {
                            assert!(to != OWNER && to != COMMANDER);
                            assert!(!message_path.contains(to), "relay back along the path");
                            assert!(matches!(message, AgreementMessage::Relay(_)));
                        },
                        AgreementAction::Decided { value } => {
                            assert!(decided.is_none_or(|d| d == value), "decision changed");
                            decided = Some(value);
                        },
                    }
                }
            },
            Err(_) => assert_eq!(lt.tree().len(), before, "rejected message changed the tree"),
        }

        if let Some(value) = decided {
            assert_eq!(lt.decision(), Some(value));
        }
    }
});
