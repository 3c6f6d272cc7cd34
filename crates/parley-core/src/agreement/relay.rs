//! Relay policies: how a node chooses the value it forwards.
//!
//! Loyal and faulty nodes run the same receive/record/decide logic. The only
//! difference is the value they send onward, which a [`RelayPolicy`] picks
//! per target.

use parley_proto::{NodeId, Order, Path};
use serde::{Deserialize, Serialize};

/// Chooses the value a node forwards to one target.
///
/// `path` is the path the target will store the value under, so it already
/// ends with the relaying node.
pub trait RelayPolicy: std::fmt::Debug + Send + Sync {
    /// Value to send to `target` after receiving `received`.
    fn relay(&self, received: Order, target: NodeId, path: &Path) -> Order;

    /// Whether this policy always forwards what it received.
    fn is_loyal(&self) -> bool {
        false
    }
}

/// Forwards the received value unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Honest;

impl RelayPolicy for Honest {
    fn relay(&self, received: Order, _target: NodeId, _path: &Path) -> Order {
        received
    }

    fn is_loyal(&self) -> bool {
        true
    }
}

/// Always forwards the opposite of the received value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inverting;

impl RelayPolicy for Inverting {
    fn relay(&self, received: Order, _target: NodeId, _path: &Path) -> Order {
        received.opposite()
    }
}

/// Tells even-numbered targets the opposite of what it tells odd ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitBrain;

impl RelayPolicy for SplitBrain {
    fn relay(&self, received: Order, target: NodeId, _path: &Path) -> Order {
        if target % 2 == 0 {
            received.opposite()
        } else {
            received
        }
    }
}

/// Forwards the same value whatever it received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixed(pub Order);

impl RelayPolicy for Fixed {
    fn relay(&self, _received: Order, _target: NodeId, _path: &Path) -> Order {
        self.0
    }
}

/// Configurable choice of relay policy.
///
/// Serialized in kebab case: `"loyal"`, `"inverting"`, `"split-brain"`, or
/// `{"fixed": "ATTACK"}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Behavior {
    /// [`Honest`]
    #[default]
    Loyal,
    /// [`Inverting`]
    Inverting,
    /// [`SplitBrain`]
    SplitBrain,
    /// [`Fixed`]
    Fixed(Order),
}

impl RelayPolicy for Behavior {
    fn relay(&self, received: Order, target: NodeId, path: &Path) -> Order {
        match self {
            Self::Loyal => Honest.relay(received, target, path),
            Self::Inverting => Inverting.relay(received, target, path),
            Self::SplitBrain => SplitBrain.relay(received, target, path),
            Self::Fixed(order) => Fixed(*order).relay(received, target, path),
        }
    }

    fn is_loyal(&self) -> bool {
        matches!(self, Self::Loyal)
    }
}

impl std::fmt::Display for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loyal => f.write_str("loyal"),
            Self::Inverting => f.write_str("inverting"),
            Self::SplitBrain => f.write_str("split-brain"),
            Self::Fixed(order) => write!(f, "fixed({order})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_brain_depends_on_target_parity() {
        let path = Path::root(0).extend(3);
        assert_eq!(SplitBrain.relay(Order::Attack, 1, &path), Order::Attack);
        assert_eq!(SplitBrain.relay(Order::Attack, 2, &path), Order::Retreat);
    }

    #[test]
    fn behavior_dispatches_to_policy() {
        let path = Path::root(0);
        assert_eq!(Behavior::Loyal.relay(Order::Attack, 2, &path), Order::Attack);
        assert_eq!(Behavior::Inverting.relay(Order::Attack, 1, &path), Order::Retreat);
        assert_eq!(Behavior::Fixed(Order::Retreat).relay(Order::Attack, 1, &path), Order::Retreat);
        assert!(Behavior::Loyal.is_loyal());
        assert!(!Behavior::SplitBrain.is_loyal());
    }

    #[test]
    fn behavior_json_names() {
        let cases = [
            (Behavior::Loyal, r#""loyal""#),
            (Behavior::Inverting, r#""inverting""#),
            (Behavior::SplitBrain, r#""split-brain""#),
            (Behavior::Fixed(Order::Attack), r#"{"fixed":"ATTACK"}"#),
        ];
        for (behavior, json) in cases {
            assert_eq!(serde_json::to_string(&behavior).expect("serialize"), json);
            assert_eq!(serde_json::from_str::<Behavior>(json).expect("parse"), behavior);
        }
        assert!(serde_json::from_str::<Behavior>(r#""traitor""#).is_err());
    }
}
