//! Byzantine agreement via Oral Messages, OM(f).
//!
//! A [`Commander`] sends an order to every Lieutenant. Each [`Lieutenant`]
//! records what it receives in a [`ValueTree`], relays it onward while relay
//! rounds remain, and decides by recursive majority once the tree is complete.
//! Up to `f` nodes, the Commander included, may be faulty as long as the
//! cluster has at least `3f + 1` nodes.
//!
//! Faulty behaviour is a [`RelayPolicy`]: it only changes the values a node
//! sends, never how it records or decides.

mod commander;
mod lieutenant;
mod majority;
mod relay;
mod tree;

pub use commander::Commander;
pub use lieutenant::Lieutenant;
pub use majority::{DEFAULT_ORDER, majority};
use parley_proto::{AgreementMessage, NodeId, Order};
pub use relay::{Behavior, Fixed, Honest, Inverting, RelayPolicy, SplitBrain};
pub use tree::ValueTree;

use crate::error::AgreementError;

/// Actions returned by the agreement state machines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgreementAction {
    /// Send `message` to one node
    Send {
        /// Destination node
        to: NodeId,
        /// Message to send
        message: AgreementMessage,
    },

    /// The Lieutenant reached its decision
    Decided {
        /// Decided value
        value: Order,
    },
}

/// Check that `nodes` can tolerate `fault_bound` faulty nodes.
///
/// OM(f) needs `nodes >= 3f + 1`, and at least one Lieutenant.
///
/// # Errors
///
/// - `AgreementError::InvalidConfig` if either condition fails
pub fn check_fault_bound(nodes: usize, fault_bound: u32) -> Result<(), AgreementError> {
    let required = 3 * fault_bound as usize + 1;
    if nodes < required {
        return Err(AgreementError::InvalidConfig(format!(
            "{nodes} nodes cannot tolerate {fault_bound} faults, need at least {required}"
        )));
    }
    if nodes < 2 {
        return Err(AgreementError::InvalidConfig(
            "agreement needs a commander and at least one lieutenant".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_bound_requires_three_f_plus_one() {
        assert!(check_fault_bound(4, 1).is_ok());
        assert!(check_fault_bound(3, 1).is_err());
        assert!(check_fault_bound(7, 2).is_ok());
        assert!(check_fault_bound(6, 2).is_err());
        assert!(check_fault_bound(1, 0).is_err());
    }
}
