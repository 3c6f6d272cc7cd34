//! Standard invariant checks.
//!
//! These capture the safety properties of both protocols. They verify WHAT
//! must be true of a run, not how any particular schedule unfolded.

use std::collections::BTreeMap;

use parley_node::CsEventKind;
use parley_proto::NodeId;

use super::{Invariant, InvariantResult, Protocol, SystemSnapshot, Violation};

/// At most one node is in the critical section at any time.
///
/// Walking the events in order, an entry while another node is inside, or an
/// exit by a node that is not inside, is a violation.
pub struct MutualExclusion;

impl Invariant for MutualExclusion {
    fn name(&self) -> &'static str {
        "mutual_exclusion"
    }

    fn protocol(&self) -> Protocol {
        Protocol::Mutex
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut holder: Option<NodeId> = None;
        for (index, event) in state.cs_events.iter().enumerate() {
            match (event.kind, holder) {
                (CsEventKind::Enter, None) => holder = Some(event.node),
                (CsEventKind::Exit, Some(inside)) if inside == event.node => holder = None,
                (CsEventKind::Enter, Some(inside)) => {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "event {index}: node {} entered while node {inside} was inside",
                            event.node
                        ),
                    });
                },
                (CsEventKind::Exit, _) => {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "event {index}: node {} left without holding the section",
                            event.node
                        ),
                    });
                },
            }
        }
        Ok(())
    }
}

/// Entries are granted in strictly increasing `(timestamp, node id)` order.
pub struct RequestOrdering;

impl Invariant for RequestOrdering {
    fn name(&self) -> &'static str {
        "request_ordering"
    }

    fn protocol(&self) -> Protocol {
        Protocol::Mutex
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let grants: Vec<(u64, NodeId)> = state
            .cs_events
            .iter()
            .filter(|e| e.kind == CsEventKind::Enter)
            .map(|e| (e.timestamp, e.node))
            .collect();

        for window in grants.windows(2) {
            if window[1] <= window[0] {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{:?} granted after {:?}", window[1], window[0]),
                });
            }
        }
        Ok(())
    }
}

/// A node's logical clock never decreases.
pub struct ClockMonotonicity;

impl Invariant for ClockMonotonicity {
    fn name(&self) -> &'static str {
        "clock_monotonicity"
    }

    fn protocol(&self) -> Protocol {
        Protocol::Mutex
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (node, history) in state.clock_history() {
            for window in history.windows(2) {
                if window[1] < window[0] {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "node {node}: clock went from {} to {}",
                            window[0], window[1]
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every Lieutenant decided.
pub struct AgreementTermination;

impl Invariant for AgreementTermination {
    fn name(&self) -> &'static str {
        "agreement_termination"
    }

    fn protocol(&self) -> Protocol {
        Protocol::Agreement
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let Some(agreement) = &state.agreement else {
            return Ok(());
        };
        let missing: Vec<NodeId> = agreement
            .lieutenants
            .iter()
            .copied()
            .filter(|id| !agreement.decisions.contains_key(id))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!("lieutenants {missing:?} never decided"),
            })
        }
    }
}

/// All loyal Lieutenants decide the same value.
pub struct AgreementConsistency;

impl Invariant for AgreementConsistency {
    fn name(&self) -> &'static str {
        "agreement_consistency"
    }

    fn protocol(&self) -> Protocol {
        Protocol::Agreement
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let Some(agreement) = &state.agreement else {
            return Ok(());
        };

        let loyal: BTreeMap<NodeId, _> = agreement.loyal_decisions().collect();
        let mut values = loyal.values();
        if let Some(first) = values.next()
            && values.any(|v| v != first)
        {
            return Err(Violation {
                invariant: self.name(),
                message: format!("loyal lieutenants disagree: {loyal:?}"),
            });
        }
        Ok(())
    }
}

/// With a loyal Commander, every loyal Lieutenant decides its order.
pub struct AgreementValidity;

impl Invariant for AgreementValidity {
    fn name(&self) -> &'static str {
        "agreement_validity"
    }

    fn protocol(&self) -> Protocol {
        Protocol::Agreement
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let Some(agreement) = &state.agreement else {
            return Ok(());
        };
        if !agreement.commander_loyal() {
            return Ok(());
        }

        for (id, value) in agreement.loyal_decisions() {
            if value != agreement.order {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "lieutenant {id} decided {value}, loyal commander ordered {}",
                        agreement.order
                    ),
                });
            }
        }
        Ok(())
    }
}
