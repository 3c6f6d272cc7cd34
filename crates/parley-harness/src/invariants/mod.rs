//! Safety checks over finished Parley runs.
//!
//! A simulated run is reduced to a [`SystemSnapshot`]: the critical section
//! transitions of a mutex workload in global order, or the decisions of one
//! OM(f) execution. Each [`Invariant`] belongs to one [`Protocol`] and judges
//! the whole snapshot at once, so a check never races a live node.
//!
//! ```ignore
//! let snapshot = MutexSimulation::new(4, 2).run()?;
//! InvariantRegistry::mutex().assert_holds(&snapshot, "4 nodes, 2 rounds");
//! ```

mod checks;
mod snapshot;

pub use checks::{
    AgreementConsistency, AgreementTermination, AgreementValidity, ClockMonotonicity,
    MutualExclusion, RequestOrdering,
};
pub use snapshot::{AgreementSnapshot, SystemSnapshot};

/// Outcome of checking one invariant.
pub type InvariantResult = Result<(), Violation>;

/// Protocol whose runs an invariant constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Lamport mutual exclusion
    Mutex,
    /// OM(f) Byzantine agreement
    Agreement,
}

impl Protocol {
    /// Whether `snapshot` recorded a run of this protocol.
    pub fn observed_in(self, snapshot: &SystemSnapshot) -> bool {
        match self {
            Self::Mutex => !snapshot.cs_events.is_empty(),
            Self::Agreement => snapshot.agreement.is_some(),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mutex => f.write_str("mutex"),
            Self::Agreement => f.write_str("agreement"),
        }
    }
}

/// A broken safety property, named and explained.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Which events or nodes broke it.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// Safety property of one protocol, judged on a finished run.
pub trait Invariant: Send + Sync {
    /// Snake-case name used in violation reports.
    fn name(&self) -> &'static str;

    /// Protocol this property belongs to.
    fn protocol(&self) -> Protocol;

    /// Judge `state`. A snapshot without this protocol's run passes.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Set of invariants applied to every snapshot of a test.
#[derive(Default)]
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Registry with no checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lamport checks: [`MutualExclusion`], [`RequestOrdering`] and
    /// [`ClockMonotonicity`].
    pub fn mutex() -> Self {
        let mut registry = Self::new();
        registry.add(MutualExclusion);
        registry.add(RequestOrdering);
        registry.add(ClockMonotonicity);
        registry
    }

    /// OM(f) checks: [`AgreementTermination`], [`AgreementConsistency`] and
    /// [`AgreementValidity`].
    pub fn agreement() -> Self {
        let mut registry = Self::new();
        registry.add(AgreementTermination);
        registry.add(AgreementConsistency);
        registry.add(AgreementValidity);
        registry
    }

    /// Checks of both protocols.
    pub fn standard() -> Self {
        let mut registry = Self::mutex();
        registry.invariants.extend(Self::agreement().invariants);
        registry
    }

    /// Register one more check.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Protocols covered by at least one registered check.
    pub fn protocols(&self) -> Vec<Protocol> {
        let mut protocols: Vec<Protocol> = Vec::new();
        for protocol in self.invariants.iter().map(|inv| inv.protocol()) {
            if !protocols.contains(&protocol) {
                protocols.push(protocol);
            }
        }
        protocols
    }

    /// Run every check and collect each violation.
    pub fn verify(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Panic with every violation, prefixed by `context`.
    ///
    /// Also panics if the snapshot recorded no run of any protocol this
    /// registry covers, since every check would then pass vacuously.
    #[allow(clippy::panic)]
    pub fn assert_holds(&self, state: &SystemSnapshot, context: &str) {
        let protocols = self.protocols();
        if !protocols.is_empty() && !protocols.iter().any(|p| p.observed_in(state)) {
            panic!("{context}: snapshot has no run for {protocols:?}");
        }
        if let Err(violations) = self.verify(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("{context}: safety violated\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// True if no check is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use parley_node::{CsEvent, CsEventKind};
    use parley_proto::Order;

    use super::*;

    #[test]
    fn registries_split_by_protocol() {
        assert_eq!(InvariantRegistry::mutex().protocols(), vec![Protocol::Mutex]);
        assert_eq!(InvariantRegistry::agreement().protocols(), vec![Protocol::Agreement]);
        assert_eq!(
            InvariantRegistry::standard().protocols(),
            vec![Protocol::Mutex, Protocol::Agreement]
        );
        assert_eq!(InvariantRegistry::standard().len(), 6);
        assert!(InvariantRegistry::new().is_empty());
    }

    #[test]
    fn empty_snapshot_passes_every_check() {
        assert!(InvariantRegistry::standard().verify(&SystemSnapshot::empty()).is_ok());
    }

    #[test]
    #[should_panic(expected = "snapshot has no run")]
    fn agreement_checks_refuse_mutex_snapshot() {
        let snapshot = SystemSnapshot::from_events(vec![
            CsEvent { node: 0, kind: CsEventKind::Enter, timestamp: 1, clock: 1 },
            CsEvent { node: 0, kind: CsEventKind::Exit, timestamp: 1, clock: 2 },
        ]);
        InvariantRegistry::mutex().assert_holds(&snapshot, "one round");
        InvariantRegistry::agreement().assert_holds(&snapshot, "one round");
    }

    #[test]
    fn violations_are_collected_from_each_check() {
        let snapshot = SystemSnapshot::from_agreement(AgreementSnapshot {
            commander: 0,
            order: Order::Attack,
            faulty: [].into(),
            lieutenants: [1, 2, 3].into(),
            decisions: BTreeMap::from([(1, Order::Attack), (2, Order::Retreat)]),
        });

        let violations = InvariantRegistry::agreement().verify(&snapshot).expect_err("violated");
        let names: Vec<_> = violations.iter().map(|v| v.invariant).collect();
        assert_eq!(
            names,
            vec!["agreement_termination", "agreement_consistency", "agreement_validity"]
        );
    }
}
