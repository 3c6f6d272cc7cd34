//! Deterministic simulation harness for Parley.
//!
//! Turmoil-based implementations of the Environment and Transport seams, so
//! the production node actors run unchanged on a simulated network with a
//! seeded clock and RNG.
//!
//! # Cluster Runs
//!
//! [`MutexSimulation`] and [`AgreementSimulation`] start one turmoil host per
//! node and reduce the run to a [`SystemSnapshot`].
//!
//! # Model-Based Testing
//!
//! The `model` module provides a direct recursive OM(m) reference. Message
//! driven executions are compared against it on the same cluster.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks WHAT must be true across all schedules:
//! mutual exclusion, grant ordering, clock monotonicity, and the agreement
//! conditions. [`InvariantRegistry::mutex()`] and
//! [`InvariantRegistry::agreement()`] group them by protocol.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod invariants;
pub mod model;
pub mod sim_env;
pub mod sim_transport;

pub use cluster::{AgreementSimulation, MutexSimulation, faulty_ids, split_brain_cluster};
pub use invariants::{
    AgreementConsistency, AgreementSnapshot, AgreementTermination, AgreementValidity,
    ClockMonotonicity, Invariant, InvariantRegistry, InvariantResult, MutualExclusion, Protocol,
    RequestOrdering, SystemSnapshot, Violation,
};
pub use model::ModelCluster;
pub use sim_env::SimEnv;
pub use sim_transport::{SimTransport, TurmoilConnector, sim_transport};
