//! Sans-IO protocol logic for Parley.
//!
//! Two protocol families live here as pure state machines:
//!
//! - Lamport mutual exclusion: [`LogicalClock`], [`RequestQueue`] and the
//!   per-node [`MutexCoordinator`].
//! - Byzantine agreement via Oral Messages OM(f): [`Commander`],
//!   [`Lieutenant`], the [`ValueTree`] each Lieutenant decides from, and the
//!   pluggable [`RelayPolicy`] that simulates faulty nodes.
//!
//! # Action pattern
//!
//! Nothing in this crate performs I/O. Every operation takes its input as
//! arguments and returns a list of actions (send this message, enter the
//! critical section, decide this value) for a driver to execute. Production
//! drivers live in `parley-node`; the deterministic simulation drivers live in
//! `parley-harness`. Both supply time and randomness through [`Environment`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agreement;
pub mod clock;
pub mod env;
pub mod error;
pub mod mutex;
pub mod queue;

pub use agreement::{
    AgreementAction, Behavior, Commander, Lieutenant, RelayPolicy, ValueTree, majority,
};
pub use clock::LogicalClock;
pub use env::Environment;
pub use error::{AgreementError, MutexError};
pub use mutex::{MutexAction, MutexCoordinator, MutexState};
pub use queue::{RequestEntry, RequestQueue};
