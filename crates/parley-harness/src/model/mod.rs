//! Reference models for model-based testing.
//!
//! The message-driven implementation and the model are run on the same
//! inputs; their observable results must match.

mod om;

pub use om::ModelCluster;
