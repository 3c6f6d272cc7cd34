//! Error types for the Parley protocol core.
//!
//! Each protocol has its own error enum. Malformed input from a peer is
//! reported to the driver, which logs and discards it; only local invariant
//! violations are fatal.

use parley_proto::NodeId;
use thiserror::Error;

use crate::mutex::MutexState;

/// Errors raised by the mutual exclusion state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutexError {
    /// Operation attempted from the wrong state
    #[error("invariant violation: cannot {operation} from {state:?}")]
    InvariantViolation {
        /// State when the operation was attempted
        state: MutexState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Inbound message that cannot be processed
    #[error("malformed message from node {from}: {reason}")]
    MalformedMessage {
        /// Sender named in the frame header
        from: NodeId,
        /// What was wrong with it
        reason: String,
    },

    /// The logical clock cannot advance past `Timestamp::MAX`
    #[error("logical clock exhausted at {clock}")]
    ClockExhausted {
        /// Clock value when the tick was refused
        clock: parley_proto::Timestamp,
    },
}

impl MutexError {
    /// Returns true if the node must stop.
    ///
    /// Malformed input is the peer's fault and is discarded. An invariant
    /// violation means the local driver misused the state machine, and an
    /// exhausted clock cannot order further requests.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. } | Self::ClockExhausted { .. })
    }
}

/// Errors raised by the agreement state machines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgreementError {
    /// Cluster shape cannot tolerate the configured fault bound
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Inbound message that fails path or depth validation
    #[error("malformed message from node {from}: {reason}")]
    MalformedMessage {
        /// Sender named in the frame header
        from: NodeId,
        /// What was wrong with it
        reason: String,
    },
}

impl AgreementError {
    /// Returns true if the node must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }

    pub(crate) fn malformed(from: NodeId, reason: impl Into<String>) -> Self {
        Self::MalformedMessage { from, reason: reason.into() }
    }
}
