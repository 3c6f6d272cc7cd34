//! Node runtime error types.

use std::fmt;

use parley_core::{AgreementError, MutexError};
use parley_proto::ProtocolError;

use crate::{config::ConfigError, transport::TransportError};

/// Errors that stop or fail a node operation.
#[derive(Debug)]
pub enum NodeError {
    /// Cluster configuration is unusable.
    ///
    /// Fatal at startup.
    Config(ConfigError),

    /// A message could not be delivered.
    ///
    /// Not retried by the protocol. The node keeps running; whether the
    /// operation can complete depends on the peer coming back.
    Transport(TransportError),

    /// Mutual exclusion state machine rejected an operation.
    ///
    /// Fatal if the inner error is an invariant violation.
    Mutex(MutexError),

    /// Agreement state machine rejected an operation.
    Agreement(AgreementError),

    /// Frame encoding or decoding failed.
    Protocol(ProtocolError),

    /// Socket or file I/O failed.
    Io(std::io::Error),
}

impl NodeError {
    /// Returns true if the node must stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) | Self::Io(_) => true,
            Self::Mutex(err) => err.is_fatal(),
            Self::Agreement(err) => err.is_fatal(),
            Self::Transport(_) | Self::Protocol(_) => false,
        }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::Mutex(err) => write!(f, "mutex error: {err}"),
            Self::Agreement(err) => write!(f, "agreement error: {err}"),
            Self::Protocol(err) => write!(f, "protocol error: {err}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Transport(err) => Some(err),
            Self::Mutex(err) => Some(err),
            Self::Agreement(err) => Some(err),
            Self::Protocol(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<ConfigError> for NodeError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<TransportError> for NodeError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<MutexError> for NodeError {
    fn from(err: MutexError) -> Self {
        Self::Mutex(err)
    }
}

impl From<AgreementError> for NodeError {
    fn from(err: AgreementError) -> Self {
        Self::Agreement(err)
    }
}

impl From<ProtocolError> for NodeError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use parley_core::MutexState;

    use super::*;

    #[test]
    fn fatality_follows_inner_error() {
        let violation = NodeError::from(MutexError::InvariantViolation {
            state: MutexState::Idle,
            operation: "release_cs",
        });
        assert!(violation.is_fatal());

        let unreachable = NodeError::from(TransportError::MissingPeer(4));
        assert!(!unreachable.is_fatal());
        assert_eq!(unreachable.to_string(), "transport error: unknown peer: node 4");
    }
}
