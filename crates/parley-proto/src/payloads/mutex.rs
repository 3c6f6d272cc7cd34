//! Lamport mutual exclusion messages.
//!
//! All three messages carry only the sender's Lamport timestamp. The sender id
//! lives in the frame header.

use serde::{Deserialize, Serialize};

use crate::{Opcode, Timestamp};

/// Message exchanged by the mutual exclusion protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutexMessage {
    /// Ask every peer for permission to enter the critical section
    Request {
        /// Timestamp of the request; also its queue priority
        timestamp: Timestamp,
    },
    /// Confirm receipt of a REQUEST
    Ack {
        /// Sender's clock after observing the REQUEST
        timestamp: Timestamp,
    },
    /// Announce that the sender left the critical section
    Release {
        /// Sender's clock at release time
        timestamp: Timestamp,
    },
}

impl MutexMessage {
    /// Lamport timestamp carried by the message.
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        match self {
            Self::Request { timestamp } | Self::Ack { timestamp } | Self::Release { timestamp } => {
                *timestamp
            },
        }
    }

    /// Opcode identifying this message on the wire.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Request { .. } => Opcode::Request,
            Self::Ack { .. } => Opcode::Ack,
            Self::Release { .. } => Opcode::Release,
        }
    }

    /// Rebuild a message from its opcode and wire body.
    ///
    /// `None` if `opcode` is not a mutual exclusion opcode.
    pub(crate) const fn from_stamp(opcode: Opcode, stamp: Stamp) -> Option<Self> {
        let timestamp = stamp.timestamp;
        match opcode {
            Opcode::Request => Some(Self::Request { timestamp }),
            Opcode::Ack => Some(Self::Ack { timestamp }),
            Opcode::Release => Some(Self::Release { timestamp }),
            Opcode::Order | Opcode::Relay => None,
        }
    }

    pub(crate) const fn stamp(&self) -> Stamp {
        Stamp { timestamp: self.timestamp() }
    }
}

/// CBOR body shared by all mutual exclusion messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Stamp {
    pub timestamp: Timestamp,
}
