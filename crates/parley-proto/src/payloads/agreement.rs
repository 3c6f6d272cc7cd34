//! Byzantine agreement messages.

use serde::{Deserialize, Serialize};

use crate::{Opcode, Order, Path};

/// Initial order sent by the Commander to each Lieutenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMessage {
    /// Value the Commander claims to order
    pub value: Order,
    /// Remaining relay rounds; equals the fault bound
    pub depth: u32,
}

/// Value relayed by a Lieutenant.
///
/// `path` names every node the value passed through, Commander first and the
/// relaying Lieutenant last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    /// Value the relayer claims to have received along `path`
    pub value: Order,
    /// Relay chain including the sender
    pub path: Path,
    /// Remaining relay rounds after this one
    pub depth: u32,
}

/// Message exchanged by the agreement protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgreementMessage {
    /// Commander to Lieutenant
    Order(OrderMessage),
    /// Lieutenant to Lieutenant
    Relay(RelayMessage),
}

impl AgreementMessage {
    /// Opcode identifying this message on the wire.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Order(_) => Opcode::Order,
            Self::Relay(_) => Opcode::Relay,
        }
    }

    /// Value carried by the message.
    #[must_use]
    pub const fn value(&self) -> Order {
        match self {
            Self::Order(msg) => msg.value,
            Self::Relay(msg) => msg.value,
        }
    }

    /// Remaining relay rounds.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        match self {
            Self::Order(msg) => msg.depth,
            Self::Relay(msg) => msg.depth,
        }
    }
}

impl From<OrderMessage> for AgreementMessage {
    fn from(msg: OrderMessage) -> Self {
        Self::Order(msg)
    }
}

impl From<RelayMessage> for AgreementMessage {
    fn from(msg: RelayMessage) -> Self {
        Self::Relay(msg)
    }
}
