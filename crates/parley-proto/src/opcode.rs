//! Operation codes carried in the frame header.

/// Identifies the payload type of a frame.
///
/// Mutual exclusion messages occupy `0x00..0x10`, agreement messages
/// `0x10..0x20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Lamport REQUEST
    Request = 0x01,
    /// Lamport ACK
    Ack = 0x02,
    /// Lamport RELEASE
    Release = 0x03,
    /// Initial order from the Commander
    Order = 0x10,
    /// Value relayed by a Lieutenant
    Relay = 0x11,
}

impl Opcode {
    /// Raw wire value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a raw wire value. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::Ack),
            0x03 => Some(Self::Release),
            0x10 => Some(Self::Order),
            0x11 => Some(Self::Relay),
            _ => None,
        }
    }

    /// Whether this opcode belongs to the mutual exclusion protocol.
    #[must_use]
    pub const fn is_mutex(self) -> bool {
        matches!(self, Self::Request | Self::Ack | Self::Release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_map_back_from_wire_values() {
        for opcode in [Opcode::Request, Opcode::Ack, Opcode::Release, Opcode::Order, Opcode::Relay]
        {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
        assert_eq!(Opcode::from_u16(0xFFFF), None);
    }
}
