//! Fixed-size frame header.
//!
//! The header is 16 bytes of big-endian binary. It identifies the payload type
//! and the sending node so a receiver can route and validate a frame before
//! decoding the CBOR payload.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    NodeId, Opcode,
    errors::{ProtocolError, Result},
};

/// Fixed 16-byte frame header (big-endian network byte order)
///
/// ```text
/// 0       4   5   6       8               12              16
/// ┌───────┬───┬───┬───────┬───────────────┬───────────────┐
/// │ magic │ v │ r │opcode │ payload_size  │   sender_id   │
/// └───────┴───┴───┴───────┴───────────────┴───────────────┘
/// ```
///
/// Fields are stored as raw byte arrays so that the in-memory form is exactly
/// the wire form. `zerocopy` checks the layout at compile time.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],
    version: u8,
    reserved: u8,
    opcode: [u8; 2],
    pub(crate) payload_size: [u8; 4],
    sender_id: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header
    pub const SIZE: usize = 16;

    /// Magic number: "PRLY" in ASCII
    pub const MAGIC: u32 = 0x5052_4C59;

    /// Current protocol version
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (64 KiB)
    ///
    /// The largest legitimate payload is a relay path of a few dozen ids.
    pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

    /// Create a header for `opcode` sent by `sender_id`.
    #[must_use]
    pub fn new(opcode: Opcode, sender_id: NodeId) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            reserved: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            payload_size: [0; 4],
            sender_id: sender_id.to_be_bytes(),
        }
    }

    /// Parse a header from the start of `bytes`.
    ///
    /// Validates cheapest properties first (length, magic) so garbage input
    /// fails fast. The opcode is NOT validated here; an unknown opcode is a
    /// payload-level concern (see [`Self::opcode_enum`]).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than 16 bytes are given
    /// - `ProtocolError::InvalidMagic` if the magic is not `PRLY`
    /// - `ProtocolError::UnsupportedVersion` for any version but 1
    /// - `ProtocolError::PayloadTooLarge` if the size field exceeds the limit
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = *Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if header.magic() != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic(header.magic()));
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        if header.payload_size() > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: header.payload_size() as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize header to its wire form (zero-copy view, copied out).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Protocol magic number.
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version byte.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Node that sent the frame.
    #[must_use]
    pub fn sender_id(&self) -> NodeId {
        NodeId::from_be_bytes(self.sender_id)
    }

    /// Update the sending node.
    pub fn set_sender_id(&mut self, sender_id: NodeId) {
        self.sender_id = sender_id.to_be_bytes();
    }
}

impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &self.magic())
            .field("version", &self.version())
            .field("opcode", &self.opcode_enum())
            .field("payload_size", &self.payload_size())
            .field("sender_id", &self.sender_id())
            .finish_non_exhaustive()
    }
}

// Packed repr rules out the derive
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for FrameHeader {}

const _: () = assert!(size_of::<FrameHeader>() == FrameHeader::SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_bytes_round_trip() {
        let header = FrameHeader::new(Opcode::Relay, 7);
        let bytes = header.to_bytes();

        let parsed = FrameHeader::from_bytes(&bytes).expect("valid header");
        assert_eq!(parsed, header);
        assert_eq!(parsed.sender_id(), 7);
        assert_eq!(parsed.opcode_enum(), Some(Opcode::Relay));
        assert_eq!(&bytes[0..4], b"PRLY");
    }

    #[test]
    fn header_parses_from_prefix_of_longer_buffer() {
        let mut header = FrameHeader::new(Opcode::Order, 3);
        header.payload_size = 5u32.to_be_bytes();

        let mut buf = header.to_bytes().to_vec();
        buf.extend_from_slice(&[0xAB; 5]);

        let parsed = FrameHeader::from_bytes(&buf).expect("valid prefix");
        assert_eq!(parsed, header);
        assert_eq!(parsed.payload_size(), 5);
        assert_eq!(parsed.as_bytes().len(), FrameHeader::SIZE);
        assert_eq!(parsed.as_bytes(), &buf[..FrameHeader::SIZE]);
    }

    #[test]
    fn short_buffer_rejected() {
        let result = FrameHeader::from_bytes(&[0u8; 10]);
        assert_eq!(result, Err(ProtocolError::FrameTooShort { expected: 16, actual: 10 }));
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = FrameHeader::new(Opcode::Ack, 1).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::InvalidMagic(_))));
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut bytes = FrameHeader::new(Opcode::Ack, 1).to_bytes();
        bytes[4] = 9;
        assert_eq!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::UnsupportedVersion(9)));
    }

    #[test]
    fn oversized_payload_claim_rejected() {
        let mut bytes = FrameHeader::new(Opcode::Ack, 1).to_bytes();
        bytes[8..12].copy_from_slice(&(FrameHeader::MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        assert!(matches!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }
}
