//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary, payloads are CBOR. The header opcode already
//! identifies the payload type, so only the inner struct is serialized (no
//! variant tag). A frame whose opcode and body disagree fails to decode.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). Decoding an encoded payload with its own opcode yields an
//! equal value.

pub mod agreement;
pub mod mutex;

use bytes::BufMut;

use self::{
    agreement::{AgreementMessage, OrderMessage, RelayMessage},
    mutex::{MutexMessage, Stamp},
};
use crate::{
    Frame, FrameHeader, NodeId, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Lamport mutual exclusion
    Mutex(MutexMessage),
    /// Oral Messages agreement
    Agreement(AgreementMessage),
}

impl Payload {
    /// Opcode corresponding to this payload.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Mutex(msg) => msg.opcode(),
            Self::Agreement(msg) => msg.opcode(),
        }
    }

    /// Encode the inner message as CBOR into `dst`.
    ///
    /// Does not enforce the payload size limit; [`Frame::encode`] does.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Mutex(msg) => ciborium::ser::into_writer(&msg.stamp(), &mut writer),
            Self::Agreement(AgreementMessage::Order(inner)) => {
                ciborium::ser::into_writer(inner, &mut writer)
            },
            Self::Agreement(AgreementMessage::Relay(inner)) => {
                ciborium::ser::into_writer(inner, &mut writer)
            },
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode a payload body according to `opcode`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if `bytes` exceed `MAX_PAYLOAD_SIZE`
    /// - `ProtocolError::CborDecode` if the body does not match the opcode
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Request | Opcode::Ack | Opcode::Release => {
                let stamp: Stamp = decode_cbor(bytes)?;
                let msg = MutexMessage::from_stamp(opcode, stamp)
                    .ok_or(ProtocolError::UnknownOpcode(opcode.to_u16()))?;
                Self::Mutex(msg)
            },
            Opcode::Order => {
                let msg: OrderMessage = decode_cbor(bytes)?;
                Self::Agreement(AgreementMessage::Order(msg))
            },
            Opcode::Relay => {
                let msg: RelayMessage = decode_cbor(bytes)?;
                Self::Agreement(AgreementMessage::Relay(msg))
            },
        };

        Ok(payload)
    }

    /// Encode into a frame sent by `sender`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, sender: NodeId) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(Frame::new(FrameHeader::new(self.opcode(), sender), buf))
    }

    /// Parse the payload of a received frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the header opcode is unrecognized
    /// - `ProtocolError::CborDecode` if the body does not match the opcode
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

impl From<MutexMessage> for Payload {
    fn from(msg: MutexMessage) -> Self {
        Self::Mutex(msg)
    }
}

impl From<AgreementMessage> for Payload {
    fn from(msg: AgreementMessage) -> Self {
        Self::Agreement(msg)
    }
}

fn decode_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}
