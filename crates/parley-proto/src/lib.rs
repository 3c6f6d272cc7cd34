//! Wire format for the Parley protocols.
//!
//! Every message travels as a [`Frame`]: a fixed 16-byte big-endian
//! [`FrameHeader`] followed by a CBOR-encoded [`Payload`]. The header carries
//! the opcode and the sender id, so a receiver knows who sent a frame and what
//! shape its payload has before decoding it.
//!
//! # Components
//!
//! - [`FrameHeader`]: fixed header (magic, version, opcode, size, sender)
//! - [`Frame`]: header plus raw payload bytes
//! - [`Payload`]: typed mutual exclusion and agreement messages
//! - [`codec`]: async read/write of frames over any byte stream

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;
mod types;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcode::Opcode;
pub use payloads::{
    Payload,
    agreement::{AgreementMessage, OrderMessage, RelayMessage},
    mutex::MutexMessage,
};
pub use types::{NodeId, Order, ParseOrderError, Path, Timestamp};
