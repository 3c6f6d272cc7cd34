//! Fuzz target for frame and payload decoding
//!
//! Arbitrary bytes are decoded as a frame, then as the payload its opcode
//! names. Anything that decodes must encode back to the same bytes.
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - A decoded frame re-encodes to exactly the bytes it was read from

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use parley_proto::{Frame, Payload};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    let mut buf = BytesMut::new();
    frame.encode(&mut buf).expect("decoded frame must re-encode");
    assert_eq!(&buf[..], &data[..frame.wire_len()]);

    let _ = Payload::from_frame(&frame);
});
