//! Async frame I/O over byte streams.
//!
//! Frames are self-delimiting: the header carries the payload length, so a
//! reader pulls exactly 16 bytes, validates them, then pulls the payload.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    Frame, FrameHeader,
    errors::{ProtocolError, Result},
};

/// Read one frame from `reader`.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
///
/// # Errors
///
/// - Header validation errors from [`FrameHeader::from_bytes`]
/// - `ProtocolError::FrameTruncated` if the stream ends inside a frame
/// - `ProtocolError::Io` for any other stream failure
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; FrameHeader::SIZE];
    let mut filled = 0;
    while filled < FrameHeader::SIZE {
        let n = reader.read(&mut header_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ProtocolError::FrameTooShort {
                expected: FrameHeader::SIZE,
                actual: filled,
            });
        }
        filled += n;
    }

    let header = FrameHeader::from_bytes(&header_buf)?;
    let payload_size = header.payload_size() as usize;

    let mut payload = vec![0u8; payload_size];
    let mut read = 0;
    while read < payload_size {
        let n = reader.read(&mut payload[read..]).await?;
        if n == 0 {
            return Err(ProtocolError::FrameTruncated { expected: payload_size, actual: read });
        }
        read += n;
    }

    Ok(Some(Frame { header, payload: Bytes::from(payload) }))
}

/// Write one frame to `writer` and flush it.
///
/// # Errors
///
/// - `ProtocolError::PayloadTooLarge` if the frame exceeds the size limit
/// - `ProtocolError::Io` if the stream fails
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(frame.wire_len());
    frame.encode(&mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
