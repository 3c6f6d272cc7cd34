//! Inbound side: read frames and hand payloads to a node.
//!
//! Each connection is served by its own task, and frames on one connection
//! are delivered one at a time in arrival order. A node therefore sees every
//! peer's messages in the order the peer sent them.

use std::{future::Future, sync::Arc};

use parley_proto::{NodeId, Payload, ProtocolError, codec};
use tokio::{io::AsyncRead, net::TcpListener, sync::mpsc};

use crate::transport::Envelope;

/// Receives decoded payloads.
pub trait Inbound: Send + Sync + 'static {
    /// Handle one payload from `from`.
    ///
    /// Called concurrently with the node's own driver, and from one task per
    /// inbound connection.
    fn deliver(&self, from: NodeId, payload: Payload) -> impl Future<Output = ()> + Send;
}

/// Deliver every frame read from `stream` until it closes.
///
/// Frames that carry an undecodable payload are logged and skipped. A framing
/// error ends the connection, since the stream can no longer be trusted to be
/// aligned on frame boundaries.
///
/// # Errors
///
/// - `ProtocolError` if the byte stream is not a sequence of valid frames
pub async fn serve_connection<S, H>(mut stream: S, handler: &H) -> Result<(), ProtocolError>
where
    S: AsyncRead + Unpin,
    H: Inbound,
{
    while let Some(frame) = codec::read_frame(&mut stream).await? {
        let from = frame.sender_id();
        match Payload::from_frame(&frame) {
            Ok(payload) => handler.deliver(from, payload).await,
            Err(err) => {
                tracing::warn!(
                    from,
                    opcode = frame.header.opcode(),
                    error = %err,
                    "discarding malformed payload"
                );
            },
        }
    }
    Ok(())
}

/// Accept connections forever, serving each on its own task.
///
/// # Errors
///
/// - `std::io::Error` if accepting fails
pub async fn serve_listener<H: Inbound>(
    listener: TcpListener,
    handler: Arc<H>,
) -> std::io::Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        socket.set_nodelay(true)?;
        tracing::debug!(%addr, "accepted connection");

        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            if let Err(err) = serve_connection(socket, handler.as_ref()).await {
                tracing::warn!(%addr, error = %err, "connection closed with error");
            }
        });
    }
}

/// Deliver every envelope from an in-process inbox until all senders drop.
pub async fn serve_channel<H: Inbound>(
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
    handler: Arc<H>,
) {
    while let Some(Envelope { from, payload }) = inbox.recv().await {
        handler.deliver(from, payload).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use parley_proto::{FrameHeader, MutexMessage, Opcode};
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(NodeId, Payload)>>);

    impl Inbound for Recorder {
        async fn deliver(&self, from: NodeId, payload: Payload) {
            self.0.lock().expect("lock").push((from, payload));
        }
    }

    #[tokio::test]
    async fn skips_malformed_payload_and_continues() {
        let (mut client, server) = tokio::io::duplex(4096);

        let good = Payload::from(MutexMessage::Ack { timestamp: 7 }).into_frame(2).expect("frame");
        let bad = parley_proto::Frame::new(FrameHeader::new(Opcode::Order, 2), vec![0xff, 0x00]);

        let mut buf = Vec::new();
        bad.encode(&mut buf).expect("encode");
        good.encode(&mut buf).expect("encode");
        client.write_all(&buf).await.expect("write");
        drop(client);

        let recorder = Recorder::default();
        serve_connection(server, &recorder).await.expect("clean close");

        let seen = recorder.0.lock().expect("lock").clone();
        assert_eq!(seen, vec![(2, MutexMessage::Ack { timestamp: 7 }.into())]);
    }

    #[tokio::test]
    async fn framing_error_ends_connection() {
        let (mut client, server) = tokio::io::duplex(4096);
        client.write_all(&[0u8; FrameHeader::SIZE]).await.expect("write");
        drop(client);

        let recorder = Recorder::default();
        let result = serve_connection(server, &recorder).await;
        assert!(matches!(result, Err(ProtocolError::InvalidMagic(_))));
    }
}
