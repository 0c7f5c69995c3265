//! Per-connection task wiring (§4.2, §4.7): a read loop that decodes and
//! dispatches frames, paired with a writer task that owns the socket's
//! write half and drains an unbounded channel fed by the router and every
//! spy fan-out. Generic over the stream type so tests can drive it with an
//! in-memory duplex pipe instead of a real socket.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::client::Client;
use crate::disconnect;
use crate::model::ClientId;
use crate::router::Router;
use crate::wire::{self, Frame};

/// Runs one client connection to completion: registers it, serves its read
/// loop, and runs the disconnect protocol on exit. Returns once the
/// connection and its writer task have both wound down.
pub async fn serve_connection<S>(stream: S, peer: SocketAddr, router: Arc<Router>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Bytes>();

    let client = Client::new(ClientId::new(peer.to_string()), outbound_tx);
    router.registries().clients.insert(client.clone());
    tracing::info!(client = %client.describe(), peer = %peer, "client connected");

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(err) = writer.write_all(&frame).await {
                tracing::debug!(error = %err, "writer task exiting: write failed");
                return;
            }
        }
        let _ = writer.shutdown().await;
    });

    loop {
        match wire::read_frame(&mut reader).await {
            Ok(Frame::Data(raw)) => match wire::decode_envelope(&raw) {
                Ok(envelope) => router.dispatch(&client, raw, envelope),
                Err(err) => {
                    tracing::error!(
                        client = %client.describe(),
                        error = %err,
                        raw = %hex_dump(&raw),
                        "failed to decode envelope; dropping message"
                    );
                }
            },
            Ok(Frame::Eof) => break,
            Err(err) => {
                tracing::warn!(client = %client.describe(), error = %err, "read error; closing connection");
                break;
            }
        }
    }

    disconnect::disconnect(&router, client);
    writer_task.abort();
}

fn hex_dump(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, byte| {
        let _ = write!(acc, "{byte:02x}");
        acc
    })
}
