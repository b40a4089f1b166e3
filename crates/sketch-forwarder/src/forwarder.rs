// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `Forwarder`: a transparent tag-preserving proxy for one worker,
//! replacing `message_forwarder.cpp`'s `first_batch`/`batch_buffer` and
//! `first_delta`/`delta_buffer` double buffers with one
//! [`sketch_core::SendRing`] per direction, so a coordinator-bound `Delta`
//! in flight never blocks a worker-bound `Batch` from being assembled (and
//! vice versa).
//!
//! **Scope note**: the original's forwarder multiplexes a *contiguous
//! range* of worker ids behind one process, reading a 4-byte destination
//! header out of each `BATCH`/`FLUSH` body to pick which downstream worker
//! to relay to. This crate's `sketch-wire` protocol has no such header —
//! `Cluster::setup` dials one connection per worker rank directly — so a
//! `Forwarder` here proxies exactly one worker. Fronting a worker *range*
//! behind a single forwarder process would need the coordinator's
//! addressing scheme extended with that header first; out of scope for
//! this repository (the wire protocol is unchanged from spec.md §4.1 by
//! design).
//!
//! Frames are decoded via [`Message::decode_from`] and re-encoded via
//! [`Message::encode_into`] rather than copied as raw bytes: both are
//! lossless and canonical, so the round trip is byte-identical to a copy,
//! and decoding lets the forwarder log what it relayed and recognize
//! `Shutdown` without a second, ad hoc framing parser.

use bytes::BytesMut;
use sketch_core::SketchError;
use sketch_core::SendRing;
use sketch_wire::{FrameAccumulator, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::instrument;

/// One forwarder instance: a coordinator-facing connection and the
/// worker-facing connection it proxies to.
pub struct Forwarder {
    coordinator: TcpStream,
    worker: TcpStream,
    max_msg_size: usize,
}

impl Forwarder {
    /// Build a forwarder between an already-accepted coordinator connection
    /// and an already-connected worker connection.
    pub fn new(coordinator: TcpStream, worker: TcpStream, max_msg_size: usize) -> Self {
        Self {
            coordinator,
            worker,
            max_msg_size,
        }
    }

    /// Run both relay directions concurrently until either side closes or
    /// relays a `Shutdown`.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::Io`]/[`SketchError::Wire`] on a connection or
    /// framing failure in either direction.
    #[instrument(skip(self))]
    pub async fn run(self) -> Result<(), SketchError> {
        let (coord_read, coord_write) = self.coordinator.into_split();
        let (worker_read, worker_write) = self.worker.into_split();
        let max_msg_size = self.max_msg_size;

        let to_worker = relay_direction(coord_read, worker_write, max_msg_size, "coordinator->worker");
        let to_coordinator = relay_direction(worker_read, coord_write, max_msg_size, "worker->coordinator");
        tokio::try_join!(to_worker, to_coordinator)?;
        Ok(())
    }
}

/// Relay frames from `reader` to `writer`, one [`SendRing`] slot per frame,
/// until the peer closes or a `Shutdown` is relayed.
async fn relay_direction(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    max_msg_size: usize,
    direction: &'static str,
) -> Result<(), SketchError> {
    let mut acc = FrameAccumulator::new();
    let mut ring = SendRing::new();
    let mut chunk = [0_u8; 64 * 1024];

    loop {
        let msg = loop {
            if let Some(msg) = acc
                .next_message(max_msg_size)
                .map_err(|e| SketchError::Wire(e.to_string()))?
            {
                break msg;
            }
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                tracing::debug!(direction, "peer closed, ending this relay direction");
                return Ok(());
            }
            acc.feed(&chunk[..n]);
        };

        let is_shutdown = matches!(msg, Message::Shutdown);
        encode_into_ring(&msg, &mut ring);
        writer.write_all(ring.advance()).await?;

        if is_shutdown {
            tracing::info!(direction, "relayed shutdown, ending this relay direction");
            return Ok(());
        }
    }
}

fn encode_into_ring(msg: &Message, ring: &mut SendRing) {
    let buf: &mut BytesMut = ring.next_buffer();
    msg.encode_into(buf);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sketch_core::Batch;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connector = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (accepted, _) = listener.accept().await.unwrap();
        (connector.await.unwrap(), accepted)
    }

    async fn recv_one(stream: &mut TcpStream) -> Message {
        let mut acc = FrameAccumulator::new();
        let mut buf = [0_u8; 4096];
        loop {
            if let Some(msg) = acc.next_message(usize::MAX).unwrap() {
                return msg;
            }
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0);
            acc.feed(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn relays_a_batch_downstream_and_a_delta_upstream() {
        let (mut coordinator_client, coordinator_side) = connected_pair().await;
        let (worker_side, mut worker_client) = connected_pair().await;

        let forwarder = tokio::spawn(Forwarder::new(coordinator_side, worker_side, usize::MAX).run());

        let mut out = BytesMut::new();
        Message::Batch(vec![Batch::new(1, vec![2]).unwrap()]).encode_into(&mut out);
        coordinator_client.write_all(&out).await.unwrap();
        assert_eq!(
            recv_one(&mut worker_client).await,
            Message::Batch(vec![Batch::new(1, vec![2]).unwrap()])
        );

        let mut out = BytesMut::new();
        Message::Delta(vec![sketch_core::Delta::new(1, vec![9, 9])]).encode_into(&mut out);
        worker_client.write_all(&out).await.unwrap();
        assert_eq!(
            recv_one(&mut coordinator_client).await,
            Message::Delta(vec![sketch_core::Delta::new(1, vec![9, 9])])
        );

        let mut out = BytesMut::new();
        Message::Shutdown.encode_into(&mut out);
        coordinator_client.write_all(&out).await.unwrap();
        assert_eq!(recv_one(&mut worker_client).await, Message::Shutdown);

        let mut out = BytesMut::new();
        Message::Shutdown.encode_into(&mut out);
        worker_client.write_all(&out).await.unwrap();

        forwarder.await.unwrap().unwrap();
    }
}
