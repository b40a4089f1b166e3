// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! A coordinator-side handle to one worker's (or worker range's, when a
//! forwarder sits in front of it) TCP connection.
//!
//! `WorkDistributor` and the Borůvka query code both need to send a
//! message and block for its reply, but `WorkDistributor`'s loop runs on a
//! plain `std::thread` (its gutter dequeue is genuinely blocking), not a
//! tokio task. `WorkerLink` bridges the two: the connection itself is a
//! `tokio::net::TcpStream`, driven via a captured runtime `Handle` so a
//! blocking thread can still `block_on` a send/receive round trip.

use std::sync::Mutex;

use bytes::BytesMut;
use sketch_core::SketchError;
use sketch_wire::{FrameAccumulator, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;

/// A connection's stream plus the frame accumulator reading it, behind one
/// mutex: a persistent accumulator (rather than a fresh one per call) is
/// required once sends and receives are no longer strictly paired, since a
/// single `read` can return more than one frame's worth of bytes and a
/// locally-scoped accumulator would silently drop the remainder.
struct Conn {
    stream: TcpStream,
    acc: FrameAccumulator,
}

/// One worker's (or forwarded range's) connection, serialized behind a
/// mutex. `exchange` keeps the original's synchronous `MPI_Send`/
/// `MPI_Probe`/`MPI_Recv` round-trip shape; [`Self::send_only`] and
/// [`Self::recv_only`] let a caller pipeline several sends ahead of their
/// replies, per spec.md §4.2's `max_outstanding_deltas` window.
pub struct WorkerLink {
    rank: usize,
    conn: Mutex<Conn>,
    runtime: Handle,
    max_msg_size: usize,
}

impl WorkerLink {
    /// Wrap an already-connected stream for worker `rank`, driven via
    /// `runtime` from whichever thread calls [`Self::exchange`].
    pub fn new(rank: usize, stream: TcpStream, runtime: Handle, max_msg_size: usize) -> Self {
        Self {
            rank,
            conn: Mutex::new(Conn {
                stream,
                acc: FrameAccumulator::new(),
            }),
            runtime,
            max_msg_size,
        }
    }

    /// This worker's rank.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Send `msg` and block until a full reply frame has arrived.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::Io`] on a connection failure,
    /// [`SketchError::Wire`] on a malformed reply, and
    /// [`SketchError::PeerDisconnected`] if the connection closes before a
    /// full frame is read.
    pub fn exchange(&self, msg: &Message) -> Result<Message, SketchError> {
        let mut conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let rank = self.rank;
        let max_msg_size = self.max_msg_size;
        self.runtime.block_on(async {
            let mut out = BytesMut::new();
            msg.encode_into(&mut out);
            conn.stream.write_all(&out).await?;
            recv_locked(&mut conn, rank, max_msg_size).await
        })
    }

    /// Fire-and-forget send with no reply expected (`Flush`, `Stop`,
    /// `Shutdown`, or a pipelined `Batch` whose `Delta` will be collected
    /// later via [`Self::recv_only`]).
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::Io`] on a connection failure.
    pub fn send_only(&self, msg: &Message) -> Result<(), SketchError> {
        let mut conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.runtime.block_on(async {
            let mut out = BytesMut::new();
            msg.encode_into(&mut out);
            conn.stream.write_all(&out).await?;
            Ok(())
        })
    }

    /// Block until the next full reply frame has arrived, with no send of
    /// our own — the receive half of a pipelined `send_only`.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::Io`] on a connection failure,
    /// [`SketchError::Wire`] on a malformed reply, and
    /// [`SketchError::PeerDisconnected`] if the connection closes before a
    /// full frame is read.
    pub fn recv_only(&self) -> Result<Message, SketchError> {
        let mut conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let rank = self.rank;
        let max_msg_size = self.max_msg_size;
        self.runtime.block_on(recv_locked(&mut conn, rank, max_msg_size))
    }
}

async fn recv_locked(conn: &mut Conn, rank: usize, max_msg_size: usize) -> Result<Message, SketchError> {
    let mut chunk = [0_u8; 8192];
    loop {
        match conn
            .acc
            .next_message(max_msg_size)
            .map_err(|e| SketchError::Wire(e.to_string()))?
        {
            Some(reply) => return Ok(reply),
            None => {
                let n = conn.stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(SketchError::PeerDisconnected(rank as sketch_core::NodeId));
                }
                conn.acc.feed(&chunk[..n]);
            }
        }
    }
}
