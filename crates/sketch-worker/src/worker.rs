// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `DistributedWorker`: the single-threaded dispatcher of spec.md §4.3,
//! driving a `rayon::ThreadPool` of `helper_threads` workers for the
//! CPU-bound per-record work (`generate_delta_node`, sample extraction)
//! each incoming message carries.
//!
//! The dispatcher itself runs on whichever thread calls [`Self::run`] —
//! intended to be the process's main thread, exactly mirroring
//! `sketch_coordinator::worker_link::WorkerLink`'s "blocking thread bridged
//! into tokio via a captured `Handle`" shape, just on the other end of the
//! same connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::prelude::*;
use sketch_core::batch::{total_updates, BatchGroup};
use sketch_core::supernode::SupernodeFactory;
use sketch_core::{Delta, SketchError};
use sketch_wire::message::{QueryRecord, QueryReplyRecord};
use sketch_wire::{FrameAccumulator, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tracing::instrument;

use crate::query::sample_one;

/// A reusable delta-computation slot recycled between `recv_msg_queue` and
/// `send_msg_queue`: holds one flushed `BATCH`'s worth of computed deltas,
/// so the steady-state dispatch loop reuses the same handful of `Vec`
/// allocations rather than allocating fresh per batch.
struct BatchesToDeltasHandler {
    deltas: Vec<Delta>,
}

impl BatchesToDeltasHandler {
    fn new() -> Self {
        Self { deltas: Vec::new() }
    }
}

/// The two-queue handler pool spec.md §4.3 describes: `recv_msg_queue`
/// holds handlers free to receive a `BATCH` into, `send_msg_queue` holds
/// handlers whose deltas a helper task has finished computing and are
/// ready for the synchronous `return_deltas` send. Sized `2 ×
/// helper_threads`, the same depth this worker answers `BUFF_QUERY` with.
struct HandlerPool {
    slots: usize,
    recv_tx: Sender<BatchesToDeltasHandler>,
    recv_rx: Receiver<BatchesToDeltasHandler>,
    send_tx: Sender<BatchesToDeltasHandler>,
    send_rx: Receiver<BatchesToDeltasHandler>,
}

impl HandlerPool {
    fn new(slots: usize) -> Self {
        let slots = slots.max(1);
        let (recv_tx, recv_rx) = bounded(slots);
        let (send_tx, send_rx) = bounded(slots);
        for _ in 0..slots {
            // Capacity is `slots`, so this never blocks.
            let _ = recv_tx.send(BatchesToDeltasHandler::new());
        }
        Self {
            slots,
            recv_tx,
            recv_rx,
            send_tx,
            send_rx,
        }
    }
}

/// One worker process's dispatcher + helper pool, generic over the
/// supernode factory so this crate never links a concrete sketch
/// implementation (see [`sketch_core::supernode::SupernodeFactory`]'s own
/// doc comment for why).
pub struct DistributedWorker<F: SupernodeFactory> {
    factory: Arc<F>,
    pool: rayon::ThreadPool,
    updates_processed: Arc<AtomicU64>,
    handlers: HandlerPool,
}

impl<F: SupernodeFactory + 'static> DistributedWorker<F> {
    /// Build a worker with a `helper_threads`-sized rayon pool and a
    /// `2 × helper_threads`-deep handler pool, matching
    /// `DistributedWorker::helper_threads = std::thread::hardware_concurrency()`
    /// in the original, except the caller chooses the count explicitly
    /// rather than this crate reading the host's CPU count itself.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::Io`] if the rayon pool fails to spawn its
    /// threads.
    pub fn new(factory: Arc<F>, helper_threads: usize) -> Result<Self, SketchError> {
        let helper_threads = helper_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(helper_threads)
            .thread_name(|i| format!("sketch-worker-helper-{i}"))
            .build()
            .map_err(|err| SketchError::Io(std::io::Error::other(err)))?;
        Ok(Self {
            factory,
            pool,
            updates_processed: Arc::new(AtomicU64::new(0)),
            handlers: HandlerPool::new(2 * helper_threads),
        })
    }

    /// Total edge updates applied across every `Batch` processed so far,
    /// shared with [`crate::status::WorkerStatusReporter`].
    pub fn updates_processed_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.updates_processed)
    }

    /// Run the dispatcher loop against an already-connected, already
    /// `Init`-ed stream, until a `Shutdown` message arrives or the
    /// connection closes. Mirrors `distributed_worker.cpp::run`'s
    /// `while (running)` loop, minus the OpenMP task-queue bookkeeping
    /// rayon handles internally.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::Io`]/[`SketchError::Wire`] on a connection or
    /// framing failure, and [`SketchError::UnexpectedTag`] if the
    /// coordinator sends a tag this worker does not expect to receive
    /// (`Delta`, `QueryReply`, `BuffQueryReply`, `StopReply`).
    #[instrument(skip(self, stream, runtime))]
    pub fn run(&self, mut stream: TcpStream, runtime: &Handle, max_msg_size: usize) -> Result<(), SketchError> {
        let mut acc = FrameAccumulator::new();
        let mut chunk = [0_u8; 8192];

        loop {
            let msg = runtime.block_on(read_message(&mut stream, &mut acc, &mut chunk, max_msg_size))?;
            match msg {
                Message::Batch(batches) => {
                    self.dispatch_batch(batches, &mut stream, runtime)?;
                }
                Message::Query { records, .. } => {
                    let reply = Message::QueryReply(self.process_query(records));
                    runtime.block_on(write_message(&mut stream, &reply))?;
                }
                Message::BuffQuery { .. } => {
                    #[allow(clippy::cast_possible_truncation)]
                    let slots = self.handlers.slots as u32;
                    runtime.block_on(write_message(&mut stream, &Message::BuffQueryReply { slots }))?;
                }
                Message::Init(_) => {
                    // A fresh INIT after STOP resumes the same dispatcher;
                    // vertex count and seed don't change mid-cluster-life,
                    // so there's nothing to reconfigure here.
                    tracing::info!("worker reinitialized, resuming");
                }
                Message::Stop => {
                    self.drain_handler_pool(&mut stream, runtime)?;
                    let num_updates = self.updates_processed.swap(0, Ordering::Relaxed);
                    runtime.block_on(write_message(&mut stream, &Message::StopReply { num_updates }))?;
                    tracing::info!(num_updates, "worker stopped, awaiting fresh Init");
                }
                Message::Shutdown => {
                    self.drain_handler_pool(&mut stream, runtime)?;
                    tracing::info!("worker shutting down");
                    return Ok(());
                }
                other => {
                    return Err(SketchError::UnexpectedTag {
                        tag: other.tag().as_u8(),
                        node_idx: 0,
                    });
                }
            }
        }
    }

    /// Borrow a handler from `recv_msg_queue`, spawn a helper-pool task
    /// that turns `batches` into that handler's deltas and pushes it onto
    /// `send_msg_queue`, then — only if nothing is left to receive into —
    /// drain one completed handler, keeping the critical path one-sided
    /// per spec.md §4.3.
    fn dispatch_batch(&self, batches: BatchGroup, stream: &mut TcpStream, runtime: &Handle) -> Result<(), SketchError> {
        let handler = self
            .handlers
            .recv_rx
            .recv()
            .map_err(|_| SketchError::Io(std::io::Error::other("handler pool recv queue closed")))?;

        #[allow(clippy::cast_possible_truncation)]
        let num_updates = total_updates(&batches) as u64;
        self.updates_processed.fetch_add(num_updates, Ordering::Relaxed);

        let factory = Arc::clone(&self.factory);
        let send_tx = self.handlers.send_tx.clone();
        self.pool.spawn(move || {
            let mut handler = handler;
            handler.deltas = batches
                .into_par_iter()
                .map(|batch| {
                    let mut node = factory.create(batch.node_idx);
                    for dest in &batch.dests {
                        node.apply(*dest);
                    }
                    Delta::new(batch.node_idx, node.serialize())
                })
                .collect();
            // A closed channel means the worker is tearing down; dropping
            // the handler on the floor is fine at that point.
            let _ = send_tx.send(handler);
        });

        if self.handlers.recv_rx.is_empty() {
            self.process_send_queue_elm(stream, runtime)?;
        }
        Ok(())
    }

    /// Pop one completed handler from `send_msg_queue`, synchronously send
    /// its deltas, and recycle the handler back to `recv_msg_queue`.
    fn process_send_queue_elm(&self, stream: &mut TcpStream, runtime: &Handle) -> Result<(), SketchError> {
        let mut handler = self
            .handlers
            .send_rx
            .recv()
            .map_err(|_| SketchError::Io(std::io::Error::other("handler pool send queue closed")))?;
        let deltas = std::mem::take(&mut handler.deltas);
        runtime.block_on(write_message(stream, &Message::Delta(deltas)))?;
        let _ = self.handlers.recv_tx.send(handler);
        Ok(())
    }

    /// Wait for every handler currently checked out (mid-helper-task or
    /// sitting in `send_msg_queue`) to drain back to `recv_msg_queue`,
    /// flushing each one's deltas as it arrives. Called before replying to
    /// `STOP` or exiting on `SHUTDOWN`.
    fn drain_handler_pool(&self, stream: &mut TcpStream, runtime: &Handle) -> Result<(), SketchError> {
        while self.handlers.recv_rx.len() < self.handlers.slots {
            self.process_send_queue_elm(stream, runtime)?;
        }
        Ok(())
    }

    /// Fan a round's sample requests across the helper pool.
    fn process_query(&self, records: Vec<QueryRecord>) -> Vec<QueryReplyRecord> {
        let factory = &*self.factory;
        self.pool.install(|| {
            records
                .par_iter()
                .map(|record| sample_one(factory, record))
                .collect()
        })
    }
}

async fn read_message(
    stream: &mut TcpStream,
    acc: &mut FrameAccumulator,
    chunk: &mut [u8],
    max_msg_size: usize,
) -> Result<Message, SketchError> {
    loop {
        if let Some(msg) = acc
            .next_message(max_msg_size)
            .map_err(|e| SketchError::Wire(e.to_string()))?
        {
            return Ok(msg);
        }
        let n = stream.read(chunk).await?;
        if n == 0 {
            return Err(SketchError::PeerDisconnected(0));
        }
        acc.feed(&chunk[..n]);
    }
}

async fn write_message(stream: &mut TcpStream, msg: &Message) -> Result<(), SketchError> {
    let mut out = bytes::BytesMut::new();
    msg.encode_into(&mut out);
    stream.write_all(&out).await?;
    Ok(())
}
