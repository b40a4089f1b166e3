// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The `Gutter` contract: the buffering layer a `WorkDistributor` pulls
//! flushed batches from.
//!
//! Like [`crate::supernode::SketchSupernode`], no implementation lives in
//! this crate. `sketch-fixtures` provides an in-memory reference gutter for
//! tests, benches and the demo binary; a production embedder is expected to
//! supply one backed by the same GutterTree/buffer-tree design the original
//! streaming layer uses, which this repository's scope does not cover.

use crate::batch::BatchGroup;

/// A source of flushed update batches, polled by a `WorkDistributor`'s
/// per-worker thread.
///
/// Implementations own whatever buffering policy decides when updates
/// queued against a vertex are worth flushing (a size threshold, a buffer
/// tree eviction, …); the distributor only ever sees the flushed result.
pub trait Gutter: Send + Sync {
    /// Pull the next group of flushed batches for worker `worker_id`,
    /// blocking until at least one batch is available or the gutter is
    /// told to stop.
    ///
    /// Returns an empty group only when `force_flush` has drained the
    /// gutter and no further data will ever arrive for this worker.
    fn get_data(&self, worker_id: usize) -> BatchGroup;

    /// Switch between blocking and non-blocking `get_data` semantics, the
    /// way the original's `gts->set_non_block` lets a distributor poll
    /// without stalling its pause handshake.
    fn set_non_block(&self, non_block: bool);

    /// Flush all buffered updates immediately, regardless of threshold,
    /// and wake any thread blocked in `get_data`. Used before a query so
    /// every resident supernode reflects every update inserted so far.
    fn force_flush(&self);

    /// Number of workers this gutter partitions updates across.
    fn num_workers(&self) -> usize;
}
