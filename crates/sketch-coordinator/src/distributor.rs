// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `WorkDistributor`: the per-worker loop that pulls flushed batches from
//! the gutter and either applies them locally or pipelines them to its
//! worker, applying the returned deltas into the cluster's resident-image
//! cache — `apply_delta_update` in the original.
//!
//! Kept as a distinct role (rather than folded into `Cluster`) because its
//! loop runs on a plain `std::thread`, not the tokio runtime the rest of
//! the coordinator uses: `Gutter::get_data` is a genuinely blocking call.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use sketch_core::batch::{total_updates, BatchGroup};
use sketch_core::status::DistributorStatus;
use sketch_core::supernode::{SketchSupernode, SupernodeFactory};
use sketch_core::{Delta, SketchError};
use sketch_wire::Message;
use tracing::instrument;

use crate::cluster::Cluster;
use crate::worker_link::WorkerLink;

/// One worker's distribution loop, implementing spec.md §4.2's per-worker
/// protocol: flushes under `local_process_cutoff` are applied locally
/// against a scratch supernode, never touching the network; flushes at or
/// above it are pipelined to the worker, keeping up to
/// `max_outstanding_deltas` `BATCH` messages in flight before blocking on a
/// `DELTA` reply.
pub struct WorkDistributor {
    worker_id: usize,
    link: Arc<WorkerLink>,
    status: Arc<std::sync::Mutex<DistributorStatus>>,
}

impl WorkDistributor {
    /// Construct a distributor for worker rank `worker_id`, reading the
    /// cluster's own link and status handle for that rank.
    pub fn new<F: SupernodeFactory>(cluster: &Cluster<F>, worker_id: usize) -> Self {
        Self {
            worker_id,
            link: Arc::clone(&cluster.workers[worker_id]),
            status: Arc::clone(&cluster.distributor_status[worker_id]),
        }
    }

    /// Run the distribution loop on the calling thread until `cluster`
    /// shuts down. Intended to be spawned on its own `std::thread` per
    /// worker, since `Gutter::get_data` blocks.
    #[instrument(skip(self, cluster), fields(worker_id = self.worker_id))]
    pub fn run<F: SupernodeFactory>(&self, cluster: &Cluster<F>) {
        let batches_per_flush = cluster.config.batches_per_flush;
        let mut buffer: BatchGroup = Vec::with_capacity(batches_per_flush);
        let mut outstanding: VecDeque<u64> = VecDeque::new();

        loop {
            if cluster.shutdown.load(Ordering::SeqCst) {
                self.flush(&mut buffer, cluster, &mut outstanding);
                self.drain_outstanding(cluster, &mut outstanding);
                return;
            }

            if self.should_pause(cluster) {
                self.flush(&mut buffer, cluster, &mut outstanding);
                self.drain_outstanding(cluster, &mut outstanding);
                self.pause_and_wait(cluster);
                continue;
            }

            self.set_status(DistributorStatus::QueueWait);
            let group = cluster.gutter.get_data(self.worker_id);
            if group.is_empty() {
                continue;
            }
            buffer.extend(group);
            if buffer.len() >= batches_per_flush {
                self.flush(&mut buffer, cluster, &mut outstanding);
            }
        }
    }

    fn should_pause<F: SupernodeFactory>(&self, cluster: &Cluster<F>) -> bool {
        *cluster
            .pause
            .paused
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn pause_and_wait<F: SupernodeFactory>(&self, cluster: &Cluster<F>) {
        self.set_status(DistributorStatus::Paused);
        let mut paused = cluster
            .pause
            .paused
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while *paused && !cluster.shutdown.load(Ordering::SeqCst) {
            paused = cluster
                .pause
                .condvar
                .wait(paused)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Flush the buffered batch group: apply it locally if it's small
    /// enough to not be worth a round trip, otherwise pipeline it to the
    /// worker, blocking on a `DELTA` reply first if already at the
    /// outstanding cap.
    fn flush<F: SupernodeFactory>(&self, buffer: &mut BatchGroup, cluster: &Cluster<F>, outstanding: &mut VecDeque<u64>) {
        if buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(buffer);
        #[allow(clippy::cast_possible_truncation)]
        let num_updates = total_updates(&batch) as u64;

        if total_updates(&batch) < cluster.config.local_process_cutoff {
            self.set_status(DistributorStatus::ApplyDelta);
            let deltas = apply_locally(&cluster.factory, batch);
            cluster.apply_deltas(deltas);
            cluster.record_updates(num_updates);
            return;
        }

        self.set_status(DistributorStatus::DistribProcessing);
        let cap = cluster
            .config
            .max_outstanding_deltas
            .min(cluster.outstanding_depth(self.worker_id))
            .max(1);
        while outstanding.len() >= cap {
            if !self.receive_one(cluster, outstanding) {
                // The link failed; drop the rest of this flush rather than
                // spin forever waiting for a reply that will never arrive.
                return;
            }
        }

        if let Err(err) = self.link.send_only(&Message::Batch(batch)) {
            tracing::error!(worker_id = self.worker_id, %err, "pipelined send failed");
            return;
        }
        outstanding.push_back(num_updates);
    }

    /// Drain every still-outstanding `DELTA` reply, applying each as it
    /// arrives. Called before pausing or shutting down so a distributor
    /// never leaves deltas stranded in flight.
    fn drain_outstanding<F: SupernodeFactory>(&self, cluster: &Cluster<F>, outstanding: &mut VecDeque<u64>) {
        while !outstanding.is_empty() {
            if !self.receive_one(cluster, outstanding) {
                break;
            }
        }
    }

    /// Block for the next `DELTA` reply, apply it, and pop its matching
    /// outstanding-update count. Returns `false` on a link failure (the
    /// caller gives up rather than spinning).
    fn receive_one<F: SupernodeFactory>(&self, cluster: &Cluster<F>, outstanding: &mut VecDeque<u64>) -> bool {
        let reply = match self.link.recv_only() {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(worker_id = self.worker_id, %err, "awaiting delta failed");
                return false;
            }
        };
        match reply {
            Message::Delta(deltas) => {
                self.set_status(DistributorStatus::ApplyDelta);
                cluster.apply_deltas(deltas);
                if let Some(num_updates) = outstanding.pop_front() {
                    cluster.record_updates(num_updates);
                }
                self.set_status(DistributorStatus::DistribProcessing);
                true
            }
            other => {
                tracing::error!(
                    worker_id = self.worker_id,
                    tag = other.tag().as_u8(),
                    "unexpected reply awaiting delta"
                );
                false
            }
        }
    }

    fn set_status(&self, status: DistributorStatus) {
        *self
            .status
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = status;
    }
}

/// Apply a batch group against fresh scratch supernodes and return the
/// resulting deltas, with no round trip to the worker — the
/// `local_process_cutoff` fast path spec.md §4.2 describes.
fn apply_locally<F: SupernodeFactory>(factory: &F, batch: BatchGroup) -> Vec<Delta> {
    batch
        .into_iter()
        .map(|b| {
            let mut node = factory.create(b.node_idx);
            for dest in &b.dests {
                node.apply(*dest);
            }
            Delta::new(b.node_idx, node.serialize())
        })
        .collect()
}
