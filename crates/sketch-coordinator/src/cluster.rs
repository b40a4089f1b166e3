// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! [`Cluster`]: the single owning object for a coordinator's lifetime,
//! replacing the original's process-wide statics (`shutdown`, `paused`,
//! `workers[]`, the pause mutex/condvar) with fields behind `Arc`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use sketch_core::status::{ClusterStatus, DistributorStatus};
use sketch_core::supernode::SupernodeFactory;
use sketch_core::{ClusterConfig, Gutter, SketchError};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tracing::instrument;

use crate::boruvka::{Partition, QueryTiming};
use crate::worker_link::WorkerLink;

/// Shared pause barrier: `WorkDistributor` threads park on `condvar` once
/// they observe `paused == true`; `Cluster::pause_workers` rescans every
/// distributor's status after each timed wait rather than trusting a
/// single wake, exactly the defensive loop
/// `work_distributor.cpp::pause_workers` runs against spurious wakeups.
#[derive(Default)]
pub(crate) struct PauseBarrier {
    pub(crate) paused: Mutex<bool>,
    pub(crate) condvar: Condvar,
}

/// The single owning object for a coordinator process: cluster
/// configuration, one [`WorkerLink`] per worker rank, the pause/shutdown
/// state every `WorkDistributor` and the query barrier coordinate through,
/// and the cached result of the last `spanning_forest_query`.
///
/// Generic over the supernode factory `F` so this crate never links a
/// concrete sketch implementation: `F` is supplied by whichever binary
/// embeds this cluster (the demo binary supplies `sketch_fixtures::AgmFactory`;
/// a production deployment would supply its own).
pub struct Cluster<F: SupernodeFactory> {
    pub(crate) config: ClusterConfig,
    pub(crate) factory: Arc<F>,
    pub(crate) gutter: Arc<dyn Gutter>,
    pub(crate) workers: Vec<Arc<WorkerLink>>,
    pub(crate) shutdown: Arc<AtomicBool>,
    pub(crate) pause: Arc<PauseBarrier>,
    pub(crate) distributor_status: Vec<Arc<Mutex<DistributorStatus>>>,
    pub(crate) updates_processed: Arc<AtomicU64>,
    pub(crate) last_partition: Mutex<Option<(Partition, QueryTiming, u64)>>,
    pub(crate) rounds_to_distribute: usize,
    /// The coordinator's view of each vertex's last-known serialized
    /// supernode image, kept current by `WorkDistributor::flush` applying
    /// every `Delta` a worker returns — `apply_delta_update` in the
    /// original. The query barrier reads from here rather than re-fetching
    /// from workers, since by the time it runs every distributor is paused
    /// and this map can't be racing a concurrent update.
    pub(crate) resident: Mutex<HashMap<sketch_core::NodeId, Vec<u8>>>,
    /// When this cluster was set up, for the Status Reporter's cumulative
    /// ingest rate.
    pub(crate) started_at: Instant,
    /// Each worker's `BUFF_QUERY`-negotiated outstanding-delta depth,
    /// learned once during `setup` and used to cap how far a distributor
    /// may pipeline ahead of its worker.
    pub(crate) buff_query_depth: Vec<usize>,
}

impl<F: SupernodeFactory> Cluster<F> {
    /// Dial every worker address, send each an `Init` with `config`, and
    /// return the ready cluster. Mirrors `graph_distrib_update.cpp`'s
    /// `setup_cluster`, minus the MPI process-spawn step: workers are
    /// already-running processes a coordinator dials into.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::Io`] if a worker address cannot be connected
    /// to.
    #[instrument(skip(gutter, runtime, factory))]
    pub async fn setup(
        config: ClusterConfig,
        factory: Arc<F>,
        worker_addrs: &[String],
        gutter: Arc<dyn Gutter>,
        runtime: Handle,
    ) -> Result<Self, SketchError> {
        let mut workers = Vec::with_capacity(worker_addrs.len());
        let mut buff_query_depth = Vec::with_capacity(worker_addrs.len());
        for (rank, addr) in worker_addrs.iter().enumerate() {
            let stream = TcpStream::connect(addr).await?;
            let link = WorkerLink::new(rank, stream, runtime.clone(), config.max_msg_size());
            let init = sketch_wire::Message::Init(sketch_wire::InitPayload {
                num_vertices: config.num_vertices,
                seed: config.seed,
                #[allow(clippy::cast_possible_truncation)]
                max_msg_size: config.max_msg_size() as u32,
            });
            link.send_only(&init)?;

            // Learn this worker's max outstanding handler depth so a
            // distributor knows how far it may pipeline ahead of it.
            let reply = link.exchange(&sketch_wire::Message::BuffQuery { slots: 0 })?;
            let depth = match reply {
                sketch_wire::Message::BuffQueryReply { slots } => slots as usize,
                other => {
                    return Err(SketchError::UnexpectedTag {
                        tag: other.tag().as_u8(),
                        node_idx: 0,
                    })
                }
            };
            buff_query_depth.push(depth);

            workers.push(Arc::new(link));
            tracing::info!(rank, addr, depth, "worker connected");
        }

        let distributor_status = workers
            .iter()
            .map(|_| Arc::new(Mutex::new(DistributorStatus::Paused)))
            .collect();

        Ok(Self {
            config,
            factory,
            gutter,
            workers,
            shutdown: Arc::new(AtomicBool::new(false)),
            pause: Arc::new(PauseBarrier::default()),
            distributor_status,
            updates_processed: Arc::new(AtomicU64::new(0)),
            last_partition: Mutex::new(None),
            rounds_to_distribute: usize::MAX,
            resident: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
            buff_query_depth,
        })
    }

    /// This worker's negotiated `BUFF_QUERY` depth, or the config's
    /// `max_outstanding_deltas` if `setup` has not run yet (never true
    /// outside tests that build a `Cluster` by hand).
    pub(crate) fn outstanding_depth(&self, rank: usize) -> usize {
        self.buff_query_depth
            .get(rank)
            .copied()
            .unwrap_or(self.config.max_outstanding_deltas)
    }

    /// Apply a worker's delta reply to the coordinator's resident-image
    /// cache. Called by `WorkDistributor::flush`/`receive_one`.
    pub(crate) fn apply_deltas(&self, deltas: Vec<sketch_core::Delta>) {
        let mut resident = self
            .resident
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for delta in deltas {
            resident.insert(delta.node_idx, delta.image);
        }
    }

    /// Override the default `rounds_to_distribute` (unbounded), per
    /// REDESIGN FLAGS' guidance that a caller may want to cap how many
    /// Borůvka rounds one query is allowed to run.
    pub fn with_rounds_to_distribute(mut self, rounds: usize) -> Self {
        self.rounds_to_distribute = rounds;
        self
    }

    /// Number of workers in this cluster.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// This cluster's configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Total edge updates ingested so far.
    pub fn updates_processed(&self) -> u64 {
        self.updates_processed.load(Ordering::Relaxed)
    }

    pub(crate) fn record_update(&self) {
        self.updates_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Bulk form of [`Self::record_update`], used once per flushed batch
    /// group instead of once per individual neighbor-id update.
    pub(crate) fn record_updates(&self, count: u64) {
        self.updates_processed.fetch_add(count, Ordering::Relaxed);
    }

    /// Pause every distributor before a query barrier, retrying spurious
    /// wakeups by rescanning status atomics — `pause_workers()` in
    /// `work_distributor.cpp`, line for line.
    #[instrument(skip(self))]
    pub(crate) fn pause_workers(&self) {
        {
            let mut paused = self
                .pause
                .paused
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *paused = true;
        }
        self.pause.condvar.notify_all();
        self.gutter.force_flush();

        loop {
            let guard = self
                .pause
                .paused
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let (_guard, timeout) = self
                .pause
                .condvar
                .wait_timeout(guard, Duration::from_millis(500))
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            drop(timeout);
            if self.all_distributors_paused() {
                break;
            }
        }
    }

    /// Resume every distributor after a query barrier.
    #[instrument(skip(self))]
    pub(crate) fn unpause_workers(&self) {
        let mut paused = self
            .pause
            .paused
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *paused = false;
        self.pause.condvar.notify_all();
    }

    fn all_distributors_paused(&self) -> bool {
        self.distributor_status.iter().all(|status| {
            matches!(
                *status.lock().unwrap_or_else(std::sync::PoisonError::into_inner),
                DistributorStatus::Paused
            )
        })
    }

    /// Snapshot every distributor's status for the `StatusReporter` tick.
    /// `interval_updates`/`interval` are left zeroed; `StatusReporter`
    /// overwrites them with its own tick-to-tick bookkeeping before
    /// rendering, since only it tracks the previous tick's timestamp.
    pub fn status_snapshot(&self) -> ClusterStatus {
        let distributors = self
            .distributor_status
            .iter()
            .map(|status| *status.lock().unwrap_or_else(std::sync::PoisonError::into_inner))
            .collect();
        ClusterStatus {
            distributors,
            updates_processed: self.updates_processed(),
            elapsed: self.started_at.elapsed(),
            interval_updates: 0,
            interval: Duration::ZERO,
        }
    }

    /// Stop every worker: pause distributors so nothing else is using the
    /// links, send each worker a `Stop`, and sum the `StopReply` update
    /// counts each returns. Mirrors `stop_workers()` in
    /// `work_distributor.cpp` — the step `teardown` was skipping straight
    /// past to `Shutdown`.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::Io`]/[`SketchError::Wire`] on a connection
    /// failure, and [`SketchError::UnexpectedTag`] if a worker replies with
    /// anything other than `StopReply`.
    #[instrument(skip(self))]
    pub fn stop_workers(&self) -> Result<u64, SketchError> {
        self.pause_workers();
        let mut total = 0_u64;
        for worker in &self.workers {
            let reply = worker.exchange(&sketch_wire::Message::Stop)?;
            match reply {
                sketch_wire::Message::StopReply { num_updates } => total += num_updates,
                other => {
                    return Err(SketchError::UnexpectedTag {
                        tag: other.tag().as_u8(),
                        node_idx: 0,
                    })
                }
            }
        }
        Ok(total)
    }

    /// Tear the cluster down: stop every worker, mark shutdown, wake every
    /// paused distributor, and send `Shutdown` to every worker. Mirrors
    /// `stop_workers()` + `WorkerCluster::shutdown_cluster`.
    #[instrument(skip(self))]
    pub fn teardown(&self) -> Result<(), SketchError> {
        let total = self.stop_workers()?;
        tracing::info!(total_updates = total, "workers stopped");
        self.shutdown.store(true, Ordering::SeqCst);
        self.pause.condvar.notify_all();
        for worker in &self.workers {
            worker.send_only(&sketch_wire::Message::Shutdown)?;
        }
        Ok(())
    }

    /// Whether `since_updates` (the `updates_processed` count recorded
    /// alongside the cached partition) still matches the live counter —
    /// the "reuse DSU when valid" fast path from
    /// `graph_distrib_update.cpp`'s `dsu_valid` check: no ingestion has
    /// happened since the partition was computed, so it's still correct.
    pub(crate) fn last_partition_is_fresh(&self, since_updates: u64) -> bool {
        self.updates_processed() == since_updates
    }
}
