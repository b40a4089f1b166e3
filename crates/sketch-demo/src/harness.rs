// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! [`Harness`]: a whole cluster — one [`Cluster`] plus `num_workers`
//! real [`DistributedWorker`]s, each on its own thread and reachable only
//! over `127.0.0.1` loopback TCP — built from nothing but a vertex count
//! and a worker count. Used by the `sketch-demo` binary and by
//! `sketch-coordinator`'s integration tests so scenario tests exercise the
//! real wire protocol end to end instead of calling `Cluster` methods
//! directly against an in-process worker stand-in.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sketch_core::batch::Batch;
use sketch_core::{ClusterConfig, Gutter, NodeId};
use sketch_coordinator::{Cluster, WorkDistributor};
use sketch_fixtures::{AgmFactory, InMemoryGutter};
use sketch_wire::{FrameAccumulator, Message};
use sketch_worker::DistributedWorker;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::runtime::Handle;

/// Default helper-pool size for each demo worker; small on purpose, these
/// clusters run tiny graphs.
const DEMO_HELPER_THREADS: usize = 2;

/// A running cluster: the coordinator's [`Cluster`] plus the
/// `std::thread`s backing its workers and distributors, all reachable only
/// from this process.
pub struct Harness {
    cluster: Arc<Cluster<AgmFactory>>,
    gutter: Arc<InMemoryGutter>,
    worker_threads: Vec<std::thread::JoinHandle<()>>,
    distributor_threads: Vec<std::thread::JoinHandle<()>>,
}

impl Harness {
    /// Bind `num_workers` loopback listeners, spawn one [`DistributedWorker`]
    /// dispatcher thread per listener, then [`Cluster::setup`] against their
    /// addresses and spawn one [`WorkDistributor`] thread per worker.
    ///
    /// # Errors
    ///
    /// Returns an error if a loopback listener cannot be bound or a worker
    /// connection cannot be established.
    pub async fn spawn(num_vertices: u32, num_workers: usize, runtime: Handle) -> Result<Self> {
        let seed = 0x5EED;
        let mut addrs = Vec::with_capacity(num_workers);
        let mut worker_threads = Vec::with_capacity(num_workers);

        for _ in 0..num_workers {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .context("binding a loopback listener for a demo worker")?;
            addrs.push(listener.local_addr()?.to_string());

            let thread_runtime = runtime.clone();
            worker_threads.push(std::thread::spawn(move || {
                if let Err(err) = run_one_worker(listener, &thread_runtime) {
                    tracing::error!(%err, "demo worker exited with an error");
                }
            }));
        }

        let config = ClusterConfig {
            num_vertices,
            seed,
            supernode_bytes: 0,
            batches_per_flush: ClusterConfig::default_batches_per_flush(),
            num_workers,
            local_process_cutoff: ClusterConfig::default_local_process_cutoff(),
            max_outstanding_deltas: ClusterConfig::default_max_outstanding_deltas(),
        };
        let factory = Arc::new(AgmFactory::new(num_vertices, seed));
        let gutter = Arc::new(InMemoryGutter::new(num_workers));

        let cluster = Cluster::setup(
            config,
            factory,
            &addrs,
            Arc::clone(&gutter) as Arc<dyn Gutter>,
            runtime.clone(),
        )
        .await
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
        let cluster = Arc::new(cluster);

        let mut distributor_threads = Vec::with_capacity(num_workers);
        for worker_id in 0..cluster.num_workers() {
            let cluster = Arc::clone(&cluster);
            distributor_threads.push(std::thread::spawn(move || {
                WorkDistributor::new(&*cluster, worker_id).run(&*cluster);
            }));
        }

        Ok(Self {
            cluster,
            gutter,
            worker_threads,
            distributor_threads,
        })
    }

    /// This harness's cluster, for running `spanning_forest_query` or
    /// inspecting status.
    pub fn cluster(&self) -> &Arc<Cluster<AgmFactory>> {
        &self.cluster
    }

    /// Route one edge update into both endpoints' worker queues, mirroring
    /// `sketchd-coordinator`'s own `route_edge`.
    pub fn insert_edge(&self, a: NodeId, b: NodeId) {
        let num_workers = self.cluster.num_workers().max(1);
        if let Some(batch) = Batch::new(a, vec![b]) {
            self.gutter.push(a as usize % num_workers, vec![batch]);
        }
        if let Some(batch) = Batch::new(b, vec![a]) {
            self.gutter.push(b as usize % num_workers, vec![batch]);
        }
    }

    /// Tear the cluster down: `Cluster::teardown` plus joining every
    /// distributor and worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if `Cluster::teardown` fails to notify a worker.
    pub fn shutdown(self) -> Result<()> {
        self.cluster.teardown().map_err(|err| anyhow::anyhow!(err.to_string()))?;
        for handle in self.distributor_threads {
            if handle.join().is_err() {
                tracing::error!("a demo distributor thread panicked during shutdown");
            }
        }
        for handle in self.worker_threads {
            if handle.join().is_err() {
                tracing::error!("a demo worker thread panicked during shutdown");
            }
        }
        Ok(())
    }
}

/// Accept the coordinator's single connection, read its `Init`, and run
/// the dispatcher loop until `Shutdown` — the same sequence
/// `sketchd-worker`'s `main` runs, minus the CLI/status-reporter surface,
/// since a demo worker needs neither.
fn run_one_worker(listener: TcpListener, runtime: &Handle) -> Result<()> {
    let (mut stream, peer) = runtime.block_on(listener.accept())?;
    tracing::debug!(%peer, "demo worker accepted a connection");

    let init = runtime.block_on(async {
        let mut acc = FrameAccumulator::new();
        let mut chunk = [0_u8; 256];
        loop {
            if let Some(msg) = acc
                .next_message(usize::MAX)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?
            {
                return Ok::<Message, anyhow::Error>(msg);
            }
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                bail!("connection closed before Init arrived");
            }
            acc.feed(&chunk[..n]);
        }
    })?;
    let Message::Init(payload) = init else {
        bail!("expected Init as the first message, got tag {}", init.tag().as_u8());
    };

    let factory = Arc::new(AgmFactory::new(payload.num_vertices, payload.seed));
    let worker = DistributedWorker::new(factory, DEMO_HELPER_THREADS)
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    worker
        .run(stream, runtime, payload.max_msg_size as usize)
        .map_err(|err| anyhow::anyhow!(err.to_string()))
}
