// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `StatusReporter`: a 200ms `tokio::time::interval` tick loop writing
//! `cluster_status.txt`, shaped after `echo-sched::Scheduler`'s tick loop.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sketch_core::supernode::SupernodeFactory;
use tokio::time::interval;
use tracing::instrument;

use crate::cluster::Cluster;

const TICK: Duration = Duration::from_millis(200);

/// Periodically snapshots the cluster's distributor statuses and writes
/// them to `cluster_status.txt` via a temp-file-then-rename, so a reader
/// never observes a half-written file.
pub struct StatusReporter<F: SupernodeFactory> {
    cluster: Arc<Cluster<F>>,
    path: PathBuf,
    /// `(timestamp, updates_processed)` as of the previous tick, used to
    /// compute the interval ingest rate spec.md §4.6 requires — the
    /// cumulative rate alone can't answer "how fast is it going right now".
    last_tick: Mutex<(Instant, u64)>,
}

impl<F: SupernodeFactory> StatusReporter<F> {
    /// Write status to `dir/cluster_status.txt`.
    pub fn new(cluster: Arc<Cluster<F>>, dir: &Path) -> Self {
        let updates_processed = cluster.updates_processed();
        Self {
            cluster,
            path: dir.join("cluster_status.txt"),
            last_tick: Mutex::new((Instant::now(), updates_processed)),
        }
    }

    /// Run the tick loop until the cluster shuts down.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        let mut tick = interval(TICK);
        loop {
            tick.tick().await;
            if self
                .cluster
                .shutdown
                .load(std::sync::atomic::Ordering::SeqCst)
            {
                tracing::info!("status reporter exiting: cluster shut down");
                return;
            }
            if let Err(err) = self.write_once().await {
                tracing::warn!(%err, "failed to write cluster status");
            }
        }
    }

    async fn write_once(&self) -> std::io::Result<()> {
        let mut snapshot = self.cluster.status_snapshot();

        let now = Instant::now();
        let (interval_updates, interval) = {
            let mut last = self
                .last_tick
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let (prev_time, prev_updates) = *last;
            let interval_updates = snapshot.updates_processed.saturating_sub(prev_updates);
            let interval = now.saturating_duration_since(prev_time);
            *last = (now, snapshot.updates_processed);
            (interval_updates, interval)
        };
        snapshot.interval_updates = interval_updates;
        snapshot.interval = interval;

        let rendered = snapshot.render();
        let tmp_path = self.path.with_extension("txt.tmp");
        tokio::fs::write(&tmp_path, rendered.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}
