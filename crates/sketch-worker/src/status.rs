// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `WorkerStatusReporter`: the per-worker counterpart to
//! `sketch_coordinator::status::StatusReporter`, writing `worker_status.txt`
//! on the same 200ms/temp-file/rename cadence. Optional per spec.md §6
//! ("auxiliary status thread"), gated behind a CLI flag in `sketchd-worker`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::instrument;

const TICK: Duration = Duration::from_millis(200);

/// Periodically snapshots a worker's `updates_processed` counter and writes
/// it to `dir/worker_status.txt` via a temp-file-then-rename.
pub struct WorkerStatusReporter {
    updates_processed: Arc<AtomicU64>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    path: PathBuf,
}

impl WorkerStatusReporter {
    /// Write status to `dir/worker_status.txt`, reading `updates_processed`
    /// from the same counter [`crate::worker::DistributedWorker`] updates,
    /// and exiting its tick loop once `shutdown` is observed set.
    pub fn new(updates_processed: Arc<AtomicU64>, shutdown: Arc<std::sync::atomic::AtomicBool>, dir: &Path) -> Self {
        Self {
            updates_processed,
            shutdown,
            path: dir.join("worker_status.txt"),
        }
    }

    /// Run the tick loop until `shutdown` is observed set.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        let mut tick = interval(TICK);
        loop {
            tick.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::info!("worker status reporter exiting: worker shut down");
                return;
            }
            if let Err(err) = self.write_once().await {
                tracing::warn!(%err, "failed to write worker status");
            }
        }
    }

    async fn write_once(&self) -> std::io::Result<()> {
        let rendered = format!("updates_processed={}\n", self.updates_processed.load(Ordering::Relaxed));
        let tmp_path = self.path.with_extension("txt.tmp");
        tokio::fs::write(&tmp_path, rendered.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn write_once_renders_updates_processed() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = WorkerStatusReporter::new(
            Arc::new(AtomicU64::new(7)),
            Arc::new(AtomicBool::new(false)),
            dir.path(),
        );
        reporter.write_once().await.unwrap();
        let contents = tokio::fs::read_to_string(dir.path().join("worker_status.txt"))
            .await
            .unwrap();
        assert_eq!(contents, "updates_processed=7\n");
    }
}
