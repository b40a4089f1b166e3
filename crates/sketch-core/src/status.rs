// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Status snapshot types written by the `StatusReporter` tick loop and read
//! by anything that wants a point-in-time view of the cluster (a CLI, a
//! health check, the demo binary).

use std::time::Duration;

/// Lifecycle state of one `WorkDistributor`, matching spec.md §4.2's
/// `{QUEUE_WAIT, DISTRIB_PROCESSING, APPLY_DELTA, PAUSED}` atomic status
/// field exactly — no collapsed "running" catch-all, so the Status
/// Reporter can actually tell a distributor blocked on its gutter apart
/// from one blocked on a `DELTA` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributorStatus {
    /// Blocked dequeuing the next batch group from the gutter.
    QueueWait,
    /// Sending a `BATCH` or awaiting the `DELTA` it's pipelined behind.
    DistribProcessing,
    /// Applying a received delta (or a locally-generated one) into the
    /// resident supernode cache.
    ApplyDelta,
    /// Paused at a query barrier, waiting to be resumed.
    Paused,
}

impl DistributorStatus {
    /// Single-character tag written to the status file, matching the
    /// original's terse per-distributor status line.
    pub fn tag(self) -> char {
        match self {
            Self::QueueWait => 'Q',
            Self::DistribProcessing => 'D',
            Self::ApplyDelta => 'A',
            Self::Paused => 'P',
        }
    }
}

/// A point-in-time snapshot of every distributor's status, as written by
/// `StatusReporter` on its 200ms tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterStatus {
    /// Per-distributor status, indexed by worker rank.
    pub distributors: Vec<DistributorStatus>,
    /// Total edge updates ingested by the coordinator so far.
    pub updates_processed: u64,
    /// Time since the cluster started, for the cumulative ingest rate.
    pub elapsed: Duration,
    /// Updates ingested since the previous tick, for the interval rate.
    pub interval_updates: u64,
    /// Time since the previous tick.
    pub interval: Duration,
}

impl ClusterStatus {
    /// Render the one-line-per-distributor text format `StatusReporter`
    /// writes to `cluster_status.txt`, plus the cumulative and interval
    /// ingest rates spec.md §4.6 requires: updates ÷ seconds ÷ 2, since one
    /// stream update is two sketch updates (both endpoints are touched).
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (idx, status) in self.distributors.iter().enumerate() {
            out.push_str(&format!("worker[{idx}]={}\n", status.tag()));
        }
        out.push_str(&format!("updates_processed={}\n", self.updates_processed));
        out.push_str(&format!(
            "cumulative_rate={:.2}\n",
            ingest_rate(self.updates_processed, self.elapsed)
        ));
        out.push_str(&format!(
            "interval_rate={:.2}\n",
            ingest_rate(self.interval_updates, self.interval)
        ));
        out
    }
}

/// `updates ÷ seconds ÷ 2`. Returns `0.0` rather than dividing by zero
/// when `elapsed` hasn't advanced (the cluster's very first tick).
fn ingest_rate(updates: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let updates = updates as f64;
    (updates / secs) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_every_distributor() {
        let status = ClusterStatus {
            distributors: vec![DistributorStatus::DistribProcessing, DistributorStatus::Paused],
            updates_processed: 42,
            elapsed: Duration::from_secs(1),
            interval_updates: 42,
            interval: Duration::from_secs(1),
        };
        let rendered = status.render();
        assert!(rendered.contains("worker[0]=D"));
        assert!(rendered.contains("worker[1]=P"));
        assert!(rendered.contains("updates_processed=42"));
        assert!(rendered.contains("cumulative_rate=21.00"));
        assert!(rendered.contains("interval_rate=21.00"));
    }

    #[test]
    fn ingest_rate_is_zero_on_the_first_tick() {
        assert_eq!(ingest_rate(100, Duration::ZERO), 0.0);
    }
}
