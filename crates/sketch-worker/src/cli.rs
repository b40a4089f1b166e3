// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Command-line surface for `sketchd-worker`. Unlike `sketchd-coordinator`,
//! the original gives workers no CLI arguments of their own (they are
//! spawned by the MPI launcher); the listen address and helper-pool size
//! are this crate's own externally-observable surface, not a distillation
//! of an original positional-argument list.

use std::path::PathBuf;

use clap::Parser;

/// `sketchd-worker --listen <host:port> [--helper-threads N] [--status-dir DIR]`
#[derive(Debug, Parser)]
#[command(name = "sketchd-worker", version, about)]
pub struct WorkerArgs {
    /// Address to accept the coordinator's (or a forwarder's) connection on.
    #[arg(long)]
    pub listen: String,

    /// Helper-pool size; defaults to the host's available parallelism,
    /// matching `std::thread::hardware_concurrency()` in the original.
    #[arg(long)]
    pub helper_threads: Option<usize>,

    /// Directory `worker_status.txt` is written to, when `--report-status`
    /// is set.
    #[arg(long, default_value = ".")]
    pub status_dir: PathBuf,

    /// Run the auxiliary status-reporting tick loop (spec.md §6, optional
    /// per-worker status file).
    #[arg(long, default_value_t = false)]
    pub report_status: bool,
}

impl WorkerArgs {
    /// Resolve `helper_threads`, falling back to the host's available
    /// parallelism (or 1 if that cannot be determined).
    pub fn resolved_helper_threads(&self) -> usize {
        self.helper_threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_helper_threads_is_used_as_is() {
        let args = WorkerArgs {
            listen: "127.0.0.1:0".to_string(),
            helper_threads: Some(4),
            status_dir: PathBuf::from("."),
            report_status: false,
        };
        assert_eq!(args.resolved_helper_threads(), 4);
    }
}
