// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Command-line surface for `sketchd-forwarder`. Like `sketchd-worker`, the
//! original gives forwarders no CLI arguments of their own (the MPI
//! launcher assigns ranks); the two addresses below are this crate's own
//! externally-observable surface.

use clap::Parser;

/// `sketchd-forwarder --listen <addr_for_coordinator> --worker <downstream_worker_addr>`
#[derive(Debug, Parser)]
#[command(name = "sketchd-forwarder", version, about)]
pub struct ForwarderArgs {
    /// Address to accept the coordinator's connection on.
    #[arg(long)]
    pub listen: String,

    /// Address of the worker this forwarder proxies to.
    #[arg(long)]
    pub worker: String,

    /// Ceiling on a single frame's declared length, matching the
    /// coordinator's `max_msg_size` (see `sketch_core::config::ClusterConfig`).
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    pub max_msg_size: usize,
}
