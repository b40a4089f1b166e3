// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The Distributed Worker role: a single-threaded dispatcher driving a
//! `rayon` helper pool, per spec.md §4.3. One worker process serves exactly
//! one coordinator connection (or a forwarder standing in for one), dialed
//! by `Cluster::setup` and handed an `Init` before any `Batch`/`Query`
//! traffic arrives.

pub mod cli;
pub mod query;
pub mod status;
pub mod worker;

pub use status::WorkerStatusReporter;
pub use worker::DistributedWorker;
