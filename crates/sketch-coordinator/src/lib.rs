// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Coordinator-side roles of the distributed sketch-update engine: the
//! [`cluster::Cluster`] owning object, the per-worker
//! [`distributor::WorkDistributor`] loop, the
//! [`boruvka::spanning_forest_query`] barrier, and the
//! [`status::StatusReporter`] tick loop.

pub mod boruvka;
pub mod cli;
pub mod cluster;
pub mod distributor;
pub mod status;
pub mod worker_link;

pub use boruvka::{spanning_forest_query, Partition, QueryTiming};
pub use cluster::Cluster;
pub use distributor::WorkDistributor;
pub use status::StatusReporter;
