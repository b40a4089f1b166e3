// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared data model for the distributed sketch-update engine: the
//! [`Batch`]/[`Delta`] wire-independent types, the `SketchSupernode`/`Gutter`
//! contracts external collaborators must satisfy, the cluster sizing math
//! (`ClusterConfig::max_msg_size`), and the error taxonomy shared by the
//! coordinator, worker and forwarder crates.

pub mod batch;
pub mod config;
pub mod delta;
pub mod error;
pub mod gutter;
pub mod query;
pub mod ring;
pub mod status;
pub mod supernode;

pub use batch::Batch;
pub use config::ClusterConfig;
pub use delta::Delta;
pub use error::{FirstError, SketchError};
pub use gutter::Gutter;
pub use query::{EdgeRepr, SampleResult, SampleTag};
pub use ring::SendRing;
pub use status::DistributorStatus;
pub use supernode::{SketchSupernode, SupernodeFactory};

/// Vertex identifier, `node_id_t` in the original implementation.
pub type NodeId = u32;
