// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The `SketchSupernode` contract: the per-vertex linear sketch primitive
//! that workers and the coordinator apply updates to and sample from.
//!
//! No implementation of this trait lives in this crate. The real AGM/L0
//! sampling sketch is externalized to `sketch-fixtures`, which the
//! coordinator, worker and forwarder crates never depend on directly — they
//! only ever move opaque serialized images (see [`crate::delta::Delta`]) and
//! hand them to whichever `SketchSupernode` the embedding binary links in.

use crate::error::SketchError;
use crate::query::SampleResult;
use crate::NodeId;

/// A per-vertex linear sketch that can absorb neighbor-id updates and later
/// be sampled for a surviving edge to another connected component.
///
/// Implementations are expected to be resumable: `apply`, `serialize` and
/// `sample` may be called in any interleaving across the supernode's
/// lifetime, and `deserialize` must exactly recover the state a `serialize`
/// call captured (the wire transport between worker and coordinator depends
/// on this round-trip being lossless).
pub trait SketchSupernode: Send {
    /// The vertex this supernode tracks.
    fn node_idx(&self) -> NodeId;

    /// XOR an incoming neighbor id into every sketch column touched by it.
    fn apply(&mut self, neighbor: NodeId);

    /// Serialize the full sketch state to its wire image.
    ///
    /// The returned buffer's length must equal
    /// [`crate::config::ClusterConfig::supernode_bytes`] for the
    /// configuration this supernode was constructed with; the wire and
    /// cluster-sizing layers both depend on that invariant.
    fn serialize(&self) -> Vec<u8>;

    /// Replace this supernode's state with the image `serialize` produced.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::Wire`] if `image` is not a well-formed
    /// serialization for this supernode's configuration.
    fn deserialize(&mut self, image: &[u8]) -> Result<(), SketchError>;

    /// Merge another supernode's columns into this one (XOR of the two
    /// sketches), used when two components' resident supernodes combine
    /// during Borůvka contraction.
    fn merge(&mut self, other: &Self)
    where
        Self: Sized;

    /// Draw one sample from an as-yet-unconsumed sketch column, returning
    /// the edge it resolves to, or [`crate::query::SampleTag::Zero`] once
    /// every inserted id has canceled out.
    fn sample(&mut self) -> SampleResult;
}

/// Constructs fresh, empty [`SketchSupernode`]s for a given vertex,
/// parameterized by the cluster's `(n, seed)` the way `Supernode::configure`
/// is in the original implementation.
pub trait SupernodeFactory: Send + Sync {
    /// The concrete supernode type this factory builds.
    type Supernode: SketchSupernode;

    /// Build an empty supernode for `node_idx`.
    fn create(&self, node_idx: NodeId) -> Self::Supernode;

    /// Number of bytes a serialized supernode image occupies under this
    /// factory's configuration. Must match every `Self::Supernode::serialize`
    /// call's output length.
    fn image_len(&self) -> usize;
}
