// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Batch: a vertex paired with the neighbor ids queued against it by the
//! guttering layer.

use crate::NodeId;

/// One flushed batch: `(vertex id, ordered sequence of neighbor ids)`.
///
/// Empty batches (`dests.is_empty()`) are never produced by a conforming
/// gutter and are dropped by [`crate::gutter::Gutter`] implementations before
/// they reach a `WorkDistributor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// The vertex this batch updates.
    pub node_idx: NodeId,
    /// Neighbor ids to apply, in FIFO order.
    pub dests: Vec<NodeId>,
}

impl Batch {
    /// Construct a batch, returning `None` for an empty destination list.
    pub fn new(node_idx: NodeId, dests: Vec<NodeId>) -> Option<Self> {
        if dests.is_empty() {
            return None;
        }
        Some(Self { node_idx, dests })
    }

    /// Number of neighbor ids carried by this batch.
    pub fn len(&self) -> usize {
        self.dests.len()
    }

    /// Whether this batch carries any updates.
    pub fn is_empty(&self) -> bool {
        self.dests.is_empty()
    }
}

/// A group of batches pulled from the gutter in one `get_data` call.
pub type BatchGroup = Vec<Batch>;

/// Total number of individual neighbor-id updates across a batch group.
pub fn total_updates(group: &[Batch]) -> usize {
    group.iter().map(Batch::len).sum()
}
