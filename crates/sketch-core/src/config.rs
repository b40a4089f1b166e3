// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cluster sizing: the handful of numbers every role (coordinator, worker,
//! forwarder) must agree on before a single byte crosses the wire.

/// Parameters shared by every role in a cluster, derived once at startup
/// and sent to workers in the `Init` message.
///
/// `max_msg_size` mirrors the original's
/// `(sizeof(node_id_t) + sizeof(size_t) + batch_size) * num_batches`
/// formula: the largest frame body any role will ever send or accept, used
/// both to size receive buffers up front and to reject a frame whose
/// declared length exceeds what a conforming peer could have produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Number of vertices in the graph, `n` in the supernode sizing math.
    pub num_vertices: u32,
    /// Seed shared by every supernode factory in the cluster.
    pub seed: u64,
    /// Bytes occupied by one serialized supernode image.
    pub supernode_bytes: usize,
    /// Number of batches accumulated before a distributor flushes to a
    /// worker, `num_batches` in the original (default 512).
    pub batches_per_flush: usize,
    /// Number of worker ranks in the cluster.
    pub num_workers: usize,
    /// Total update count below which a flushed batch group is applied
    /// locally (a scratch-supernode delta, no worker round trip) rather
    /// than sent over the wire, so tiny flushes don't pay a network round
    /// trip. `local_process_cutoff` in the original.
    pub local_process_cutoff: usize,
    /// Maximum `BATCH` messages a distributor may have in flight toward
    /// its worker before it must block on a `DELTA` reply, bounding
    /// per-distributor memory and honoring global invariant 4.
    pub max_outstanding_deltas: usize,
}

/// Bytes needed to hold one `(node_idx, dests_len)` batch header, ahead of
/// the destination ids themselves.
const BATCH_HEADER_BYTES: usize = std::mem::size_of::<u32>() + std::mem::size_of::<u64>();

/// Bytes needed to hold one destination id.
const DEST_ID_BYTES: usize = std::mem::size_of::<u32>();

impl ClusterConfig {
    /// The largest frame body a conforming peer will ever send: a full
    /// flush of `batches_per_flush` batches, each carrying up to
    /// `num_vertices` destination ids.
    pub fn max_msg_size(&self) -> usize {
        let per_batch = BATCH_HEADER_BYTES + self.num_vertices as usize * DEST_ID_BYTES;
        per_batch * self.batches_per_flush
    }

    /// Default `batches_per_flush`, matching the original's `num_batches`.
    pub fn default_batches_per_flush() -> usize {
        512
    }

    /// Default `local_process_cutoff`: a few thousand updates, per spec.md
    /// §4.2's "typical: a few kilos of updates".
    pub fn default_local_process_cutoff() -> usize {
        4096
    }

    /// Default `max_outstanding_deltas`, overridden per worker once
    /// `Cluster::setup`'s `BUFF_QUERY` round trip learns that worker's
    /// actual buffering depth.
    pub fn default_max_outstanding_deltas() -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_msg_size_scales_with_flush_size() {
        let cfg = ClusterConfig {
            num_vertices: 10,
            seed: 1,
            supernode_bytes: 64,
            batches_per_flush: 2,
            num_workers: 4,
            local_process_cutoff: ClusterConfig::default_local_process_cutoff(),
            max_outstanding_deltas: ClusterConfig::default_max_outstanding_deltas(),
        };
        let one_batch = BATCH_HEADER_BYTES + 10 * DEST_ID_BYTES;
        assert_eq!(cfg.max_msg_size(), one_batch * 2);
    }
}
