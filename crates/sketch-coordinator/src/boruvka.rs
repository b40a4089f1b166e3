// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The query barrier and distributed Borůvka emulation: `flush` → `pause`
//! → `boruvka_emulation` → (if `continue_stream`) `unpause`, per spec.md
//! §4.5 and `graph_distrib_update.cpp::spanning_forest_query`.
//!
//! `QueryTiming` and the "reuse DSU when valid" fast path are supplemented
//! from `original_source/experiment/cluster_query_expr.cpp`, which the
//! spec.md distillation dropped: ambient latency instrumentation and a
//! caching fast path, not new externally observable behavior.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sketch_core::query::SampleTag;
use sketch_core::supernode::{SketchSupernode, SupernodeFactory};
use sketch_core::{NodeId, SketchError};
use sketch_wire::message::{decode_edge_vec, decode_sample_tag, QueryRecord, QueryReplyRecord};
use sketch_wire::Message;
use tracing::instrument;

use crate::cluster::Cluster;

/// The connected-components partition a `spanning_forest_query` resolves
/// to: each vertex mapped to its component representative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// `parent[v]` is `v`'s component representative.
    pub parent: Vec<NodeId>,
}

impl Partition {
    /// Whether `a` and `b` are in the same component.
    pub fn connected(&self, a: NodeId, b: NodeId) -> bool {
        self.parent[a as usize] == self.parent[b as usize]
    }

    /// Group every vertex by its representative.
    pub fn components(&self) -> HashMap<NodeId, Vec<NodeId>> {
        let mut groups: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (v, &rep) in self.parent.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            groups.entry(rep).or_default().push(v as NodeId);
        }
        groups
    }
}

/// Latency instrumentation for one query, supplemented from
/// `cluster_query_expr.cpp`'s `flush_start`/`flush_end`/`cc_alg_start`/
/// `cc_alg_end` fields.
#[derive(Debug, Clone, Copy)]
pub struct QueryTiming {
    /// Time spent in `pause_workers` (flush + barrier wait).
    pub flush: Duration,
    /// Time spent running `boruvka_emulation` itself.
    pub cc_alg: Duration,
    /// Whether this result came from the `last_partition_is_fresh` cache
    /// instead of a fresh barrier + contraction.
    pub cache_hit: bool,
}

struct Dsu {
    parent: Vec<NodeId>,
    rank: Vec<u8>,
}

impl Dsu {
    fn new(n: u32) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n as usize],
        }
    }

    fn find(&mut self, x: NodeId) -> NodeId {
        if self.parent[x as usize] != x {
            let root = self.find(self.parent[x as usize]);
            self.parent[x as usize] = root;
        }
        self.parent[x as usize]
    }

    fn union(&mut self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return None;
        }
        let (keep, drop) = if self.rank[ra as usize] < self.rank[rb as usize] {
            (rb, ra)
        } else {
            (ra, rb)
        };
        self.parent[drop as usize] = keep;
        if self.rank[keep as usize] == self.rank[drop as usize] {
            self.rank[keep as usize] += 1;
        }
        Some(keep)
    }
}

/// Run the query barrier: flush every distributor, pause the cluster,
/// compute the spanning-forest partition, and (if `continue_stream`)
/// resume ingestion. Returns the partition and this call's timing.
///
/// # Errors
///
/// Returns [`SketchError`] if a worker round trip fails mid-contraction.
#[instrument(skip(cluster))]
pub fn spanning_forest_query<F: SupernodeFactory>(
    cluster: &Cluster<F>,
    continue_stream: bool,
) -> Result<(Partition, QueryTiming), SketchError> {
    {
        let cached = cluster
            .last_partition
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some((partition, timing, since_updates)) = cached.as_ref() {
            if continue_stream && cluster.last_partition_is_fresh(*since_updates) {
                let mut fresh_timing = *timing;
                fresh_timing.cache_hit = true;
                return Ok((partition.clone(), fresh_timing));
            }
        }
    }

    let flush_start = Instant::now();
    cluster.pause_workers();
    let flush = flush_start.elapsed();

    let cc_start = Instant::now();
    let partition = boruvka_emulation(cluster)?;
    let cc_alg = cc_start.elapsed();

    let timing = QueryTiming {
        flush,
        cc_alg,
        cache_hit: false,
    };

    {
        let mut cached = cluster
            .last_partition
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *cached = Some((partition.clone(), timing, cluster.updates_processed()));
    }

    if continue_stream {
        cluster.unpause_workers();
    }

    Ok((partition, timing))
}

/// Contract components via repeated rounds of sampling every active
/// representative's merged sketch, each round sending the merged bytes to
/// a worker purely to run the sample-extraction arithmetic (the CPU-bound
/// work spec.md offloads to worker helper threads) — no ownership of the
/// vertex is implied by which worker samples it.
fn boruvka_emulation<F: SupernodeFactory>(cluster: &Cluster<F>) -> Result<Partition, SketchError> {
    let num_vertices = cluster.config().num_vertices;
    let mut dsu = Dsu::new(num_vertices);

    let resident = cluster
        .resident
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();

    let mut supernodes: HashMap<NodeId, F::Supernode> = HashMap::new();
    for (node_idx, image) in &resident {
        let mut node = cluster.factory.create(*node_idx);
        node.deserialize(image)?;
        supernodes.insert(*node_idx, node);
    }

    let mut frozen: std::collections::HashSet<NodeId> = std::collections::HashSet::new();
    let num_workers = cluster.num_workers().max(1);
    let mut rounds = 0_usize;

    loop {
        if rounds >= cluster.rounds_to_distribute {
            break;
        }
        let active: Vec<NodeId> = supernodes.keys().copied().filter(|r| !frozen.contains(r)).collect();
        if active.len() <= 1 {
            break;
        }

        let mut per_worker: Vec<Vec<NodeId>> = vec![Vec::new(); num_workers];
        for (i, rep) in active.iter().enumerate() {
            per_worker[i % num_workers].push(*rep);
        }

        let mut results: HashMap<NodeId, QueryReplyRecord> = HashMap::new();
        for (worker_id, reps) in per_worker.into_iter().enumerate() {
            if reps.is_empty() {
                continue;
            }
            #[allow(clippy::cast_possible_truncation)]
            let count = reps.len() as u32;
            let records = reps
                .iter()
                .map(|rep| QueryRecord {
                    node_idx: *rep,
                    image: supernodes[rep].serialize(),
                })
                .collect();
            let query = Message::Query {
                records,
                num_queries_in_round: Some(count),
            };
            let reply = cluster.workers[worker_id].exchange(&query)?;
            let Message::QueryReply(records) = reply else {
                return Err(SketchError::UnexpectedTag {
                    tag: reply.tag().as_u8(),
                    #[allow(clippy::cast_possible_truncation)]
                    node_idx: worker_id as u32,
                });
            };
            for (rep, record) in reps.into_iter().zip(records) {
                results.insert(rep, record);
            }
        }

        let mut made_progress = false;
        for (rep, record) in results {
            // Persist the worker's post-sample cursor advance before acting
            // on the tag, so an ambiguous bucket doesn't get re-sampled
            // next round regardless of whether this round made progress.
            if let Some(node) = supernodes.get_mut(&rep) {
                if let Err(err) = node.deserialize(&record.image) {
                    tracing::warn!(rep, %err, "failed to persist post-sample image");
                }
            }

            let tag = decode_sample_tag(record.tag);
            match tag {
                SampleTag::Zero => {
                    frozen.insert(rep);
                }
                SampleTag::Fail => {}
                SampleTag::Good => {
                    let (a, b) = decode_edge_vec(record.edge_vec);
                    let ra = dsu.find(a);
                    let rb = dsu.find(b);
                    if ra == rb {
                        continue;
                    }
                    if let Some(keep) = dsu.union(ra, rb) {
                        let drop = if keep == ra { rb } else { ra };
                        if let (Some(mut keep_node), Some(drop_node)) =
                            (supernodes.remove(&keep), supernodes.remove(&drop))
                        {
                            keep_node.merge(&drop_node);
                            supernodes.insert(keep, keep_node);
                        }
                        frozen.remove(&keep);
                        made_progress = true;
                    }
                }
            }
        }

        rounds += 1;
        if !made_progress && frozen.len() + 1 >= supernodes.len() {
            break;
        }
    }

    let mut parent = Vec::with_capacity(num_vertices as usize);
    for v in 0..num_vertices {
        parent.push(dsu.find(v));
    }
    Ok(Partition { parent })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn partition_groups_connected_vertices() {
        let partition = Partition {
            parent: vec![0, 0, 2, 0],
        };
        assert!(partition.connected(0, 1));
        assert!(partition.connected(0, 3));
        assert!(!partition.connected(0, 2));
        assert_eq!(partition.components().len(), 2);
    }

    #[test]
    fn edge_vec_round_trips() {
        let (src, dst) = decode_edge_vec((7_u64 << 32) | 3);
        assert_eq!((src, dst), (7, 3));
    }
}
