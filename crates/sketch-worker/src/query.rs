// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Sample-extraction side of the worker: turns one `QueryRecord` (a
//! representative's serialized sketch image) into a `QueryReplyRecord`,
//! the CPU-bound arithmetic spec.md §4.5 offloads to helper threads.

use sketch_core::query::SampleResult;
use sketch_core::supernode::SupernodeFactory;
use sketch_wire::message::{encode_sample_result, QueryRecord, QueryReplyRecord};

/// Deserialize `record.image` into a scratch supernode, sample it, and
/// return both the result and the post-sample image so the coordinator can
/// persist the cursor advance into its resident copy — without this, a
/// representative with an ambiguous bucket would re-sample the same bucket
/// every round and never resolve.
///
/// A deserialize failure (a malformed image, which a conforming coordinator
/// never sends) is reported as [`sketch_core::query::SampleTag::Fail`]
/// rather than propagated, since one corrupt record in a round must not
/// abort every other representative's sample; its image is echoed back
/// unchanged.
pub fn sample_one<F: SupernodeFactory>(factory: &F, record: &QueryRecord) -> QueryReplyRecord {
    let mut node = factory.create(record.node_idx);
    let result = match node.deserialize(&record.image) {
        Ok(()) => node.sample(),
        Err(err) => {
            tracing::warn!(node_idx = record.node_idx, %err, "failed to deserialize query image");
            return encode_sample_result(SampleResult::fail(record.node_idx), record.image.clone());
        }
    };
    encode_sample_result(result, node.serialize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sketch_core::supernode::SketchSupernode;
    use sketch_fixtures::AgmFactory;

    #[test]
    fn sampling_an_empty_supernode_yields_zero() {
        let factory = AgmFactory::new(16, 1);
        let mut node = factory.create(3);
        let image = node.serialize();
        let record = QueryRecord { node_idx: 3, image };
        let reply = sample_one(&factory, &record);
        assert_eq!(reply.tag, 1);
    }

    #[test]
    fn sampling_a_single_update_recovers_the_edge() {
        let factory = AgmFactory::new(16, 1);
        let mut node = factory.create(3);
        node.apply(9);
        let image = node.serialize();
        let record = QueryRecord { node_idx: 3, image };
        let reply = sample_one(&factory, &record);
        assert_eq!(reply.tag, 0);
        let (a, b) = sketch_wire::message::decode_edge_vec(reply.edge_vec);
        assert_eq!((a.min(b), a.max(b)), (3, 9));
    }

    #[test]
    fn malformed_image_reports_failure_not_a_panic() {
        let factory = AgmFactory::new(16, 1);
        let record = QueryRecord {
            node_idx: 3,
            image: vec![0xFF; 1],
        };
        let reply = sample_one(&factory, &record);
        assert_eq!(reply.tag, 2);
    }
}
