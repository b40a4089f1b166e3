// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! A reference implementation of [`sketch_core::SketchSupernode`]: a single
//! leveled AGM/L0-sampling sketch, simplified for fixture use (wrapping
//! `i64` arithmetic in place of a proper prime field, which is more than
//! enough entropy for the vertex counts this repository's tests and benches
//! exercise, but is not the cryptographically-sound construction a
//! production sketch would want).
//!
//! Each vertex's sketch holds `levels` independent buckets. An inserted edge
//! is placed into bucket `0..=r`, where `r` is the number of trailing zero
//! bits of a hash of the edge id — a standard geometric sub-sampling trick
//! that gives bucket `l` roughly `1 / 2^l` of the edges ever inserted.
//! Summing two vertices' sketches (bucket-wise) cancels every edge internal
//! to their union, because each edge is inserted into both its endpoints
//! with opposite sign; only edges crossing the union survive, which is
//! exactly the operation Borůvka contraction needs.

use sketch_core::query::{EdgeRepr, SampleResult};
use sketch_core::supernode::{SketchSupernode, SupernodeFactory};
use sketch_core::NodeId;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    sum: i64,
    checksum: i64,
}

impl Bucket {
    fn insert(&mut self, edge_id: u64, positive: bool) {
        #[allow(clippy::cast_possible_wrap)]
        let id = edge_id as i64;
        #[allow(clippy::cast_possible_wrap)]
        let h = hash64(edge_id) as i64;
        if positive {
            self.sum = self.sum.wrapping_add(id);
            self.checksum = self.checksum.wrapping_add(h);
        } else {
            self.sum = self.sum.wrapping_sub(id);
            self.checksum = self.checksum.wrapping_sub(h);
        }
    }

    fn merge(&mut self, other: Self) {
        self.sum = self.sum.wrapping_add(other.sum);
        self.checksum = self.checksum.wrapping_add(other.checksum);
    }

    fn is_empty(self) -> bool {
        self.sum == 0 && self.checksum == 0
    }

    /// `Some(edge_id)` if this bucket looks like exactly one surviving
    /// edge, `None` if it's ambiguous (more than one survivor, with
    /// overwhelming probability).
    fn singleton(self) -> Option<u64> {
        let magnitude = self.sum.unsigned_abs();
        #[allow(clippy::cast_possible_wrap)]
        let expected = hash64(magnitude) as i64;
        let expected = if self.sum > 0 { expected } else { -expected };
        (self.checksum == expected).then_some(magnitude)
    }
}

/// SplitMix64, used as this fixture's hash: fast, well-mixed, and
/// dependency-free.
fn hash64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

fn edge_id(a: NodeId, b: NodeId) -> u64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    (u64::from(hi) << 32) | u64::from(lo)
}

fn unpack_edge(id: u64) -> EdgeRepr {
    #[allow(clippy::cast_possible_truncation)]
    let lo = id as u32;
    #[allow(clippy::cast_possible_truncation)]
    let hi = (id >> 32) as u32;
    EdgeRepr::new(lo, hi)
}

fn level_for(edge: u64, seed: u64, max_level: usize) -> usize {
    let r = hash64(edge ^ seed).trailing_zeros() as usize;
    r.min(max_level)
}

/// A single-vertex (or, post-merge, single-component) leveled AGM sketch.
#[derive(Debug, Clone)]
pub struct AgmSupernode {
    node_idx: NodeId,
    seed: u64,
    levels: Vec<Bucket>,
    /// Index of the next level `sample` will consume.
    cursor: usize,
}

impl AgmSupernode {
    fn new(node_idx: NodeId, seed: u64, num_levels: usize) -> Self {
        Self {
            node_idx,
            seed,
            levels: vec![Bucket::default(); num_levels.max(1)],
            cursor: 0,
        }
    }
}

impl SketchSupernode for AgmSupernode {
    fn node_idx(&self) -> NodeId {
        self.node_idx
    }

    fn apply(&mut self, neighbor: NodeId) {
        let id = edge_id(self.node_idx, neighbor);
        let positive = self.node_idx <= neighbor;
        let top = level_for(id, self.seed, self.levels.len() - 1);
        for bucket in &mut self.levels[..=top] {
            bucket.insert(id, positive);
        }
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.levels.len() * 16);
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(self.cursor as u32).to_be_bytes());
        for bucket in &self.levels {
            out.extend_from_slice(&bucket.sum.to_be_bytes());
            out.extend_from_slice(&bucket.checksum.to_be_bytes());
        }
        out
    }

    fn deserialize(&mut self, image: &[u8]) -> Result<(), sketch_core::SketchError> {
        let expected = 4 + self.levels.len() * 16;
        if image.len() != expected {
            return Err(sketch_core::SketchError::Wire(format!(
                "agm supernode image: expected {expected} bytes, got {}",
                image.len()
            )));
        }
        let mut cursor_bytes = [0_u8; 4];
        cursor_bytes.copy_from_slice(&image[0..4]);
        self.cursor = u32::from_be_bytes(cursor_bytes) as usize;
        for (i, bucket) in self.levels.iter_mut().enumerate() {
            let base = 4 + i * 16;
            let mut sum_bytes = [0_u8; 8];
            sum_bytes.copy_from_slice(&image[base..base + 8]);
            let mut checksum_bytes = [0_u8; 8];
            checksum_bytes.copy_from_slice(&image[base + 8..base + 16]);
            bucket.sum = i64::from_be_bytes(sum_bytes);
            bucket.checksum = i64::from_be_bytes(checksum_bytes);
        }
        Ok(())
    }

    fn merge(&mut self, other: &Self) {
        for (mine, theirs) in self.levels.iter_mut().zip(other.levels.iter()) {
            mine.merge(*theirs);
        }
        self.cursor = self.cursor.min(other.cursor);
    }

    fn sample(&mut self) -> SampleResult {
        while self.cursor < self.levels.len() {
            let bucket = self.levels[self.cursor];
            self.cursor += 1;
            if bucket.is_empty() {
                continue;
            }
            return match bucket.singleton() {
                Some(id) => SampleResult::good(self.node_idx, unpack_edge(id)),
                None => SampleResult::fail(self.node_idx),
            };
        }
        SampleResult::zero(self.node_idx)
    }
}

/// Builds [`AgmSupernode`]s sharing one `(num_vertices, seed)` configuration.
#[derive(Debug, Clone, Copy)]
pub struct AgmFactory {
    seed: u64,
    num_levels: usize,
}

impl AgmFactory {
    /// Size the sketch for a graph of `num_vertices` vertices, the way
    /// `Supernode::configure(n)` does in the original implementation:
    /// `ceil(log2(n)) + 2` levels, enough headroom that the top level is
    /// overwhelmingly likely to isolate any single surviving edge.
    pub fn new(num_vertices: u32, seed: u64) -> Self {
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let bits = (num_vertices.max(2) as f64).log2().ceil() as usize;
        Self {
            seed,
            num_levels: bits + 2,
        }
    }
}

impl SupernodeFactory for AgmFactory {
    type Supernode = AgmSupernode;

    fn create(&self, node_idx: NodeId) -> Self::Supernode {
        AgmSupernode::new(node_idx, self.seed, self.num_levels)
    }

    fn image_len(&self) -> usize {
        4 + self.num_levels * 16
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sketch_core::query::SampleTag;

    #[test]
    fn single_edge_is_recovered_by_sample() {
        let factory = AgmFactory::new(64, 42);
        let mut a = factory.create(1);
        let mut b = factory.create(2);
        a.apply(2);
        b.apply(1);
        a.merge(&b);
        let result = a.sample();
        assert_eq!(result.tag, SampleTag::Good);
        assert_eq!(result.edge, Some(EdgeRepr::new(1, 2)));
    }

    #[test]
    fn merging_both_endpoints_of_an_edge_cancels_it() {
        let factory = AgmFactory::new(64, 42);
        let mut a = factory.create(1);
        let mut b = factory.create(2);
        a.apply(2);
        b.apply(1);
        // a and b are the two endpoints of the SAME edge: once merged into
        // one component's sketch, that edge is internal and must cancel,
        // leaving no surviving cross-edge to sample.
        a.merge(&b);
        let result = a.sample();
        assert_eq!(result.tag, SampleTag::Zero);
    }

    #[test]
    fn image_round_trips() {
        let factory = AgmFactory::new(64, 7);
        let mut node = factory.create(5);
        node.apply(9);
        node.apply(11);
        let image = node.serialize();
        assert_eq!(image.len(), factory.image_len());
        let mut restored = factory.create(5);
        restored.deserialize(&image).unwrap();
        assert_eq!(restored.serialize(), image);
    }
}
