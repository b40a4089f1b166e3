// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! A plain, non-streaming ground-truth verifier: a union-find over the same
//! edge stream the cluster processes, used by integration tests to check
//! a `spanning_forest_query` result against the graph it was built from.

use std::collections::HashMap;

use sketch_core::NodeId;

/// Union-find with path compression and union by rank, used only to check
/// sketch-derived connectivity results — never on the hot ingestion path.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<NodeId>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// Construct a union-find over `n` singleton vertices `0..n`.
    pub fn new(n: u32) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n as usize],
        }
    }

    /// Find `x`'s representative, compressing the path as it goes.
    pub fn find(&mut self, x: NodeId) -> NodeId {
        if self.parent[x as usize] != x {
            let root = self.find(self.parent[x as usize]);
            self.parent[x as usize] = root;
        }
        self.parent[x as usize]
    }

    /// Union the components containing `a` and `b`. Returns `false` if they
    /// were already in the same component.
    pub fn union(&mut self, a: NodeId, b: NodeId) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        let (ra, rb) = if self.rank[ra as usize] < self.rank[rb as usize] {
            (rb, ra)
        } else {
            (ra, rb)
        };
        self.parent[rb as usize] = ra;
        if self.rank[ra as usize] == self.rank[rb as usize] {
            self.rank[ra as usize] += 1;
        }
        true
    }

    /// Build ground truth from a plain edge list, applying insertions only
    /// (deletions are not representable in a union-find and must be
    /// replayed by a caller that tracks the live edge set separately).
    pub fn from_edges(n: u32, edges: impl IntoIterator<Item = (NodeId, NodeId)>) -> Self {
        let mut uf = Self::new(n);
        for (a, b) in edges {
            uf.union(a, b);
        }
        uf
    }

    /// Group every vertex `0..n` by its representative.
    pub fn components(&mut self) -> HashMap<NodeId, Vec<NodeId>> {
        let n = self.parent.len() as u32;
        let mut groups: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for v in 0..n {
            let root = self.find(v);
            groups.entry(root).or_default().push(v);
        }
        groups
    }

    /// Whether `a` and `b` are in the same component.
    pub fn connected(&mut self, a: NodeId, b: NodeId) -> bool {
        self.find(a) == self.find(b)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn chain_of_edges_forms_one_component() {
        let mut uf = UnionFind::from_edges(5, [(0, 1), (1, 2), (2, 3)]);
        assert!(uf.connected(0, 3));
        assert!(!uf.connected(0, 4));
    }

    #[test]
    fn components_groups_every_vertex() {
        let mut uf = UnionFind::from_edges(4, [(0, 1), (2, 3)]);
        let groups = uf.components();
        assert_eq!(groups.len(), 2);
        let sizes: Vec<usize> = groups.values().map(Vec::len).collect();
        assert!(sizes.iter().all(|&s| s == 2));
    }
}
