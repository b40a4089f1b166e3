// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end scenarios over a real loopback-TCP cluster
//! ([`sketch_demo::Harness`]), exercising P2 and spec.md's scenario 1.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use sketch_coordinator::spanning_forest_query;
use sketch_demo::Harness;
use sketch_fixtures::verify::UnionFind;

/// Scenario 1: `N=8`, edges `[(0,1),(1,2),(2,3),(4,5),(5,6)]`, all inserts.
/// Expect 3 components: `{0,1,2,3}`, `{4,5,6}`, `{7}`.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tiny_graph_has_three_components() {
    let harness = Harness::spawn(8, 2, tokio::runtime::Handle::current()).await.expect("spawn harness");

    for &(a, b) in &[(0, 1), (1, 2), (2, 3), (4, 5), (5, 6)] {
        harness.insert_edge(a, b);
    }

    let (partition, _timing) =
        tokio::task::spawn_blocking({
            let cluster = harness.cluster().clone();
            move || spanning_forest_query(&cluster, false)
        })
        .await
        .expect("join query task")
        .expect("query");

    let components = partition.components();
    assert_eq!(components.len(), 3, "expected 3 components, got {components:?}");
    assert!(partition.connected(0, 3));
    assert!(partition.connected(4, 6));
    assert!(!partition.connected(0, 4));
    assert!(!partition.connected(0, 7));

    harness.shutdown().expect("shutdown");
}

/// P2: the partition `spanning_forest_query` produces matches a ground
/// truth union-find over the same edges, for a slightly larger random (but
/// fixed, so deterministically reproducible) graph.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn query_identity_matches_ground_truth() {
    const N: u32 = 32;
    let edges: Vec<(u32, u32)> = (0..N - 1)
        .filter(|v| v % 3 != 2)
        .map(|v| (v, v + 1))
        .collect();

    let harness = Harness::spawn(N, 3, tokio::runtime::Handle::current()).await.expect("spawn harness");
    for &(a, b) in &edges {
        harness.insert_edge(a, b);
    }

    let (partition, _timing) = tokio::task::spawn_blocking({
        let cluster = harness.cluster().clone();
        move || spanning_forest_query(&cluster, false)
    })
    .await
    .expect("join query task")
    .expect("query");

    let mut ground_truth = UnionFind::from_edges(N, edges);
    for a in 0..N {
        for b in 0..N {
            assert_eq!(
                partition.connected(a, b),
                ground_truth.connected(a, b),
                "connectivity mismatch for ({a}, {b})"
            );
        }
    }

    harness.shutdown().expect("shutdown");
}
