// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `sketch-demo`: spins up a small real cluster over loopback TCP, replays
//! a built-in tiny graph (or one read from a positional `input_stream`
//! argument in the same plain-text format `sketchd-coordinator` accepts),
//! runs one `spanning_forest_query`, and prints the resulting components.
//! Exists to exercise every role — coordinator, worker, and the wire
//! protocol between them — end to end without needing separate processes,
//! per spec.md §8.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use sketch_coordinator::spanning_forest_query;
use sketch_demo::Harness;
use tracing_subscriber::EnvFilter;

/// A four-vertex, two-triangle graph sharing one bridge edge — small
/// enough to eyeball the expected single component by hand.
const BUILTIN_GRAPH: &[(u32, u32)] = &[(0, 1), (1, 2), (2, 0), (2, 3)];
const BUILTIN_NUM_VERTICES: u32 = 4;

fn read_edges(path: &PathBuf) -> Result<(u32, Vec<(u32, u32)>)> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let header = lines.next().context("input file is empty, expected a header line")??;
    let num_vertices: u32 = header
        .split_whitespace()
        .next()
        .context("header missing vertex count")?
        .parse()
        .context("header vertex count is not an integer")?;

    let mut edges = Vec::new();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let _op: u8 = fields.next().context("update line missing op field")?.parse()?;
        let a: u32 = fields.next().context("update line missing endpoint a")?.parse()?;
        let b: u32 = fields.next().context("update line missing endpoint b")?.parse()?;
        edges.push((a, b));
    }
    Ok((num_vertices, edges))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let (num_vertices, edges) = match std::env::args().nth(1) {
        Some(path) => read_edges(&PathBuf::from(path))?,
        None => (BUILTIN_NUM_VERTICES, BUILTIN_GRAPH.to_vec()),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let num_workers = 2.min(num_vertices.max(1) as usize);
    let harness = runtime.block_on(Harness::spawn(num_vertices, num_workers, runtime.handle().clone()))?;

    for &(a, b) in &edges {
        harness.insert_edge(a, b);
    }

    let (partition, timing) = spanning_forest_query(harness.cluster(), false).map_err(|err| anyhow::anyhow!(err.to_string()))?;
    let components = partition.components();
    tracing::info!(
        num_edges = edges.len(),
        num_components = components.len(),
        flush_us = timing.flush.as_micros(),
        cc_alg_us = timing.cc_alg.as_micros(),
        "query complete"
    );
    for (rep, members) in &components {
        tracing::info!(rep, ?members, "component");
    }

    harness.shutdown()
}
