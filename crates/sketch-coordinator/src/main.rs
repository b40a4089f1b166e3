// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `sketchd-coordinator`: dials every `--worker` address, replays
//! `input_stream` through `insert_threads` distributor loops, and runs
//! `num_queries` spanning-forest queries (grouped per `--burst` if given),
//! appending a timing line per query to `output_file`.
//!
//! The replay reader accepts the same plain-text `n m` header followed by
//! `type a b` lines that `original_source/test/distributed_graph_test.cpp`
//! feeds `GraphDistribUpdate::update` with. A real high-throughput stream
//! generator is out of scope (spec.md §1 Non-goals); this is enough to
//! drive the CLI surface §6 requires end to end.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sketch_core::batch::Batch;
use sketch_core::ClusterConfig;
use sketch_coordinator::cli::CoordinatorArgs;
use sketch_coordinator::{spanning_forest_query, Cluster, StatusReporter, WorkDistributor};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "demo-fixtures")]
type Factory = sketch_fixtures::AgmFactory;
#[cfg(feature = "demo-fixtures")]
type DemoGutter = sketch_fixtures::InMemoryGutter;

/// One parsed `type a b` line from `input_stream`.
struct EdgeUpdate {
    a: sketch_core::NodeId,
    b: sketch_core::NodeId,
}

fn read_stream(path: &Path) -> Result<(u32, Vec<EdgeUpdate>)> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let header = lines
        .next()
        .context("input_stream is empty, expected a header line")??;
    let mut header_fields = header.split_whitespace();
    let num_vertices: u32 = header_fields
        .next()
        .context("header missing vertex count")?
        .parse()
        .context("header vertex count is not an integer")?;
    let num_edges: usize = header_fields
        .next()
        .context("header missing edge count")?
        .parse()
        .context("header edge count is not an integer")?;

    let mut updates = Vec::with_capacity(num_edges);
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let _op: u8 = fields
            .next()
            .context("update line missing op field")?
            .parse()
            .context("update op is not an integer")?;
        let a: sketch_core::NodeId = fields
            .next()
            .context("update line missing endpoint a")?
            .parse()?;
        let b: sketch_core::NodeId = fields
            .next()
            .context("update line missing endpoint b")?
            .parse()?;
        updates.push(EdgeUpdate { a, b });
    }
    Ok((num_vertices, updates))
}

#[cfg(feature = "demo-fixtures")]
fn worker_for(vertex: sketch_core::NodeId, num_workers: usize) -> usize {
    vertex as usize % num_workers.max(1)
}

/// Push both endpoints of one edge update into the gutter, matching the
/// fixture sketch's "insert into both endpoints" convention. Coordinator
/// replay treats INSERT and DELETE identically: resolving a per-edge sign
/// is a supernode-internal concern (spec.md §1 Non-goals, "real
/// sketch/supernode math"), out of scope for this crate.
#[cfg(feature = "demo-fixtures")]
fn route_edge(gutter: &DemoGutter, num_workers: usize, edge: &EdgeUpdate) {
    if let Some(batch) = Batch::new(edge.a, vec![edge.b]) {
        gutter.push(worker_for(edge.a, num_workers), vec![batch]);
    }
    if let Some(batch) = Batch::new(edge.b, vec![edge.a]) {
        gutter.push(worker_for(edge.b, num_workers), vec![batch]);
    }
}

#[cfg(not(feature = "demo-fixtures"))]
fn main() -> Result<()> {
    bail!(
        "sketchd-coordinator was built without the `demo-fixtures` feature, \
         so it has no SupernodeFactory to instantiate Cluster<F> with; \
         rebuild with --features demo-fixtures, or embed sketch_coordinator \
         against your own SupernodeFactory implementation instead of this binary"
    );
}

#[cfg(feature = "demo-fixtures")]
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = CoordinatorArgs::parse_validated();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let (num_vertices, updates) = read_stream(&args.input_stream)?;
    // num_repeats is accepted and range-validated per §6, but, as in
    // cluster_query_expr.cpp ("Still a work in progress -- right now
    // doesn't do anything"), the replay below always runs the stream once.
    let _ = args.num_repeats;

    let config = ClusterConfig {
        num_vertices,
        seed: 0x5EED,
        supernode_bytes: 0,
        batches_per_flush: ClusterConfig::default_batches_per_flush(),
        num_workers: args.workers.len(),
        local_process_cutoff: ClusterConfig::default_local_process_cutoff(),
        max_outstanding_deltas: ClusterConfig::default_max_outstanding_deltas(),
    };

    let factory = Arc::new(Factory::new(num_vertices, config.seed));
    let gutter = Arc::new(DemoGutter::new(args.workers.len()));

    let cluster = runtime.block_on(Cluster::setup(
        config,
        Arc::clone(&factory),
        &args.workers,
        Arc::clone(&gutter) as Arc<dyn sketch_core::Gutter>,
        runtime.handle().clone(),
    ))?;
    let cluster = Arc::new(cluster);

    let mut distributor_threads = Vec::with_capacity(cluster.num_workers());
    for worker_id in 0..cluster.num_workers() {
        let cluster = Arc::clone(&cluster);
        distributor_threads.push(std::thread::spawn(move || {
            let distributor = WorkDistributor::new(&*cluster, worker_id);
            distributor.run(&*cluster);
        }));
    }

    let status_cluster = Arc::clone(&cluster);
    let status_dir = args.status_dir.clone();
    runtime.spawn(async move {
        StatusReporter::new(status_cluster, &status_dir).run().await;
    });

    let mut output = File::create(&args.output_file)
        .with_context(|| format!("creating {}", args.output_file.display()))?;

    let num_grouped = args.burst.as_ref().map_or(1, |b| b.num_grouped).max(1);
    let num_bursts = if args.num_queries == 0 {
        0
    } else {
        (args.num_queries - 1) / num_grouped + 1
    };
    let upd_per_burst = if num_bursts == 0 {
        updates.len()
    } else {
        updates.len() / num_bursts as usize
    };

    let start = std::time::Instant::now();
    let mut chunk_start = 0_usize;
    let mut queries_left = args.num_queries;
    for _ in 0..num_bursts.max(1) {
        let chunk_end = if queries_left <= num_grouped {
            updates.len()
        } else {
            (chunk_start + upd_per_burst).min(updates.len())
        };
        insert_shard(&updates[chunk_start..chunk_end], &gutter, cluster.num_workers(), args.insert_threads);
        chunk_start = chunk_end;

        if queries_left > 0 {
            let burst = queries_left.min(num_grouped);
            run_query_burst(&cluster, burst, &mut output)?;
            queries_left -= burst;
        }
    }
    debug_assert_eq!(chunk_start, updates.len(), "every update should have been routed exactly once");
    tracing::info!(elapsed_ms = start.elapsed().as_millis(), total_updates = updates.len(), "stream replay complete");

    cluster.teardown()?;
    for handle in distributor_threads {
        if handle.join().is_err() {
            tracing::error!("a work distributor thread panicked during teardown");
        }
    }

    Ok(())
}

/// Partition `shard` contiguously across `insert_threads` worker threads,
/// each routing its slice of edges into `gutter` — the Rust analogue of
/// `inserter_threads` threads draining a shared `MT_StreamReader`.
#[cfg(feature = "demo-fixtures")]
fn insert_shard(shard: &[EdgeUpdate], gutter: &Arc<DemoGutter>, num_workers: usize, insert_threads: u32) {
    if shard.is_empty() {
        return;
    }
    let insert_threads = (insert_threads as usize).max(1).min(shard.len());
    let per_thread = shard.len().div_ceil(insert_threads);
    std::thread::scope(|scope| {
        for piece in shard.chunks(per_thread) {
            let gutter = Arc::clone(gutter);
            scope.spawn(move || {
                for edge in piece {
                    route_edge(&gutter, num_workers, edge);
                }
            });
        }
    });
}

#[cfg(feature = "demo-fixtures")]
fn run_query_burst(
    cluster: &Cluster<Factory>,
    num_grouped: u32,
    output: &mut File,
) -> Result<()> {
    for i in 0..num_grouped {
        let continue_stream = i + 1 < num_grouped;
        let (partition, timing) = spanning_forest_query(cluster, continue_stream)
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
        writeln!(
            output,
            "components={} flush_us={} cc_alg_us={} cache_hit={}",
            partition.components().len(),
            timing.flush.as_micros(),
            timing.cc_alg.as_micros(),
            timing.cache_hit,
        )?;
    }
    Ok(())
}
