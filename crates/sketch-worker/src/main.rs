// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `sketchd-worker`: accepts exactly one inbound connection (the
//! coordinator, or a forwarder standing in for it), reads the `Init`
//! handshake, and runs the dispatcher loop until `Shutdown`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sketch_worker::cli::WorkerArgs;
use sketch_worker::{DistributedWorker, WorkerStatusReporter};
use sketch_wire::{FrameAccumulator, Message};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "demo-fixtures")]
type Factory = sketch_fixtures::AgmFactory;

#[cfg(not(feature = "demo-fixtures"))]
fn main() -> Result<()> {
    bail!(
        "sketchd-worker was built without the `demo-fixtures` feature, so it \
         has no SupernodeFactory to instantiate DistributedWorker with; \
         rebuild with --features demo-fixtures, or embed sketch_worker \
         against your own SupernodeFactory implementation instead of this binary"
    );
}

#[cfg(feature = "demo-fixtures")]
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = WorkerArgs::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let handle = runtime.handle().clone();

    let listener = runtime.block_on(async {
        TcpListener::bind(&args.listen)
            .await
            .with_context(|| format!("binding {}", args.listen))
    })?;
    tracing::info!(addr = %args.listen, "worker listening");

    let (mut stream, peer) = runtime.block_on(async { listener.accept().await })?;
    tracing::info!(%peer, "coordinator connected");

    let init = runtime.block_on(async {
        let mut acc = FrameAccumulator::new();
        let mut chunk = [0_u8; 256];
        loop {
            if let Some(msg) = acc
                .next_message(usize::MAX)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?
            {
                return Ok::<Message, anyhow::Error>(msg);
            }
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                bail!("connection closed before Init arrived");
            }
            acc.feed(&chunk[..n]);
        }
    })?;
    let Message::Init(payload) = init else {
        bail!("expected Init as the first message, got tag {}", init.tag().as_u8());
    };
    tracing::info!(
        num_vertices = payload.num_vertices,
        seed = payload.seed,
        max_msg_size = payload.max_msg_size,
        "worker initialized"
    );

    let factory = Arc::new(Factory::new(payload.num_vertices, payload.seed));
    let helper_threads = args.resolved_helper_threads();
    let worker = DistributedWorker::new(factory, helper_threads)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    if args.report_status {
        let updates_processed = worker.updates_processed_handle();
        let shutdown = Arc::clone(&shutdown);
        let status_dir = args.status_dir.clone();
        runtime.spawn(async move {
            WorkerStatusReporter::new(updates_processed, shutdown, &status_dir)
                .run()
                .await;
        });
    }

    let run_result = worker.run(stream, &handle, payload.max_msg_size as usize);
    shutdown.store(true, Ordering::SeqCst);
    run_result.map_err(|err| anyhow::anyhow!(err.to_string()))
}
