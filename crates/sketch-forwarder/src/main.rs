// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `sketchd-forwarder`: accepts one coordinator connection, dials one
//! worker, and relays frames between them until `Shutdown`.

use anyhow::{Context, Result};
use clap::Parser;
use sketch_forwarder::cli::ForwarderArgs;
use sketch_forwarder::Forwarder;
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = ForwarderArgs::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async move {
        let listener = TcpListener::bind(&args.listen)
            .await
            .with_context(|| format!("binding {}", args.listen))?;
        tracing::info!(addr = %args.listen, "forwarder listening");

        let (coordinator, peer) = listener.accept().await?;
        tracing::info!(%peer, "coordinator connected");

        let worker = TcpStream::connect(&args.worker)
            .await
            .with_context(|| format!("connecting to worker {}", args.worker))?;
        tracing::info!(addr = %args.worker, "worker connected");

        Forwarder::new(coordinator, worker, args.max_msg_size)
            .run()
            .await
            .map_err(|err| anyhow::anyhow!(err.to_string()))
    })
}
