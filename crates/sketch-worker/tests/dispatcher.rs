// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The dispatcher loop against a real TCP loopback connection, driving
//! `DistributedWorker::run` on a blocking task the way `sketchd-worker`'s
//! `main` does.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use bytes::BytesMut;
use sketch_core::query::SampleTag;
use sketch_core::supernode::SketchSupernode;
use sketch_core::Batch;
use sketch_fixtures::AgmFactory;
use sketch_wire::message::{decode_sample_tag, QueryRecord};
use sketch_wire::{FrameAccumulator, Message};
use sketch_worker::DistributedWorker;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn recv_one(stream: &mut TcpStream) -> Message {
    let mut acc = FrameAccumulator::new();
    let mut buf = [0_u8; 4096];
    loop {
        if let Some(msg) = acc.next_message(usize::MAX).expect("decode") {
            return msg;
        }
        let n = stream.read(&mut buf).await.expect("read");
        assert!(n > 0, "peer closed mid-frame");
        acc.feed(&buf[..n]);
    }
}

async fn send(stream: &mut TcpStream, msg: &Message) {
    let mut buf = BytesMut::new();
    msg.encode_into(&mut buf);
    stream.write_all(&buf).await.expect("write");
}

#[tokio::test]
async fn batch_round_trip_produces_a_delta() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    // A lone BATCH doesn't get an immediate reply: the handler pool only
    // drains eagerly once `recv_msg_queue` runs dry, or on STOP/SHUTDOWN.
    // So SHUTDOWN is sent first here, forcing the drain that flushes this
    // batch's delta before the worker exits.
    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        send(&mut stream, &Message::Batch(vec![Batch::new(3, vec![9]).unwrap()])).await;
        send(&mut stream, &Message::Shutdown).await;
        recv_one(&mut stream).await
    });

    let (stream, _) = listener.accept().await.expect("accept");
    let factory = Arc::new(AgmFactory::new(16, 1));
    let worker = DistributedWorker::new(factory, 2).expect("build worker");
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || worker.run(stream, &handle, usize::MAX))
        .await
        .expect("join dispatcher task")
        .expect("dispatcher loop");

    match client.await.expect("join client task") {
        Message::Delta(deltas) => {
            assert_eq!(deltas.len(), 1);
            assert_eq!(deltas[0].node_idx, 3);
        }
        other => panic!("expected Delta, got {other:?}"),
    }
}

#[tokio::test]
async fn query_round_trip_recovers_a_merged_edge() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let factory_for_image = AgmFactory::new(16, 1);
    let mut merged = factory_for_image.create(3);
    merged.apply(9);
    let image = merged.serialize();

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        send(
            &mut stream,
            &Message::Query {
                records: vec![QueryRecord { node_idx: 3, image }],
                num_queries_in_round: Some(1),
            },
        )
        .await;
        let reply = recv_one(&mut stream).await;
        send(&mut stream, &Message::Shutdown).await;
        reply
    });

    let (stream, _) = listener.accept().await.expect("accept");
    let factory = Arc::new(AgmFactory::new(16, 1));
    let worker = DistributedWorker::new(factory, 2).expect("build worker");
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || worker.run(stream, &handle, usize::MAX))
        .await
        .expect("join dispatcher task")
        .expect("dispatcher loop");

    match client.await.expect("join client task") {
        Message::QueryReply(records) => {
            assert_eq!(records.len(), 1);
            assert_eq!(decode_sample_tag(records[0].tag), SampleTag::Good);
        }
        other => panic!("expected QueryReply, got {other:?}"),
    }
}

#[tokio::test]
async fn buff_query_echoes_twice_the_helper_pool_size() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        send(&mut stream, &Message::BuffQuery { slots: 0 }).await;
        let reply = recv_one(&mut stream).await;
        send(&mut stream, &Message::Shutdown).await;
        reply
    });

    let (stream, _) = listener.accept().await.expect("accept");
    let factory = Arc::new(AgmFactory::new(16, 1));
    let worker = DistributedWorker::new(factory, 3).expect("build worker");
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || worker.run(stream, &handle, usize::MAX))
        .await
        .expect("join dispatcher task")
        .expect("dispatcher loop");

    match client.await.expect("join client task") {
        Message::BuffQueryReply { slots } => assert_eq!(slots, 6),
        other => panic!("expected BuffQueryReply, got {other:?}"),
    }
}
