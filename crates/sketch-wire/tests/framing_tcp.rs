// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Frames survive a real TCP loopback round trip, including a frame split
//! across two reads.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::BytesMut;
use sketch_core::Batch;
use sketch_wire::{FrameAccumulator, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn send_all(stream: &mut TcpStream, messages: &[Message]) {
    let mut buf = BytesMut::new();
    for msg in messages {
        msg.encode_into(&mut buf);
    }
    stream.write_all(&buf).await.expect("write frames");
}

#[tokio::test]
async fn frames_round_trip_over_loopback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let messages = vec![
        Message::Init(sketch_wire::InitPayload {
            num_vertices: 16,
            seed: 7,
            max_msg_size: 4096,
        }),
        Message::Batch(vec![Batch::new(1, vec![2, 3]).unwrap()]),
        Message::Flush,
        Message::Shutdown,
    ];

    let writer_messages = messages.clone();
    let writer = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        send_all(&mut stream, &writer_messages).await;
        stream.shutdown().await.expect("shutdown write half");
    });

    let (mut conn, _) = listener.accept().await.expect("accept");
    let mut acc = FrameAccumulator::new();
    let mut received = Vec::new();
    let mut read_buf = [0_u8; 7]; // deliberately small to force split frames

    loop {
        if let Some(msg) = acc.next_message(usize::MAX).expect("decode") {
            received.push(msg);
            if received.len() == messages.len() {
                break;
            }
            continue;
        }
        let n = conn.read(&mut read_buf).await.expect("read");
        assert!(n > 0, "peer closed before all frames arrived");
        acc.feed(&read_buf[..n]);
    }

    writer.await.expect("writer task");
    assert_eq!(received, messages);
}
