// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The `Message` enum and its wire encoding.
//!
//! Every frame on the wire is `u32 body_len (BE) || u8 tag || body`. Hot-path
//! variants (`Batch`, `Delta`, `Query`, `QueryReply`) pack their body with
//! explicit big-endian integers via `bytes`' `BufMut`/`Buf`, writing directly
//! into the caller's buffer with no intermediate allocation and no serde.
//! Control variants (`Init`, `BuffQuery`, `BuffQueryReply`, `Flush`, `Stop`,
//! `Shutdown`) use the same mechanism; their bodies are just small enough
//! that it reads like a plain struct-of-fields encoding.

use bytes::{Buf, BufMut, BytesMut};
use sketch_core::query::{SampleResult, SampleTag};
use sketch_core::{Batch, Delta, NodeId};

use crate::error::WireError;
use crate::tag::Tag;

/// Encode a [`SampleResult`] plus the sampled supernode's post-sample
/// image into the `(edge_vec, tag, image)` triple a `QueryReply` carries,
/// shared by `sketch-coordinator` (packing a worker's reply) and
/// `sketch-worker` (producing it). `image` carries the cursor advance
/// `sample()` made, so the coordinator can persist it into its resident
/// copy instead of re-sampling the same bucket next round.
pub fn encode_sample_result(result: SampleResult, image: Vec<u8>) -> QueryReplyRecord {
    let tag = match result.tag {
        SampleTag::Good => 0,
        SampleTag::Zero => 1,
        SampleTag::Fail => 2,
    };
    let edge_vec = result
        .edge
        .map(|e| (u64::from(e.a) << 32) | u64::from(e.b))
        .unwrap_or_default();
    QueryReplyRecord { edge_vec, tag, image }
}

/// Decode a `QueryReply` record's raw tag byte back into a [`SampleTag`].
/// Any value other than `0`/`1` decodes as [`SampleTag::Fail`], matching
/// the original's "anything we can't prove good or zero is a failed
/// sample, retry next round" semantics.
pub fn decode_sample_tag(raw: u8) -> SampleTag {
    match raw {
        0 => SampleTag::Good,
        1 => SampleTag::Zero,
        _ => SampleTag::Fail,
    }
}

/// Decode a `QueryReplyRecord`'s `edge_vec` back into `(src, dst)`.
pub fn decode_edge_vec(edge_vec: u64) -> (NodeId, NodeId) {
    #[allow(clippy::cast_possible_truncation)]
    let dst = edge_vec as u32;
    #[allow(clippy::cast_possible_truncation)]
    let src = (edge_vec >> 32) as u32;
    (src, dst)
}

/// One `(edge_vec, tag, image)` record in a `QueryReply` body.
///
/// `edge_vec` packs `(src << 32) | dst` ("inverted edge endpoint pair"); the
/// sample tag distinguishes a recovered edge from an exhausted or failed
/// sample, per [`sketch_core::query::SampleTag`]. `image` is the sampled
/// supernode's serialized state *after* that sample — its cursor has
/// advanced past whatever bucket was just consumed — so the coordinator can
/// fold the advance back into its resident copy before the next round
/// instead of re-sampling the same bucket forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReplyRecord {
    /// `(src << 32) | dst`.
    pub edge_vec: u64,
    /// Raw wire value of the originating [`sketch_core::query::SampleTag`].
    pub tag: u8,
    /// The sampled supernode's image after this sample's cursor advance.
    pub image: Vec<u8>,
}

/// One `(node_idx, serialized supernode image)` record in a `Query` body:
/// the representative being sampled, shipped with its sketch bytes so a
/// worker's helper thread can run the sample-extraction arithmetic without
/// a round trip back to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    /// The vertex being sampled.
    pub node_idx: NodeId,
    /// The serialized supernode image to sample from.
    pub image: Vec<u8>,
}

/// Cluster configuration broadcast to a worker once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitPayload {
    /// Number of vertices in the graph.
    pub num_vertices: u32,
    /// Supernode sketch seed shared by every factory in the cluster.
    pub seed: u64,
    /// The cluster's `max_msg_size`, so a worker can size its receive
    /// buffers up front.
    pub max_msg_size: u32,
}

/// A wire message: a tag paired with its (possibly empty) body.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Cluster configuration, coordinator to worker.
    Init(InitPayload),
    /// A group of flushed update batches, distributor to worker.
    Batch(Vec<Batch>),
    /// A group of updated supernode images, worker to distributor.
    Delta(Vec<Delta>),
    /// A chunk of sample requests, with an optional trailing count present
    /// only on the last `Query` message of a round to any given worker.
    Query {
        /// The records to sample.
        records: Vec<QueryRecord>,
        /// Present only on the round's last `Query` message.
        num_queries_in_round: Option<u32>,
    },
    /// A request to pre-allocate `slots` query-reply handler buffers.
    BuffQuery {
        /// Number of handler slots the worker should pre-allocate.
        slots: u32,
    },
    /// The reply to a `BuffQuery`, echoing the slot count actually
    /// allocated.
    BuffQueryReply {
        /// Number of handler slots allocated.
        slots: u32,
    },
    /// Sample replies, in the same order as the round's accumulated
    /// requests.
    QueryReply(Vec<QueryReplyRecord>),
    /// Force an immediate gutter flush with no payload.
    Flush,
    /// Pause processing, keeping resident state; a worker drains its
    /// outstanding helpers and send queue before replying.
    Stop,
    /// The reply to `Stop`: this worker's accumulated update count since
    /// its last `Init`/`Stop` cycle.
    StopReply {
        /// Updates applied since this worker's last `Init` or `Stop`.
        num_updates: u64,
    },
    /// Tear down permanently.
    Shutdown,
}

impl Message {
    /// This message's wire tag.
    pub fn tag(&self) -> Tag {
        match self {
            Self::Init(_) => Tag::Init,
            Self::Batch(_) => Tag::Batch,
            Self::Delta(_) => Tag::Delta,
            Self::Query { .. } => Tag::Query,
            Self::BuffQuery { .. } => Tag::BuffQuery,
            Self::BuffQueryReply { .. } => Tag::BuffQueryReply,
            Self::QueryReply(_) => Tag::QueryReply,
            Self::Flush => Tag::Flush,
            Self::Stop => Tag::Stop,
            Self::StopReply { .. } => Tag::StopReply,
            Self::Shutdown => Tag::Shutdown,
        }
    }

    /// Encode this message as a full frame (`len || tag || body`) appended
    /// to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        let len_pos = buf.len();
        buf.put_u32(0);
        buf.put_u8(self.tag().as_u8());
        let body_start = buf.len();
        self.encode_body(buf);
        #[allow(clippy::cast_possible_truncation)]
        let body_len = (buf.len() - body_start) as u32;
        buf[len_pos..len_pos + 4].copy_from_slice(&body_len.to_be_bytes());
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            Self::Init(payload) => {
                buf.put_u32(payload.num_vertices);
                buf.put_u64(payload.seed);
                buf.put_u32(payload.max_msg_size);
            }
            Self::Batch(batches) => {
                #[allow(clippy::cast_possible_truncation)]
                buf.put_u32(batches.len() as u32);
                for batch in batches {
                    buf.put_u32(batch.node_idx);
                    #[allow(clippy::cast_possible_truncation)]
                    buf.put_u64(batch.dests.len() as u64);
                    for dest in &batch.dests {
                        buf.put_u32(*dest);
                    }
                }
            }
            Self::Delta(deltas) => {
                #[allow(clippy::cast_possible_truncation)]
                buf.put_u32(deltas.len() as u32);
                for delta in deltas {
                    buf.put_u32(delta.node_idx);
                    #[allow(clippy::cast_possible_truncation)]
                    buf.put_u64(delta.image.len() as u64);
                    buf.put_slice(&delta.image);
                }
            }
            Self::Query {
                records,
                num_queries_in_round,
            } => {
                #[allow(clippy::cast_possible_truncation)]
                buf.put_u32(records.len() as u32);
                for record in records {
                    buf.put_u32(record.node_idx);
                    #[allow(clippy::cast_possible_truncation)]
                    buf.put_u64(record.image.len() as u64);
                    buf.put_slice(&record.image);
                }
                buf.put_u8(u8::from(num_queries_in_round.is_some()));
                if let Some(count) = num_queries_in_round {
                    buf.put_u32(*count);
                }
            }
            Self::BuffQuery { slots } | Self::BuffQueryReply { slots } => {
                buf.put_u32(*slots);
            }
            Self::QueryReply(records) => {
                #[allow(clippy::cast_possible_truncation)]
                buf.put_u32(records.len() as u32);
                for record in records {
                    buf.put_u64(record.edge_vec);
                    buf.put_u8(record.tag);
                    #[allow(clippy::cast_possible_truncation)]
                    buf.put_u64(record.image.len() as u64);
                    buf.put_slice(&record.image);
                }
            }
            Self::StopReply { num_updates } => {
                buf.put_u64(*num_updates);
            }
            Self::Flush | Self::Stop | Self::Shutdown => {}
        }
    }

    /// Attempt to decode one full frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when fewer bytes than the declared frame length
    /// are buffered; the caller should read more and retry. On success,
    /// the consumed bytes are advanced out of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownTag`] or [`WireError::MalformedBody`] if
    /// the buffered bytes do not form a valid frame for their declared tag,
    /// and [`WireError::OversizedFrame`] if `body_len` exceeds `max_body`.
    pub fn decode_from(buf: &mut BytesMut, max_body: usize) -> Result<Option<Self>, WireError> {
        if buf.len() < 5 {
            return Ok(None);
        }
        let body_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if body_len > max_body {
            return Err(WireError::OversizedFrame {
                got: body_len,
                max: max_body,
            });
        }
        if buf.len() < 5 + body_len {
            return Ok(None);
        }
        let tag = Tag::from_u8(buf[4])?;
        buf.advance(5);
        let mut body = buf.split_to(body_len);
        let msg = Self::decode_body(tag, &mut body)?;
        Ok(Some(msg))
    }

    #[allow(clippy::too_many_lines)]
    fn decode_body(tag: Tag, body: &mut BytesMut) -> Result<Self, WireError> {
        match tag {
            Tag::Init => {
                if body.len() != 16 {
                    return Err(WireError::MalformedBody {
                        tag,
                        expected: 16,
                        got: body.len(),
                    });
                }
                Ok(Self::Init(InitPayload {
                    num_vertices: body.get_u32(),
                    seed: body.get_u64(),
                    max_msg_size: body.get_u32(),
                }))
            }
            Tag::Batch => {
                let count = read_u32(body, tag)?;
                let mut batches = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let node_idx = read_u32(body, tag)?;
                    let dests_len = read_u64(body, tag)?;
                    let mut dests = Vec::with_capacity(dests_len as usize);
                    for _ in 0..dests_len {
                        dests.push(read_u32(body, tag)?);
                    }
                    batches.push(Batch { node_idx, dests });
                }
                Ok(Self::Batch(batches))
            }
            Tag::Delta => {
                let count = read_u32(body, tag)?;
                let mut deltas = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let node_idx = read_u32(body, tag)?;
                    let image_len = read_u64(body, tag)? as usize;
                    if body.len() < image_len {
                        return Err(WireError::MalformedBody {
                            tag,
                            expected: image_len,
                            got: body.len(),
                        });
                    }
                    let image = body.split_to(image_len).to_vec();
                    deltas.push(Delta { node_idx, image });
                }
                Ok(Self::Delta(deltas))
            }
            Tag::Query => {
                let count = read_u32(body, tag)?;
                let mut records = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let node_idx = read_u32(body, tag)?;
                    let image_len = read_u64(body, tag)? as usize;
                    if body.len() < image_len {
                        return Err(WireError::MalformedBody {
                            tag,
                            expected: image_len,
                            got: body.len(),
                        });
                    }
                    let image = body.split_to(image_len).to_vec();
                    records.push(QueryRecord { node_idx, image });
                }
                let has_count = read_u8(body, tag)?;
                let num_queries_in_round = if has_count != 0 {
                    Some(read_u32(body, tag)?)
                } else {
                    None
                };
                Ok(Self::Query {
                    records,
                    num_queries_in_round,
                })
            }
            Tag::BuffQuery => Ok(Self::BuffQuery {
                slots: read_u32(body, tag)?,
            }),
            Tag::BuffQueryReply => Ok(Self::BuffQueryReply {
                slots: read_u32(body, tag)?,
            }),
            Tag::QueryReply => {
                let count = read_u32(body, tag)?;
                let mut records = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let edge_vec = read_u64(body, tag)?;
                    let sample_tag = read_u8(body, tag)?;
                    let image_len = read_u64(body, tag)? as usize;
                    if body.len() < image_len {
                        return Err(WireError::MalformedBody {
                            tag,
                            expected: image_len,
                            got: body.len(),
                        });
                    }
                    let image = body.split_to(image_len).to_vec();
                    records.push(QueryReplyRecord {
                        edge_vec,
                        tag: sample_tag,
                        image,
                    });
                }
                Ok(Self::QueryReply(records))
            }
            Tag::Flush => Ok(Self::Flush),
            Tag::Stop => Ok(Self::Stop),
            Tag::StopReply => Ok(Self::StopReply {
                num_updates: read_u64(body, tag)?,
            }),
            Tag::Shutdown => Ok(Self::Shutdown),
        }
    }
}

fn read_u32(body: &mut BytesMut, tag: Tag) -> Result<u32, WireError> {
    if body.len() < 4 {
        return Err(WireError::MalformedBody {
            tag,
            expected: 4,
            got: body.len(),
        });
    }
    Ok(body.get_u32())
}

fn read_u64(body: &mut BytesMut, tag: Tag) -> Result<u64, WireError> {
    if body.len() < 8 {
        return Err(WireError::MalformedBody {
            tag,
            expected: 8,
            got: body.len(),
        });
    }
    Ok(body.get_u64())
}

fn read_u8(body: &mut BytesMut, tag: Tag) -> Result<u8, WireError> {
    if body.is_empty() {
        return Err(WireError::MalformedBody {
            tag,
            expected: 1,
            got: 0,
        });
    }
    Ok(body.get_u8())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn control_messages_round_trip() {
        for msg in [Message::Flush, Message::Stop, Message::Shutdown] {
            let mut buf = BytesMut::new();
            msg.encode_into(&mut buf);
            let decoded = Message::decode_from(&mut buf, usize::MAX).unwrap().unwrap();
            assert_eq!(decoded, msg);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn init_round_trips() {
        let msg = Message::Init(InitPayload {
            num_vertices: 1024,
            seed: 0xdead_beef,
            max_msg_size: 4096,
        });
        let mut buf = BytesMut::new();
        msg.encode_into(&mut buf);
        let decoded = Message::decode_from(&mut buf, usize::MAX).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn batch_round_trips_with_multiple_entries() {
        let msg = Message::Batch(vec![
            Batch::new(1, vec![2, 3, 4]).unwrap(),
            Batch::new(5, vec![6]).unwrap(),
        ]);
        let mut buf = BytesMut::new();
        msg.encode_into(&mut buf);
        let decoded = Message::decode_from(&mut buf, usize::MAX).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn query_round_trips_with_trailing_count() {
        let msg = Message::Query {
            records: vec![QueryRecord {
                node_idx: 7,
                image: vec![1, 2, 3, 4],
            }],
            num_queries_in_round: Some(42),
        };
        let mut buf = BytesMut::new();
        msg.encode_into(&mut buf);
        let decoded = Message::decode_from(&mut buf, usize::MAX).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn query_round_trips_without_trailing_count() {
        let msg = Message::Query {
            records: vec![],
            num_queries_in_round: None,
        };
        let mut buf = BytesMut::new();
        msg.encode_into(&mut buf);
        let decoded = Message::decode_from(&mut buf, usize::MAX).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn stop_reply_round_trips() {
        let msg = Message::StopReply { num_updates: 12_345 };
        let mut buf = BytesMut::new();
        msg.encode_into(&mut buf);
        let decoded = Message::decode_from(&mut buf, usize::MAX).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn query_reply_round_trips_with_image() {
        let msg = Message::QueryReply(vec![QueryReplyRecord {
            edge_vec: (7_u64 << 32) | 3,
            tag: 0,
            image: vec![9, 9, 9],
        }]);
        let mut buf = BytesMut::new();
        msg.encode_into(&mut buf);
        let decoded = Message::decode_from(&mut buf, usize::MAX).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn incomplete_frame_yields_none_without_consuming() {
        let msg = Message::Shutdown;
        let mut full = BytesMut::new();
        msg.encode_into(&mut full);
        let mut partial = full.split_to(full.len() - 1);
        let result = Message::decode_from(&mut partial, usize::MAX).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let msg = Message::Batch(vec![Batch::new(1, vec![2, 3]).unwrap()]);
        let mut buf = BytesMut::new();
        msg.encode_into(&mut buf);
        let err = Message::decode_from(&mut buf, 0).unwrap_err();
        assert!(matches!(err, WireError::OversizedFrame { .. }));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        buf.put_u8(200);
        let err = Message::decode_from(&mut buf, usize::MAX).unwrap_err();
        assert_eq!(err, WireError::UnknownTag(200));
    }
}
