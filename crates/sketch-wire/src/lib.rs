// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tag-coded, length-prefixed wire protocol shared by the coordinator,
//! worker and forwarder roles.
//!
//! Every frame is `u32 body_len (BE) || u8 tag || body`. Hot-path bodies
//! (`Batch`, `Delta`, `Query`, its reply) are packed with explicit
//! big-endian integers directly into the caller's buffer via the `bytes`
//! crate — no intermediate allocation, no serde. [`FrameAccumulator`] is the
//! glue a connection handler uses to turn a stream of reads into a stream
//! of complete [`Message`]s.

pub mod error;
pub mod framing;
pub mod message;
pub mod tag;

pub use error::WireError;
pub use framing::FrameAccumulator;
pub use message::{InitPayload, Message, QueryRecord, QueryReplyRecord};
pub use tag::Tag;
