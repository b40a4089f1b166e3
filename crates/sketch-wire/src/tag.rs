// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The one-byte tag every wire frame carries.

use crate::error::WireError;

/// Discriminant for the body that follows a frame's length prefix.
///
/// `BuffQueryReply` is a distinct variant from `BuffQuery` rather than a
/// direction flag on one tag: a request/response pair of enum variants is
/// cheaper to get right under the type system than direction-dependent
/// parsing of a single shared tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Cluster configuration sent once to each worker at startup.
    Init = 0,
    /// A group of flushed update batches, distributor to worker.
    Batch = 1,
    /// A group of updated supernode images, worker to distributor.
    Delta = 2,
    /// A chunk of sample requests, coordinator to worker.
    Query = 3,
    /// A request to pre-allocate query-reply handler slots.
    BuffQuery = 4,
    /// The reply to a `BuffQuery`.
    BuffQueryReply = 5,
    /// A forced flush with no payload, used to drain a gutter before a
    /// query barrier.
    Flush = 6,
    /// Pause a worker's processing loop, but keep its state resident.
    Stop = 7,
    /// Tear a worker down permanently.
    Shutdown = 8,
    /// Sample replies, worker to coordinator — kept distinct from `Query`
    /// rather than a direction flag on one tag, same reasoning as
    /// `BuffQuery`/`BuffQueryReply`.
    QueryReply = 9,
    /// The reply to `Stop`: a worker's accumulated update count.
    StopReply = 10,
}

impl Tag {
    /// Decode a tag from its raw wire byte.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownTag`] if `byte` does not match a variant.
    pub fn from_u8(byte: u8) -> Result<Self, WireError> {
        match byte {
            0 => Ok(Self::Init),
            1 => Ok(Self::Batch),
            2 => Ok(Self::Delta),
            3 => Ok(Self::Query),
            4 => Ok(Self::BuffQuery),
            5 => Ok(Self::BuffQueryReply),
            6 => Ok(Self::Flush),
            7 => Ok(Self::Stop),
            8 => Ok(Self::Shutdown),
            9 => Ok(Self::QueryReply),
            10 => Ok(Self::StopReply),
            other => Err(WireError::UnknownTag(other)),
        }
    }

    /// The tag's raw wire byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tag_round_trips() {
        let all = [
            Tag::Init,
            Tag::Batch,
            Tag::Delta,
            Tag::Query,
            Tag::BuffQuery,
            Tag::BuffQueryReply,
            Tag::Flush,
            Tag::Stop,
            Tag::Shutdown,
            Tag::QueryReply,
            Tag::StopReply,
        ];
        for tag in all {
            assert_eq!(Tag::from_u8(tag.as_u8()), Ok(tag));
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(Tag::from_u8(200), Err(WireError::UnknownTag(200)));
    }
}
