// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Errors raised while framing or parsing wire messages.

/// A wire-format violation: a short buffer, an unknown tag, a body whose
/// declared length does not match what its tag requires.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    /// Fewer bytes are buffered than the frame header requires; the caller
    /// should read more and retry, not treat this as malformed input.
    #[error("incomplete frame: need {need} bytes, have {have}")]
    Incomplete {
        /// Bytes required before another decode attempt can succeed.
        need: usize,
        /// Bytes currently buffered.
        have: usize,
    },

    /// The header's tag byte does not match any [`crate::tag::Tag`] variant.
    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    /// A fixed-layout control message's body was the wrong length for its
    /// tag.
    #[error("malformed {tag:?} body: expected {expected} bytes, got {got}")]
    MalformedBody {
        /// The tag whose body failed to parse.
        tag: crate::tag::Tag,
        /// The length that tag's fixed layout requires.
        expected: usize,
        /// The length actually present.
        got: usize,
    },

    /// A declared frame body exceeds the cluster's configured
    /// `max_msg_size`, and is rejected before it is fully read into memory.
    #[error("frame body {got} exceeds max_msg_size {max}")]
    OversizedFrame {
        /// The length the peer declared.
        got: usize,
        /// The cluster's configured ceiling.
        max: usize,
    },
}
