// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Frame accumulation over a byte stream: the glue between a raw socket and
//! [`crate::message::Message::decode_from`].

use bytes::BytesMut;

use crate::error::WireError;
use crate::message::Message;

/// Default read chunk size used by [`FrameAccumulator::fill`] callers.
pub const READ_CHUNK: usize = 64 * 1024;

/// Accumulates bytes read from a stream and peels off complete frames.
///
/// Mirrors the accumulation loop a connection handler runs: read whatever
/// is available into the tail of `buf`, then drain as many complete frames
/// as are now buffered before reading again.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: BytesMut,
}

impl FrameAccumulator {
    /// Construct an empty accumulator.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Append freshly read bytes to the tail of the internal buffer.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pull the next complete frame out of the buffer, if one is present.
    ///
    /// Returns `Ok(None)` when the buffer holds an incomplete frame (the
    /// caller should `feed` more and retry).
    ///
    /// # Errors
    ///
    /// Returns [`WireError`] if the buffered bytes form a malformed or
    /// oversized frame.
    pub fn next_message(&mut self, max_body: usize) -> Result<Option<Message>, WireError> {
        Message::decode_from(&mut self.buf, max_body)
    }

    /// Bytes currently buffered but not yet consumed by a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn drains_multiple_frames_fed_in_one_chunk() {
        let mut encoded = BytesMut::new();
        Message::Stop.encode_into(&mut encoded);
        Message::Shutdown.encode_into(&mut encoded);

        let mut acc = FrameAccumulator::new();
        acc.feed(&encoded);

        assert_eq!(acc.next_message(usize::MAX).unwrap(), Some(Message::Stop));
        assert_eq!(
            acc.next_message(usize::MAX).unwrap(),
            Some(Message::Shutdown)
        );
        assert_eq!(acc.next_message(usize::MAX).unwrap(), None);
        assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn waits_for_split_frame_across_two_feeds() {
        let mut encoded = BytesMut::new();
        Message::Flush.encode_into(&mut encoded);
        let split = encoded.len() / 2;
        let (first, second) = encoded.split_at(split);

        let mut acc = FrameAccumulator::new();
        acc.feed(first);
        assert_eq!(acc.next_message(usize::MAX).unwrap(), None);

        acc.feed(second);
        assert_eq!(acc.next_message(usize::MAX).unwrap(), Some(Message::Flush));
    }
}
