// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `SendRing`: a two-slot double buffer replacing
//! `message_forwarder.cpp`'s `first_batch`/`batch_buffer` pair — one slot
//! drains into an in-flight send while the caller assembles the next frame
//! into the other, so a forwarder never allocates a fresh buffer per
//! proxied message in steady state.

use bytes::BytesMut;

/// Two [`BytesMut`] slots, alternating which one is "active" (handed to the
/// transport) versus idle (being filled with the next frame).
pub struct SendRing {
    slots: [BytesMut; 2],
    active: usize,
}

impl SendRing {
    /// An empty ring with both slots unallocated.
    pub fn new() -> Self {
        Self {
            slots: [BytesMut::new(), BytesMut::new()],
            active: 0,
        }
    }

    /// Borrow the idle slot, cleared, for the caller to encode the next
    /// frame into.
    pub fn next_buffer(&mut self) -> &mut BytesMut {
        let idle = 1 - self.active;
        self.slots[idle].clear();
        &mut self.slots[idle]
    }

    /// Flip which slot is active and return its bytes, ready to hand to the
    /// transport. The caller must finish writing those bytes out before
    /// calling [`Self::next_buffer`] a second time, exactly as the original
    /// `MPI_Wait`s on the prior send before reusing its buffer.
    pub fn advance(&mut self) -> &[u8] {
        self.active = 1 - self.active;
        &self.slots[self.active]
    }
}

impl Default for SendRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_returns_the_buffer_just_filled() {
        let mut ring = SendRing::new();
        ring.next_buffer().extend_from_slice(b"first");
        assert_eq!(ring.advance(), b"first");
    }

    #[test]
    fn filling_the_idle_slot_never_disturbs_the_active_one() {
        let mut ring = SendRing::new();
        ring.next_buffer().extend_from_slice(b"first");
        let first = ring.advance().to_vec();
        ring.next_buffer().extend_from_slice(b"second");
        assert_eq!(ring.advance(), b"second");
        assert_eq!(first, b"first");
    }
}
