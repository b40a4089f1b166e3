// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy shared by the coordinator, worker and forwarder crates,
//! plus [`FirstError`], a shared slot used to carry the first failure out of
//! a parallel section (a helper-thread pool, a rayon scope) back to the
//! thread that is waiting on it.

use std::sync::Mutex;

use crate::NodeId;

/// Errors raised by the sketch data model and the roles built on it.
#[derive(Debug, thiserror::Error)]
pub enum SketchError {
    /// A peer sent a frame whose declared length exceeds the configured
    /// `max_msg_size` for the cluster.
    #[error("oversized message: {got} bytes exceeds max_msg_size {max}")]
    OversizedMessage {
        /// The length the peer declared.
        got: usize,
        /// The cluster's configured ceiling.
        max: usize,
    },

    /// A worker received a tag it does not expect in its current state.
    #[error("unexpected message tag {tag} for node {node_idx}")]
    UnexpectedTag {
        /// The offending tag, as its raw wire value.
        tag: u8,
        /// The worker rank the message was addressed to, if known.
        node_idx: u32,
    },

    /// A peer's connection closed (or errored) before a full frame arrived.
    #[error("peer {0} disconnected mid-frame")]
    PeerDisconnected(NodeId),

    /// Underlying I/O failure.
    #[error("i/o error")]
    Io(#[from] std::io::Error),

    /// A wire-format violation surfaced by `sketch-wire`.
    #[error("wire protocol error: {0}")]
    Wire(String),

    /// The cluster was shut down while an operation was in flight.
    #[error("cluster shutting down")]
    ShuttingDown,
}

/// A single-slot box that remembers only the first error reported to it.
///
/// Modeled on the "first error wins" behavior the original implementation
/// gets from an `std::exception_ptr` stashed by whichever OpenMP task fails
/// first: later failures are logged but do not overwrite the slot, so the
/// caller that eventually inspects it sees the error that started the
/// cascade rather than whatever failed last.
#[derive(Debug, Default)]
pub struct FirstError {
    slot: Mutex<Option<SketchError>>,
}

impl FirstError {
    /// Construct an empty slot.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Record `err` if no error has been recorded yet.
    pub fn record(&self, err: SketchError) {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Whether an error has been recorded.
    pub fn is_set(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }

    /// Take the recorded error, if any, leaving the slot empty.
    pub fn take(&self) -> Option<SketchError> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn first_error_keeps_earliest() {
        let slot = FirstError::new();
        slot.record(SketchError::ShuttingDown);
        slot.record(SketchError::PeerDisconnected(7));
        match slot.take() {
            Some(SketchError::ShuttingDown) => {}
            other => panic!("expected ShuttingDown, got {other:?}"),
        }
    }

    #[test]
    fn first_error_empty_by_default() {
        let slot = FirstError::default();
        assert!(!slot.is_set());
        assert!(slot.take().is_none());
    }
}
