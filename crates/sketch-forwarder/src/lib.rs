// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The Message Forwarder role: a transparent, tag-preserving relay between
//! one coordinator-facing connection and one worker-facing connection, per
//! spec.md §4.4.

pub mod cli;
pub mod forwarder;

pub use forwarder::Forwarder;
