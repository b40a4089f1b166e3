// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Loopback-TCP wiring of `sketch-fixtures` to the coordinator and worker
//! roles, per spec.md §8: a [`Harness`] that stands up a whole small
//! cluster in one process, reachable only over `127.0.0.1`, for the demo
//! binary and for integration tests elsewhere in the workspace.

pub mod harness;

pub use harness::Harness;
