// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reference fixtures for the distributed sketch-update engine: a real
//! (simplified) AGM/L0-sampling [`SketchSupernode`] implementation, an
//! in-memory [`Gutter`], and a ground-truth [`verify::UnionFind`] for
//! integration tests. Nothing in this crate is linked by the coordinator,
//! worker or forwarder binaries — they depend only on the traits in
//! `sketch-core`.

pub mod gutter;
pub mod sketch;
pub mod verify;

pub use gutter::InMemoryGutter;
pub use sketch::{AgmFactory, AgmSupernode};
pub use sketch_core::gutter::Gutter;
pub use sketch_core::supernode::SketchSupernode;
