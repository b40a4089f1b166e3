// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Throughput of the supernode sketch's hot-path operations: applying an
//! update and serializing the resulting image, the two calls a worker's
//! helper pool runs once per batch entry.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sketch_fixtures::{AgmFactory, SketchSupernode};

fn bench_apply(c: &mut Criterion) {
    let factory = AgmFactory::new(1 << 16, 0xC0FF_EE);
    c.bench_function("supernode_apply", |b| {
        let mut node = factory.create(1);
        let mut neighbor: u32 = 0;
        b.iter(|| {
            neighbor = neighbor.wrapping_add(1);
            node.apply(black_box(neighbor));
        });
    });
}

fn bench_serialize(c: &mut Criterion) {
    let factory = AgmFactory::new(1 << 16, 0xC0FF_EE);
    let mut node = factory.create(1);
    for neighbor in 0..4096 {
        node.apply(neighbor);
    }
    c.bench_function("supernode_serialize", |b| {
        b.iter(|| black_box(node.serialize()));
    });
}

criterion_group!(benches, bench_apply, bench_serialize);
criterion_main!(benches);
