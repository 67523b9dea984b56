//! Criterion benchmarks for `Coordinator::run` with native modules.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use skein_bench::{seeded_buffer, sweep_config, StrideSweep};
use skein_core::BufferDescriptor;
use skein_engine::{Coordinator, CoordinatorConfig};
use skein_module::NativeSource;
use skein_test_utils::SlotWriter;

fn bench_slot_writer(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_writer");
    let source = NativeSource::new(SlotWriter::new(1.0));
    for threads in [1usize, 2, 4, 8] {
        let buffer = BufferDescriptor::zeroed(threads);
        let mut coordinator = Coordinator::new(CoordinatorConfig::default(), &buffer).unwrap();
        // Warm up: spawn the pool before timing.
        coordinator.run(&source, threads).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &n| {
            b.iter(|| {
                let report = coordinator.run(&source, n).unwrap();
                black_box(&report);
            });
        });
    }
    group.finish();
}

fn bench_stride_sweep_64k(c: &mut Criterion) {
    let mut group = c.benchmark_group("stride_sweep_64k");
    let source = NativeSource::new(StrideSweep {
        target: 0.0,
        rate: 0.1,
    });
    let buffer = seeded_buffer(65_536, 42);
    for threads in [1usize, 4, 8] {
        let mut coordinator = Coordinator::new(sweep_config(), &buffer).unwrap();
        coordinator.run(&source, threads).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &n| {
            b.iter(|| {
                let report = coordinator.run(&source, n).unwrap();
                black_box(&report);
            });
        });
    }
    group.finish();
}

fn bench_pool_respawn(c: &mut Criterion) {
    let buffer = BufferDescriptor::zeroed(8);
    let source = NativeSource::new(SlotWriter::new(1.0));
    let mut coordinator = Coordinator::new(CoordinatorConfig::default(), &buffer).unwrap();

    c.bench_function("pool_respawn_4_8", |b| {
        b.iter(|| {
            black_box(coordinator.run(&source, 4).unwrap());
            black_box(coordinator.run(&source, 8).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_slot_writer,
    bench_stride_sweep_64k,
    bench_pool_respawn
);
criterion_main!(benches);
