//! Criterion benchmarks for Python script modules.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use skein_core::BufferDescriptor;
use skein_engine::{Coordinator, CoordinatorConfig};
use skein_python::ScriptSource;

const WRITE_ORDINAL: &str = "\
def initialize():
    pass
def main():
    buffer.write(ordinal(), float(ordinal()))
def finalize():
    pass
";

fn bench_script_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("script_run");
    let source = ScriptSource::from_code("bench_write_ordinal", WRITE_ORDINAL);
    for threads in [1usize, 4] {
        let buffer = BufferDescriptor::zeroed(threads);
        let mut coordinator = Coordinator::new(CoordinatorConfig::default(), &buffer).unwrap();
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

criterion_group!(benches, bench_script_run);
criterion_main!(benches);
