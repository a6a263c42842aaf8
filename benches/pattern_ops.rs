//! Pattern Command Benchmarks for kbulk
//!
//! Measures glob matching and the bulk commands against the embedded host
//! for growing numbers of matching keys.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kbulk::host::glob;
use kbulk::host::MemoryHost;
use kbulk::module::Module;
use tokio::runtime::{Builder, Runtime};

fn runtime() -> Runtime {
    Builder::new_current_thread()
        .build()
        .expect("failed to build runtime")
}

/// Fills `host` with `matching` keys under `bench:hit:` and the same number of decoys.
fn populate(host: &MemoryHost, matching: usize) {
    for i in 0..matching {
        host.insert(Bytes::from(format!("bench:hit:{}", i)), Bytes::from("value"));
        host.insert(Bytes::from(format!("bench:miss:{}", i)), Bytes::from("value"));
    }
}

/// Benchmark glob matching on its own
fn bench_glob(c: &mut Criterion) {
    let mut group = c.benchmark_group("glob");
    group.throughput(Throughput::Elements(1));

    let key = b"user:12345:session:abcdef";
    group.bench_function("literal", |b| {
        b.iter(|| glob::matches(black_box(b"user:12345:session:abcdef"), black_box(key)))
    });
    group.bench_function("star", |b| {
        b.iter(|| glob::matches(black_box(b"user:*:session:*"), black_box(key)))
    });
    group.bench_function("class", |b| {
        b.iter(|| glob::matches(black_box(b"user:[0-9]*:session:?bc*"), black_box(key)))
    });

    group.finish();
}

/// Benchmark k.del over growing match sets
fn bench_pattern_delete(c: &mut Criterion) {
    let rt = runtime();
    let module = Module::load("k").expect("namespace");
    let args = [Bytes::from("k.del"), Bytes::from("bench:hit:*")];

    let mut group = c.benchmark_group("pattern_delete");
    for &size in &[10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let host = MemoryHost::new();
                    populate(&host, size);
                    host
                },
                |mut host| rt.block_on(module.execute(&mut host, black_box(&args))),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Benchmark k.set over growing match sets
fn bench_pattern_set(c: &mut Criterion) {
    let rt = runtime();
    let module = Module::load("k").expect("namespace");
    let args = [
        Bytes::from("k.set"),
        Bytes::from("bench:hit:*"),
        Bytes::from("updated"),
    ];

    let mut group = c.benchmark_group("pattern_set");
    for &size in &[10usize, 100, 1_000] {
        let mut host = MemoryHost::new();
        populate(&host, size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| rt.block_on(module.execute(&mut host, black_box(&args))));
        });
    }
    group.finish();
}

/// Benchmark the full self-test
fn bench_self_test(c: &mut Criterion) {
    let rt = runtime();
    let module = Module::load("k").expect("namespace");
    let args = [Bytes::from("k.test")];
    let mut host = MemoryHost::new();

    c.bench_function("self_test", |b| {
        b.iter(|| rt.block_on(module.execute(&mut host, black_box(&args))));
    });
}

criterion_group!(
    benches,
    bench_glob,
    bench_pattern_delete,
    bench_pattern_set,
    bench_self_test
);
criterion_main!(benches);
