//! Static B-tree index benchmarks
//!
//! Measures the operations that dominate segment workloads:
//!
//! - Streaming build of a full index file
//! - Point lookup by key (hit and miss)
//! - Ordinal lookup
//! - Full offset extraction

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::tempdir;

use btindex::{plan, traverse, BtIndex, Entry, IndexBuilder};

fn entries(count: u64) -> Vec<Entry> {
    (0..count)
        .map(|i| Entry::new(i * 2, i.wrapping_mul(0x9E37_79B9_7F4A_7C15), i * 128))
        .collect()
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("btindex_plan");

    for count in [10_000u64, 1_000_000].iter() {
        group.throughput(Throughput::Elements(*count));
        group.bench_with_input(BenchmarkId::new("traverse", count), count, |b, &count| {
            let plan = plan(count, 64).unwrap();
            b.iter(|| traverse(black_box(&plan)).unwrap().count());
        });
    }

    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("btindex_build");

    for count in [1_000u64, 100_000].iter() {
        group.throughput(Throughput::Elements(*count));
        group.bench_with_input(BenchmarkId::new("fanout_64", count), count, |b, &count| {
            let entries = entries(count);
            b.iter_with_setup(
                || Vec::<u8>::with_capacity(1 << 20),
                |mut out| {
                    IndexBuilder::new()
                        .fanout(64)
                        .write_to(&mut out, count, entries.iter().copied())
                        .unwrap();
                    out
                },
            );
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("btindex_lookup");

    for fanout in [16u64, 64, 256].iter() {
        let count = 100_000u64;
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.bt");
        let entries = entries(count);
        IndexBuilder::new()
            .fanout(*fanout)
            .build_from_slice(&path, &entries)
            .unwrap();
        let index = BtIndex::open(&path).unwrap();
        let hit = entries[count as usize / 2].key;

        group.bench_with_input(BenchmarkId::new("existing_key", fanout), fanout, |b, _| {
            b.iter(|| {
                let result = index.lookup(black_box(hit.bucket_hash), black_box(hit.fingerprint));
                black_box(result.is_ok())
            });
        });

        group.bench_with_input(BenchmarkId::new("nonexistent_key", fanout), fanout, |b, _| {
            b.iter(|| {
                let result = index.lookup(black_box(hit.bucket_hash + 1), black_box(0));
                black_box(result.is_ok())
            });
        });

        group.bench_with_input(BenchmarkId::new("ordinal", fanout), fanout, |b, _| {
            b.iter(|| {
                let result = index.ordinal_lookup(black_box(count / 3));
                black_box(result.is_ok())
            });
        });

        drop(index);
        drop(dir);
    }

    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("btindex_extract");

    let count = 100_000u64;
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.bt");
    IndexBuilder::new()
        .fanout(64)
        .build_from_slice(&path, &entries(count))
        .unwrap();
    let index = BtIndex::open(&path).unwrap();

    group.throughput(Throughput::Elements(count));
    group.bench_function("extract_offsets", |b| {
        let _sweep = index.enable_read_ahead().unwrap();
        b.iter(|| index.extract_offsets().unwrap().len());
    });

    group.finish();
}

criterion_group!(benches, bench_plan, bench_build, bench_lookup, bench_extract);
criterion_main!(benches);
