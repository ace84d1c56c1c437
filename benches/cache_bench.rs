//! Benchmarks for cache and merge performance.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lsmcore::{new_merging_iterator, BytewiseComparator, LruCache, Options, ReadOptions, TableCache, TableWriter};
use tempfile::TempDir;

/// Benchmark cache insert throughput.
fn bench_cache_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_insert");

    for size in [1_000u64, 10_000].iter() {
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let cache: LruCache<u64> = LruCache::new(size);
                for i in 0..size {
                    let key = format!("key{:08}", i);
                    let handle = cache.insert(key.as_bytes(), i, 1, None);
                    cache.release(handle);
                }
                black_box(cache.total_charge())
            });
        });
    }

    group.finish();
}

/// Benchmark cache hit lookups.
fn bench_cache_lookup(c: &mut Criterion) {
    let cache: LruCache<u64> = LruCache::new(10_000);
    let keys: Vec<String> = (0..10_000).map(|i| format!("key{:08}", i)).collect();
    for (i, key) in keys.iter().enumerate() {
        let handle = cache.insert(key.as_bytes(), i as u64, 1, None);
        cache.release(handle);
    }

    let mut group = c.benchmark_group("cache_lookup");
    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("hit", |b| {
        b.iter(|| {
            for key in &keys {
                if let Some(handle) = cache.lookup(key.as_bytes()) {
                    black_box(cache.value(&handle));
                    cache.release(handle);
                }
            }
        });
    });
    group.finish();
}

/// Benchmark a full merged scan over several tables.
fn bench_merged_scan(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let options = Arc::new(Options::default());

    let mut sizes = Vec::new();
    for file_number in 0..4u64 {
        let path = dir.path().join(format!("{:06}.ldb", file_number + 1));
        let mut writer = TableWriter::new(Arc::clone(&options), &path).unwrap();
        for i in 0..2_500u64 {
            // Interleave keys across the four tables
            let key = format!("key{:08}", i * 4 + file_number);
            writer.add(key.as_bytes(), b"value").unwrap();
        }
        sizes.push(writer.finish().unwrap());
    }

    let cache = TableCache::new(dir.path(), options, 32);

    let mut group = c.benchmark_group("merged_scan");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("4_tables", |b| {
        b.iter(|| {
            let children: Vec<_> = (0..4u64)
                .map(|i| cache.new_iterator(&ReadOptions::default(), i + 1, sizes[i as usize]))
                .collect();
            let mut iter = new_merging_iterator(Arc::new(BytewiseComparator::new()), children);

            let mut count = 0u64;
            iter.seek_to_first();
            while iter.valid() {
                count += 1;
                iter.next();
            }
            black_box(count)
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_cache_insert,
    bench_cache_lookup,
    bench_merged_scan
);
criterion_main!(benches);
