//! Integration tests for complete cache and iteration workflows.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use lsmcore::{
    new_merging_iterator, BytewiseComparator, LruCache, Options, ReadOptions, StorageIterator,
    TableCache, TableWriter,
};
use tempfile::TempDir;

fn table_path(dir: &TempDir, file_number: u64) -> std::path::PathBuf {
    dir.path().join(format!("{:06}.ldb", file_number))
}

fn write_table(path: &std::path::Path, entries: &[(&str, &str)]) -> u64 {
    let mut writer = TableWriter::new(Arc::new(Options::default()), path).unwrap();
    for (key, value) in entries {
        writer.add(key.as_bytes(), value.as_bytes()).unwrap();
    }
    writer.finish().unwrap()
}

fn get_value(cache: &TableCache, file_number: u64, file_size: u64, key: &[u8]) -> Option<Vec<u8>> {
    let mut found = None;
    let wanted = key.to_vec();
    cache
        .get(
            &ReadOptions::default(),
            file_number,
            file_size,
            key,
            &mut |k, v| {
                if k == wanted {
                    found = Some(v.to_vec());
                }
            },
        )
        .unwrap();
    found
}

/// Capacity pressure keeps the cache near its configured size: 200
/// unit-charge inserts against capacity 160 leave at most 160 behind.
#[test]
fn integration_cache_capacity_pressure() {
    let cache: LruCache<u64> = LruCache::new(160);

    for i in 0..200u64 {
        let key = format!("key{:03}", i);
        let handle = cache.insert(key.as_bytes(), i, 1, None);
        cache.release(handle);
    }

    let remaining = cache.total_charge();
    assert!(remaining <= 160, "usage {} above capacity", remaining);
    assert!(remaining > 100, "unexpectedly skewed distribution");
}

/// A deleter runs exactly once, when the last handle goes away, even
/// with erase racing lookups.
#[test]
fn integration_cache_deleter_exactly_once() {
    let cache: LruCache<String> = LruCache::new(100);
    let deletions = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&deletions);
    let insert_handle = cache.insert(
        b"pinned",
        "payload".to_string(),
        1,
        Some(Box::new(move |_key, _value| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
    );

    let lookup_handle = cache.lookup(b"pinned").unwrap();
    assert_eq!(cache.value(&lookup_handle), "payload");

    // Dropping the mapping leaves both handles valid
    cache.erase(b"pinned");
    assert!(cache.lookup(b"pinned").is_none());
    assert_eq!(deletions.load(Ordering::SeqCst), 0);

    cache.release(insert_handle);
    assert_eq!(deletions.load(Ordering::SeqCst), 0);
    cache.release(lookup_handle);
    assert_eq!(deletions.load(Ordering::SeqCst), 1);
}

/// Concurrent threads hammering one cache stay within capacity and
/// never observe a destroyed value.
#[test]
fn integration_cache_concurrent_workload() {
    let cache: Arc<LruCache<String>> = Arc::new(LruCache::new(500));

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..1000u64 {
                    let n = (t * 131 + i) % 300;
                    let key = format!("key{:03}", n);
                    let expected = format!("value{:03}", n);
                    match cache.lookup(key.as_bytes()) {
                        Some(handle) => {
                            assert_eq!(cache.value(&handle), expected);
                            cache.release(handle);
                        }
                        None => {
                            let handle = cache.insert(key.as_bytes(), expected, 1, None);
                            cache.release(handle);
                        }
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert!(cache.total_charge() <= 500);
    cache.prune();
    assert_eq!(cache.total_charge(), 0);
}

/// A table reachable only under its legacy name opens through the
/// fallback, and the second access is served from the cache without
/// touching the file system.
#[test]
fn integration_table_cache_legacy_fallback() {
    let dir = TempDir::new().unwrap();
    let legacy = dir.path().join("000007.sst");
    let size = write_table(&legacy, &[("alpha", "1"), ("beta", "2")]);

    let cache = TableCache::new(dir.path(), Arc::new(Options::default()), 32);
    assert_eq!(get_value(&cache, 7, size, b"alpha"), Some(b"1".to_vec()));

    // Remove the file; the cached reader keeps working, proving no
    // further opens happen.
    std::fs::remove_file(&legacy).unwrap();
    assert_eq!(get_value(&cache, 7, size, b"beta"), Some(b"2".to_vec()));
}

/// Open failures are returned, not cached: producing the file later
/// repairs the read path automatically.
#[test]
fn integration_table_cache_transient_failure_recovers() {
    let dir = TempDir::new().unwrap();
    let cache = TableCache::new(dir.path(), Arc::new(Options::default()), 32);

    let err = cache
        .get(&ReadOptions::default(), 11, 0, b"k", &mut |_, _| {})
        .unwrap_err();
    assert!(err.is_not_found());

    let size = write_table(&table_path(&dir, 11), &[("k", "v")]);
    assert_eq!(get_value(&cache, 11, size, b"k"), Some(b"v".to_vec()));
}

/// Merging two table scans yields the union in order with the
/// documented tie-break, and supports direction changes mid-stream.
#[test]
fn integration_merge_two_tables_bidirectional() {
    let dir = TempDir::new().unwrap();
    let size_a = write_table(&table_path(&dir, 1), &[("1", "a1"), ("3", "a3"), ("5", "a5")]);
    let size_b = write_table(&table_path(&dir, 2), &[("2", "b2"), ("3", "b3"), ("4", "b4")]);

    let cache = TableCache::new(dir.path(), Arc::new(Options::default()), 32);
    let children = vec![
        cache.new_iterator(&ReadOptions::default(), 1, size_a),
        cache.new_iterator(&ReadOptions::default(), 2, size_b),
    ];
    let mut iter = new_merging_iterator(Arc::new(BytewiseComparator::new()), children);

    // Forward pass over the full union
    iter.seek_to_first();
    let mut seen = Vec::new();
    while iter.valid() {
        seen.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    let expected: Vec<(Vec<u8>, Vec<u8>)> = [
        ("1", "a1"),
        ("2", "b2"),
        ("3", "a3"), // equal keys: lower child index first
        ("3", "b3"),
        ("4", "b4"),
        ("5", "a5"),
    ]
    .iter()
    .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
    .collect();
    assert_eq!(seen, expected);

    // Walk forward to "4", then reverse
    iter.seek_to_first();
    for _ in 0..4 {
        iter.next();
    }
    assert_eq!(iter.key(), b"4");
    assert_eq!(iter.value(), b"b4");

    iter.prev();
    assert_eq!(iter.key(), b"3");
    assert_eq!(iter.value(), b"b3"); // higher child index first in reverse
    iter.prev();
    assert_eq!(iter.key(), b"3");
    assert_eq!(iter.value(), b"a3");
    iter.prev();
    assert_eq!(iter.key(), b"2");

    assert!(iter.status().is_ok());
}

/// Reverse traversal of a merge is the mirror of forward traversal.
#[test]
fn integration_merge_reverse_equivalence() {
    let dir = TempDir::new().unwrap();

    let entries_a: Vec<(String, String)> = (0..40)
        .step_by(2)
        .map(|i| (format!("key{:02}", i), format!("a{}", i)))
        .collect();
    let entries_b: Vec<(String, String)> = (1..40)
        .step_by(3)
        .map(|i| (format!("key{:02}", i), format!("b{}", i)))
        .collect();

    let refs_a: Vec<(&str, &str)> = entries_a.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let refs_b: Vec<(&str, &str)> = entries_b.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let size_a = write_table(&table_path(&dir, 1), &refs_a);
    let size_b = write_table(&table_path(&dir, 2), &refs_b);

    let cache = TableCache::new(dir.path(), Arc::new(Options::default()), 32);
    let mut iter = new_merging_iterator(
        Arc::new(BytewiseComparator::new()),
        vec![
            cache.new_iterator(&ReadOptions::default(), 1, size_a),
            cache.new_iterator(&ReadOptions::default(), 2, size_b),
        ],
    );

    let mut forward = Vec::new();
    iter.seek_to_first();
    while iter.valid() {
        forward.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    assert_eq!(forward.len(), entries_a.len() + entries_b.len());

    let mut backward = Vec::new();
    iter.seek_to_last();
    while iter.valid() {
        backward.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.prev();
    }
    backward.reverse();
    assert_eq!(forward, backward);
}

/// Iterators pin their table cache entries; eviction and file
/// deletion cannot pull an open table out from under a scan.
#[test]
fn integration_iterator_survives_eviction() {
    let dir = TempDir::new().unwrap();
    let entries: Vec<(String, String)> = (0..100)
        .map(|i| (format!("key{:03}", i), format!("value{}", i)))
        .collect();
    let refs: Vec<(&str, &str)> = entries.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let size = write_table(&table_path(&dir, 8), &refs);

    let cache = TableCache::new(dir.path(), Arc::new(Options::default()), 32);
    let mut iter = cache.new_iterator(&ReadOptions::default(), 8, size);
    iter.seek_to_first();

    cache.evict(8);
    std::fs::remove_file(table_path(&dir, 8)).unwrap();

    let mut count = 0;
    while iter.valid() {
        count += 1;
        iter.next();
    }
    assert_eq!(count, 100);
    assert!(iter.status().is_ok());
}

/// Many threads reading through one table cache share the open
/// readers and a common block cache.
#[test]
fn integration_concurrent_table_reads() {
    let dir = TempDir::new().unwrap();
    let entries: Vec<(String, String)> = (0..200)
        .map(|i| (format!("key{:03}", i), format!("value{:03}", i)))
        .collect();
    let refs: Vec<(&str, &str)> = entries.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let mut sizes = Vec::new();
    for file_number in 1..=4u64 {
        sizes.push(write_table(&table_path(&dir, file_number), &refs));
    }

    let options = Arc::new(Options {
        block_cache: Some(Arc::new(LruCache::new(1 << 20))),
        ..Options::default()
    });
    let cache = Arc::new(TableCache::new(dir.path(), options, 32));

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let sizes = sizes.clone();
            thread::spawn(move || {
                for i in 0..200u64 {
                    let file_number = 1 + ((t + i) % 4);
                    let n = (t * 37 + i) % 200;
                    let key = format!("key{:03}", n);
                    let expected = format!("value{:03}", n);
                    let mut found = None;
                    cache
                        .get(
                            &ReadOptions::default(),
                            file_number,
                            sizes[(file_number - 1) as usize],
                            key.as_bytes(),
                            &mut |k, v| {
                                if k == key.as_bytes() {
                                    found = Some(v.to_vec());
                                }
                            },
                        )
                        .unwrap();
                    assert_eq!(found, Some(expected.into_bytes()));
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
}
