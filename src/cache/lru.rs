//! Sharded LRU cache with reference-counted handles.
//!
//! Entries live in a per-shard arena; the recency list and the hash
//! index thread `u32` slot indices through each entry instead of
//! pointers. Slot 0 is the sentinel of the circular recency list:
//! `sentinel.prev` is the most recently used entry and `sentinel.next`
//! the least recently used.
//!
//! Every external [`Handle`] contributes exactly one reference to its
//! entry, and the cache holds one more while the entry is in the
//! recency list. An entry is destroyed (its deleter invoked, its slot
//! recycled) when the last reference is dropped. Eviction and `erase`
//! drop only the cache's reference, so pinned entries survive until
//! their holders release them.

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::warn;

use crate::util::crc::crc32;

use super::index::HashIndex;

/// Slot index marker for "no slot".
pub(crate) const NIL: u32 = u32::MAX;

/// The sentinel occupies slot 0 of every arena.
const SENTINEL: u32 = 0;

/// Keys are routed to one of `1 << SHARD_BITS` shards by the top bits
/// of their hash.
const SHARD_BITS: u32 = 4;
const NUM_SHARDS: usize = 1 << SHARD_BITS;

/// Destructor callback for a cache entry.
///
/// Invoked exactly once with the entry's key and the owned value when
/// the last reference is dropped. Runs under the owning shard's mutex,
/// so it must not call back into the same cache.
pub type Deleter<V> = Box<dyn FnOnce(&[u8], V) + Send>;

/// Hash function applied to cache keys.
///
/// CRC32 distributes uniformly; the top bits route to a shard and the
/// low bits index hash buckets within it.
pub(crate) fn hash_key(key: &[u8]) -> u32 {
    crc32(key)
}

/// A cache entry slot.
///
/// Vacant slots (on the free list) and the sentinel keep `value: None`.
pub(crate) struct Entry<V> {
    pub(crate) key: Bytes,
    pub(crate) hash: u32,
    pub(crate) value: Option<V>,
    pub(crate) deleter: Option<Deleter<V>>,
    pub(crate) charge: u64,
    pub(crate) refs: u32,
    pub(crate) prev: u32,
    pub(crate) next: u32,
    pub(crate) next_bucket: u32,
}

impl<V> Entry<V> {
    fn sentinel() -> Self {
        Self {
            key: Bytes::new(),
            hash: 0,
            value: None,
            deleter: None,
            charge: 0,
            refs: 0,
            prev: SENTINEL,
            next: SENTINEL,
            next_bucket: NIL,
        }
    }
}

/// A single LRU partition: capacity, usage, recency list, hash index.
///
/// Callers provide external synchronization.
pub(crate) struct LruShard<V> {
    capacity: u64,
    usage: u64,
    arena: Vec<Entry<V>>,
    free: Vec<u32>,
    index: HashIndex,
}

impl<V> LruShard<V> {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            usage: 0,
            arena: vec![Entry::sentinel()],
            free: Vec::new(),
            index: HashIndex::new(),
        }
    }

    /// Insert an entry, returning a slot with one reference held for
    /// the caller.
    ///
    /// A previous mapping for the same key is displaced, and least
    /// recently used entries are evicted until usage fits the capacity
    /// or the list is empty.
    pub fn insert(
        &mut self,
        key: Bytes,
        hash: u32,
        value: V,
        charge: u64,
        deleter: Option<Deleter<V>>,
    ) -> u32 {
        if charge > self.capacity {
            warn!(
                charge,
                capacity = self.capacity,
                "cache entry charge exceeds shard capacity"
            );
        }

        // One reference for the cache, one for the returned slot.
        let slot = self.alloc(Entry {
            key,
            hash,
            value: Some(value),
            deleter,
            charge,
            refs: 2,
            prev: NIL,
            next: NIL,
            next_bucket: NIL,
        });
        self.list_append(slot);
        self.usage += charge;

        if let Some(old) = self.index.insert(slot, &mut self.arena) {
            self.drop_cache_ref(old);
        }

        while self.usage > self.capacity && self.arena[SENTINEL as usize].next != SENTINEL {
            let oldest = self.arena[SENTINEL as usize].next;
            let (key, hash) = {
                let e = &self.arena[oldest as usize];
                (e.key.clone(), e.hash)
            };
            self.index.remove(key.as_ref(), hash, &mut self.arena);
            self.drop_cache_ref(oldest);
        }

        slot
    }

    /// Look up a key; on a hit the entry gains a reference and moves to
    /// the most recently used position.
    pub fn lookup(&mut self, key: &[u8], hash: u32) -> Option<u32> {
        let slot = self.index.lookup(key, hash, &self.arena)?;
        self.arena[slot as usize].refs += 1;
        self.list_remove(slot);
        self.list_append(slot);
        Some(slot)
    }

    /// Drop one reference to a slot.
    pub fn release(&mut self, slot: u32) {
        self.unref(slot);
    }

    /// Clone out the value behind a live slot.
    pub fn value(&self, slot: u32) -> V
    where
        V: Clone,
    {
        self.arena[slot as usize]
            .value
            .as_ref()
            .expect("handle refers to a live entry")
            .clone()
    }

    /// Remove a key's mapping. The entry is destroyed once its last
    /// holder releases it.
    pub fn erase(&mut self, key: &[u8], hash: u32) {
        if let Some(slot) = self.index.remove(key, hash, &mut self.arena) {
            self.drop_cache_ref(slot);
        }
    }

    /// Remove every entry referenced only by the cache.
    pub fn prune(&mut self) {
        let mut slot = self.arena[SENTINEL as usize].next;
        while slot != SENTINEL {
            let next = self.arena[slot as usize].next;
            if self.arena[slot as usize].refs == 1 {
                let (key, hash) = {
                    let e = &self.arena[slot as usize];
                    (e.key.clone(), e.hash)
                };
                self.index.remove(key.as_ref(), hash, &mut self.arena);
                self.drop_cache_ref(slot);
            }
            slot = next;
        }
    }

    pub fn total_charge(&self) -> u64 {
        self.usage
    }

    /// Release the cache's own reference: unlink from the recency list,
    /// stop charging usage, and drop one reference.
    fn drop_cache_ref(&mut self, slot: u32) {
        self.list_remove(slot);
        self.usage -= self.arena[slot as usize].charge;
        self.unref(slot);
    }

    fn unref(&mut self, slot: u32) {
        let e = &mut self.arena[slot as usize];
        debug_assert!(e.refs > 0);
        e.refs -= 1;
        if e.refs == 0 {
            let key = std::mem::take(&mut e.key);
            let value = e.value.take().expect("destroying an occupied entry");
            let deleter = e.deleter.take();
            e.next_bucket = NIL;
            self.free.push(slot);
            if let Some(deleter) = deleter {
                deleter(key.as_ref(), value);
            }
        }
    }

    /// Link a slot immediately before the sentinel (most recently used).
    fn list_append(&mut self, slot: u32) {
        let tail = self.arena[SENTINEL as usize].prev;
        {
            let e = &mut self.arena[slot as usize];
            e.next = SENTINEL;
            e.prev = tail;
        }
        self.arena[tail as usize].next = slot;
        self.arena[SENTINEL as usize].prev = slot;
    }

    fn list_remove(&mut self, slot: u32) {
        let (prev, next) = {
            let e = &self.arena[slot as usize];
            (e.prev, e.next)
        };
        self.arena[prev as usize].next = next;
        self.arena[next as usize].prev = prev;
        let e = &mut self.arena[slot as usize];
        e.prev = NIL;
        e.next = NIL;
    }

    fn alloc(&mut self, entry: Entry<V>) -> u32 {
        if let Some(slot) = self.free.pop() {
            self.arena[slot as usize] = entry;
            slot
        } else {
            let slot = self.arena.len() as u32;
            self.arena.push(entry);
            slot
        }
    }
}

impl<V> Drop for LruShard<V> {
    fn drop(&mut self) {
        // Entries still in the list hold only the cache reference at
        // this point; run their deleters. Values themselves are freed
        // with the arena.
        let mut slot = self.arena[SENTINEL as usize].next;
        while slot != SENTINEL {
            let e = &mut self.arena[slot as usize];
            let next = e.next;
            debug_assert_eq!(e.refs, 1, "cache dropped with an outstanding handle");
            if let (Some(value), Some(deleter)) = (e.value.take(), e.deleter.take()) {
                let key = std::mem::take(&mut e.key);
                deleter(key.as_ref(), value);
            }
            slot = next;
        }
    }
}

/// An owning reference to a cache entry.
///
/// Each handle accounts for exactly one reference; pass it back to
/// [`LruCache::release`] to drop that reference. Handles are
/// deliberately neither `Clone` nor `Copy`, so a reference cannot be
/// dropped twice.
#[derive(Debug)]
pub struct Handle {
    hash: u32,
    slot: u32,
}

/// A sharded LRU cache for concurrent access.
///
/// The cache is divided into 16 shards to reduce lock contention,
/// routed by the top bits of the key hash. Each shard has its own
/// mutex, recency list, and capacity (`⌈capacity / shards⌉`); no
/// operation takes more than one shard lock.
pub struct LruCache<V> {
    shards: Vec<Mutex<LruShard<V>>>,
    last_id: Mutex<u64>,
}

impl<V> LruCache<V> {
    /// Create a new cache with the given total capacity, split evenly
    /// across the shards.
    pub fn new(capacity: u64) -> Self {
        let per_shard = (capacity + NUM_SHARDS as u64 - 1) / NUM_SHARDS as u64;
        let shards = (0..NUM_SHARDS)
            .map(|_| Mutex::new(LruShard::new(per_shard)))
            .collect();

        Self {
            shards,
            last_id: Mutex::new(0),
        }
    }

    fn shard_for(hash: u32) -> usize {
        (hash >> (32 - SHARD_BITS)) as usize
    }

    /// Insert a value with the given charge, returning a handle to it.
    ///
    /// A previous mapping for the same key loses its cache reference;
    /// entries may be evicted to bring usage back under capacity. The
    /// deleter, if any, runs exactly once when the entry is destroyed.
    pub fn insert(
        &self,
        key: &[u8],
        value: V,
        charge: u64,
        deleter: Option<Deleter<V>>,
    ) -> Handle {
        let hash = hash_key(key);
        let slot = self.shards[Self::shard_for(hash)].lock().insert(
            Bytes::copy_from_slice(key),
            hash,
            value,
            charge,
            deleter,
        );
        Handle { hash, slot }
    }

    /// Look up a key, pinning the entry on a hit.
    pub fn lookup(&self, key: &[u8]) -> Option<Handle> {
        let hash = hash_key(key);
        let slot = self.shards[Self::shard_for(hash)].lock().lookup(key, hash)?;
        Some(Handle { hash, slot })
    }

    /// Drop the reference held by a handle.
    pub fn release(&self, handle: Handle) {
        self.shards[Self::shard_for(handle.hash)]
            .lock()
            .release(handle.slot);
    }

    /// Clone out the value behind a handle.
    pub fn value(&self, handle: &Handle) -> V
    where
        V: Clone,
    {
        self.shards[Self::shard_for(handle.hash)]
            .lock()
            .value(handle.slot)
    }

    /// Remove a key's mapping. Holders of outstanding handles keep the
    /// entry alive until they release it.
    pub fn erase(&self, key: &[u8]) {
        let hash = hash_key(key);
        self.shards[Self::shard_for(hash)].lock().erase(key, hash);
    }

    /// Return a monotonically increasing identifier.
    ///
    /// Clients sharing this cache use it to prefix their keys so they
    /// never collide.
    pub fn new_id(&self) -> u64 {
        let mut id = self.last_id.lock();
        *id += 1;
        *id
    }

    /// Remove every entry not pinned by an outstanding handle.
    pub fn prune(&self) {
        for shard in &self.shards {
            shard.lock().prune();
        }
    }

    /// Sum of charges of all cached entries.
    pub fn total_charge(&self) -> u64 {
        self.shards.iter().map(|s| s.lock().total_charge()).sum()
    }
}
