//! Chained hash index over cache arena slots.
//!
//! Buckets hold the head slot of a singly linked chain threaded through
//! each entry's `next_bucket` link, so inserting never allocates a node.
//! The bucket array doubles whenever the element count exceeds it,
//! keeping the average chain length at or below one.

use super::lru::{Entry, NIL};

/// Initial bucket count. Must be a power of two.
const INITIAL_BUCKETS: usize = 4;

/// Hash index mapping (key, hash) to an arena slot.
///
/// The index stores only bucket heads and the element count; entries
/// live in the owning shard's arena, which every operation receives as
/// a parameter. Callers provide external synchronization.
pub(crate) struct HashIndex {
    buckets: Vec<u32>,
    elems: u32,
}

impl HashIndex {
    pub fn new() -> Self {
        Self {
            buckets: vec![NIL; INITIAL_BUCKETS],
            elems: 0,
        }
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.elems as usize
    }

    /// Find the slot holding `key`, if any.
    pub fn lookup<V>(&self, key: &[u8], hash: u32, arena: &[Entry<V>]) -> Option<u32> {
        let mut slot = self.buckets[self.bucket(hash)];
        while slot != NIL {
            let e = &arena[slot as usize];
            if e.hash == hash && e.key.as_ref() == key {
                return Some(slot);
            }
            slot = e.next_bucket;
        }
        None
    }

    /// Link `slot` at the head of its bucket chain.
    ///
    /// If the chain already holds an entry with the same key and hash,
    /// that entry is unlinked and returned; the caller must drop its
    /// cache reference.
    pub fn insert<V>(&mut self, slot: u32, arena: &mut [Entry<V>]) -> Option<u32> {
        let key = arena[slot as usize].key.clone();
        let hash = arena[slot as usize].hash;

        let displaced = self.remove(key.as_ref(), hash, arena);

        let b = self.bucket(hash);
        arena[slot as usize].next_bucket = self.buckets[b];
        self.buckets[b] = slot;
        self.elems += 1;

        if self.elems as usize > self.buckets.len() {
            self.resize(arena);
        }
        displaced
    }

    /// Unlink and return the slot holding `key`, if any.
    pub fn remove<V>(&mut self, key: &[u8], hash: u32, arena: &mut [Entry<V>]) -> Option<u32> {
        let b = self.bucket(hash);
        let mut prev = NIL;
        let mut slot = self.buckets[b];
        while slot != NIL {
            let (matches, next) = {
                let e = &arena[slot as usize];
                (e.hash == hash && e.key.as_ref() == key, e.next_bucket)
            };
            if matches {
                if prev == NIL {
                    self.buckets[b] = next;
                } else {
                    arena[prev as usize].next_bucket = next;
                }
                arena[slot as usize].next_bucket = NIL;
                self.elems -= 1;
                return Some(slot);
            }
            prev = slot;
            slot = next;
        }
        None
    }

    fn bucket(&self, hash: u32) -> usize {
        // Bucket count is a power of two; shard routing uses the top
        // bits, so masking the low bits here stays uncorrelated.
        (hash as usize) & (self.buckets.len() - 1)
    }

    fn resize<V>(&mut self, arena: &mut [Entry<V>]) {
        let mut new_len = INITIAL_BUCKETS;
        while new_len < self.elems as usize {
            new_len *= 2;
        }

        let mut new_buckets = vec![NIL; new_len];
        for b in 0..self.buckets.len() {
            let mut slot = self.buckets[b];
            while slot != NIL {
                let next = arena[slot as usize].next_bucket;
                let nb = (arena[slot as usize].hash as usize) & (new_len - 1);
                arena[slot as usize].next_bucket = new_buckets[nb];
                new_buckets[nb] = slot;
                slot = next;
            }
        }
        self.buckets = new_buckets;
    }
}
