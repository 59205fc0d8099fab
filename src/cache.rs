//! Bounded LRU cache for closed segments.
//!
//! Unlike a plain LRU map, [`SegmentCache::insert`] hands the evicted value back
//! to the caller: cached segments own open file handles and unsynced state, so the
//! caller must close whatever falls out.

use hashlink::LruCache;
use std::hash::Hash;

/// Capacity-bounded LRU keyed by segment start id.
pub struct SegmentCache<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
    capacity: usize,
}

impl<K: Hash + Eq + Copy, V> SegmentCache<K, V> {
    /// Create a cache holding at most `capacity` values. A capacity of 0 caches nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: LruCache::new(capacity.max(1)),
            capacity,
        }
    }

    /// Maximum number of cached values.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached values.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// True if `key` is cached (does not touch recency).
    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Insert `value` under `key`, returning whatever had to leave the cache.
    ///
    /// The returned value is the previous value for `key`, or the least recently
    /// used entry when the cache was full, or `value` itself when the capacity is 0.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if self.capacity == 0 {
            return Some(value);
        }
        if let Some(old) = self.inner.remove(&key) {
            self.inner.insert(key, value);
            return Some(old);
        }
        let evicted = if self.inner.len() >= self.capacity {
            self.inner.remove_lru().map(|(_, v)| v)
        } else {
            None
        };
        self.inner.insert(key, value);
        evicted
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    /// Remove every entry, least recently used first.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.inner.len());
        while let Some(kv) = self.inner.remove_lru() {
            out.push(kv);
        }
        out
    }
}
