//! In-memory bitmap cache with LRU eviction.
//!
//! Bounded both by item count and by estimated bytes. One mutex guards the
//! index; it is only held for pointer updates, never while a value is built.

use lru::LruCache;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub count: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Node<V> {
    value: V,
    size: usize,
}

struct CacheState<K: Hash + Eq, V> {
    /// Most recently used at the front
    entries: LruCache<K, Node<V>>,
    bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Thread-safe LRU cache with count and byte budgets
pub struct MemoryCache<K: Hash + Eq, V> {
    state: Mutex<CacheState<K, V>>,
    max_items: usize,
    max_bytes: usize,
}

impl<K: Hash + Eq + Clone, V: Clone> MemoryCache<K, V> {
    pub fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_items,
            max_bytes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        // A panic while holding the lock leaves the index consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a value and mark it most recently used
    pub fn try_get(&self, key: &K) -> Option<V> {
        let mut state = self.lock();
        let value = state.entries.get(key).map(|node| node.value.clone());
        if value.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        value
    }

    /// Presence check that leaves the LRU order alone
    pub fn contains(&self, key: &K) -> bool {
        self.lock().entries.contains(key)
    }

    /// Return the cached value or build it with `factory`.
    ///
    /// The factory runs outside the lock, once per call on a miss: two
    /// concurrent misses on the same key both build, and the later insert
    /// replaces the earlier one.
    pub fn get_or_create<E>(
        &self,
        key: K,
        factory: impl FnOnce() -> Result<V, E>,
        size_of: impl FnOnce(&V) -> usize,
    ) -> Result<V, E> {
        if let Some(hit) = self.try_get(&key) {
            return Ok(hit);
        }
        let value = factory()?;
        let size = size_of(&value);
        self.insert(key, value.clone(), size);
        Ok(value)
    }

    /// Insert at the most recently used end, evicting from the other end
    /// until both budgets hold. Values larger than the byte budget are not
    /// cached; returns whether the value was stored.
    pub fn insert(&self, key: K, value: V, size: usize) -> bool {
        if size > self.max_bytes || self.max_items == 0 {
            log::debug!("Not caching {} byte bitmap (budget {})", size, self.max_bytes);
            return false;
        }

        let mut state = self.lock();
        if let Some(old) = state.entries.pop(&key) {
            state.bytes -= old.size;
        }
        while !state.entries.is_empty()
            && (state.entries.len() + 1 > self.max_items || state.bytes + size > self.max_bytes)
        {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    state.bytes -= evicted.size;
                    state.evictions += 1;
                }
                None => break,
            }
        }
        state.bytes += size;
        state.entries.push(key, Node { value, size });
        true
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut state = self.lock();
        let node = state.entries.pop(key)?;
        state.bytes -= node.size;
        Some(node.value)
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.bytes = 0;
    }

    pub fn stats(&self) -> MemoryStats {
        let state = self.lock();
        MemoryStats {
            count: state.entries.len(),
            bytes: state.bytes,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn evicts_least_recently_inserted() {
        let cache = MemoryCache::new(3, usize::MAX);
        cache.insert("a", 1, 1);
        cache.insert("b", 2, 1);
        cache.insert("c", 3, 1);
        cache.insert("d", 4, 1);

        assert!(!cache.contains(&"a"));
        assert!(cache.contains(&"b"));
        assert!(cache.contains(&"d"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn touching_protects_from_eviction() {
        let cache = MemoryCache::new(3, usize::MAX);
        cache.insert("a", 1, 1);
        cache.insert("b", 2, 1);
        cache.insert("c", 3, 1);
        assert_eq!(cache.try_get(&"a"), Some(1));
        cache.insert("d", 4, 1);

        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.stats().count, 3);
    }

    #[test]
    fn byte_budget_evicts_until_it_fits() {
        let cache = MemoryCache::new(100, 100);
        cache.insert(1, "x", 40);
        cache.insert(2, "y", 40);
        cache.insert(3, "z", 50);

        // 40 + 40 + 50 > 100: only the oldest has to go
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert_eq!(cache.stats().bytes, 90);
    }

    #[test]
    fn oversized_values_are_returned_but_not_cached() {
        let cache = MemoryCache::new(10, 100);
        cache.insert(1, "keep", 10);
        assert!(!cache.insert(2, "huge", 101));
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));

        let value: Result<_, ()> = cache.get_or_create(3, || Ok("also huge"), |_| 500);
        assert_eq!(value, Ok("also huge"));
        assert!(!cache.contains(&3));
    }

    #[test]
    fn reinserting_a_key_replaces_its_size() {
        let cache = MemoryCache::new(10, 1000);
        cache.insert("k", 1, 100);
        cache.insert("k", 2, 30);
        let stats = cache.stats();
        assert_eq!((stats.count, stats.bytes), (1, 30));
        assert_eq!(cache.try_get(&"k"), Some(2));
    }

    #[test]
    fn factory_runs_only_on_miss() {
        let cache = MemoryCache::new(10, 1000);
        let calls = AtomicUsize::new(0);
        let build = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(7)
        };

        assert_eq!(cache.get_or_create("k", build, |_| 4), Ok(7));
        assert_eq!(cache.get_or_create("k", build, |_| 4), Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_factory_caches_nothing() {
        let cache: MemoryCache<&str, i32> = MemoryCache::new(10, 1000);
        let result = cache.get_or_create("k", || Err("decode failed"), |_| 4);
        assert_eq!(result, Err("decode failed"));
        assert!(!cache.contains(&"k"));
    }

    #[test]
    fn remove_and_clear_release_bytes() {
        let cache = MemoryCache::new(10, 1000);
        cache.insert(1, 'a', 100);
        cache.insert(2, 'b', 200);
        assert_eq!(cache.remove(&1), Some('a'));
        assert_eq!(cache.stats().bytes, 200);
        cache.clear();
        assert_eq!(
            cache.stats(),
            MemoryStats {
                hits: 0,
                misses: 0,
                evictions: 0,
                ..Default::default()
            }
        );
    }

    #[test]
    fn concurrent_inserts_respect_budgets() {
        let cache = Arc::new(MemoryCache::new(50, 5_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200 {
                        cache.insert(t * 1000 + i, i, 64);
                        let _ = cache.try_get(&(t * 1000 + i / 2));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert!(stats.count <= 50);
        assert!(stats.bytes <= 5_000);
        assert_eq!(stats.bytes, stats.count * 64);
    }
}
