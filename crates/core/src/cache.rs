//! Small in-process cache with per-entry TTL and LRU eviction.
//!
//! Shared through `Arc` and injected where needed (feature-flag lookups),
//! never held in a module-level static.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Monotonic counter used as the recency stamp.
    clock: u64,
}

/// Thread-safe map whose entries expire after `ttl` and whose size is
/// bounded by `max_entries` (least recently used entry is evicted first).
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                clock: 0,
            }),
        }
    }

    /// Return a live entry, refreshing its recency. Expired entries are
    /// removed on access.
    pub fn get(&self, key: &K) -> Option<V> {
        let Ok(mut inner) = self.inner.lock() else {
            return None; // Poisoned: behave as a miss.
        };
        inner.clock += 1;
        let stamp = inner.clock;

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                entry.last_used = stamp;
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.clock += 1;
        let stamp = inner.clock;

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_entries {
            let ttl = self.ttl;
            inner.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
            if inner.entries.len() >= self.max_entries {
                let oldest = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    inner.entries.remove(&oldest);
                }
            }
        }

        inner.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                last_used: stamp,
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let cache = TtlCache::new(Duration::from_secs(60), 4);
        assert_eq!(cache.get(&"flag"), None);
        cache.insert("flag", true);
        assert_eq!(cache.get(&"flag"), Some(true));
    }

    #[test]
    fn zero_ttl_never_hits() {
        let cache = TtlCache::new(Duration::ZERO, 4);
        cache.insert("flag", true);
        assert_eq!(cache.get(&"flag"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn overwrite_does_not_evict() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
    }
}
