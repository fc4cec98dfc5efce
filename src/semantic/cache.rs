//! LRU cache and file signatures for semantic responses
//!
//! Language server answers are cached per session, keyed by the
//! [`FileSignature`] of the file they describe, so an unchanged file is never
//! asked about twice and any edit (new mtime or size) misses the cache.
//!
//! # Thread Safety
//!
//! `LruCache<K, V>` is not synchronized; sessions wrap it in a `Mutex`.

use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Cache key for everything derived from one version of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileSignature {
    pub path: PathBuf,
    /// Modification time in nanoseconds since the epoch
    pub mtime_ns: u128,
    pub size: u64,
}

impl FileSignature {
    /// Read the signature from file metadata.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(Self {
            path: path.to_path_buf(),
            mtime_ns,
            size: meta.len(),
        })
    }
}

/// Cache statistics for monitoring effectiveness
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub size: usize,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// `lru::LruCache` plus hit/miss accounting.
pub struct LruCache<K, V> {
    inner: lru::LruCache<K, V>,
    hits: usize,
    misses: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: lru::LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let found = self.inner.get(key);
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    /// Look up without touching recency or statistics.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.inner.peek(key)
    }

    /// Insert a value, returning the entry evicted to make room, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.inner.contains(&key) {
            self.inner.put(key, value);
            return None;
        }
        self.inner.push(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key)
    }

    /// Remove and return every entry for which `expired` is true.
    pub fn remove_where(&mut self, mut expired: impl FnMut(&K, &V) -> bool) -> Vec<(K, V)> {
        let doomed: Vec<K> = self
            .inner
            .iter()
            .filter(|(k, v)| expired(*k, *v))
            .map(|(k, _)| k.clone())
            .collect();
        doomed
            .into_iter()
            .filter_map(|k| self.inner.pop_entry(&k))
            .collect()
    }

    /// Remove every entry, least recent first.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut entries = Vec::with_capacity(self.inner.len());
        while let Some(entry) = self.inner.pop_lru() {
            entries.push(entry);
        }
        entries
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            size: self.inner.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_cache_basic_operations() {
        let mut cache: LruCache<String, i32> = LruCache::new(3);

        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());

        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(&1));
        assert_eq!(cache.get(&"b".to_string()), Some(&2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_put_returns_evicted_entry() {
        let mut cache: LruCache<&str, i32> = LruCache::new(2);
        assert_eq!(cache.put("a", 1), None);
        assert_eq!(cache.put("b", 2), None);

        // Touch "a" so "b" is least recently used
        cache.get(&"a");
        assert_eq!(cache.put("c", 3), Some(("b", 2)));
        assert_eq!(cache.peek(&"a"), Some(&1));
        assert_eq!(cache.peek(&"b"), None);

        // Updating an existing key never evicts
        assert_eq!(cache.put("a", 10), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_remove_where() {
        let mut cache: LruCache<i32, i32> = LruCache::new(10);
        for i in 0..5 {
            cache.put(i, i * 10);
        }
        let mut removed = cache.remove_where(|_, v| *v >= 30);
        removed.sort();
        assert_eq!(removed, vec![(3, 30), (4, 40)]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_lru_large_capacity_keeps_recent_entries() {
        let mut cache: LruCache<usize, usize> = LruCache::new(65_536);
        for i in 0..100_000 {
            cache.put(i, i);
            // Keep the first key hot
            cache.get(&0);
        }
        assert_eq!(cache.len(), 65_536);
        assert_eq!(cache.capacity(), 65_536);
        assert_eq!(cache.peek(&0), Some(&0));
        assert_eq!(cache.peek(&1), None);
        assert_eq!(cache.peek(&99_999), Some(&99_999));

        let drained = cache.drain();
        assert_eq!(drained.len(), 65_536);
        assert_eq!(drained.last(), Some(&(0, 0)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_stats() {
        let mut cache: LruCache<i32, i32> = LruCache::new(2);
        cache.put(1, 1);
        cache.get(&1);
        cache.get(&2);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_file_signature_tracks_size() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.py");
        std::fs::write(&path, "x = 1\n").unwrap();
        let first = FileSignature::of(&path).unwrap();
        std::fs::write(&path, "x = 12345\n").unwrap();
        let second = FileSignature::of(&path).unwrap();
        assert_ne!(first, second);
        assert_eq!(first.size, 6);
    }
}
