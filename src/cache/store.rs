//! Structural state of the cache: entries in recency order plus the in-flight map.
//!
//! Everything here runs under the cache's single structural lock, so no method
//! blocks or awaits.

use std::collections::HashMap;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::watch;
use tokio::time::Instant;

/// Receiving side of a pending fetch. Holds `None` until the fetch completes.
pub(crate) type Flight<V, E> = watch::Receiver<Option<Result<V, E>>>;

/// A stored value with its freshness window.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) inserted_at: Instant,
    pub(crate) expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: now,
            expires_at: now + ttl,
        }
    }

    pub(crate) fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Time since the entry was stored.
    pub(crate) fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }
}

/// Result of probing the store for a key.
#[derive(Debug, PartialEq)]
pub(crate) enum Probe<V> {
    Hit(V),
    Expired,
    Absent,
}

pub(crate) struct Store<V, E> {
    entries: LruCache<String, CacheEntry<V>>,
    pub(crate) inflight: HashMap<String, Flight<V, E>>,
    ttl: Duration,
    max_size: usize,
}

impl<V, E> Store<V, E> {
    pub(crate) fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            inflight: HashMap::new(),
            ttl,
            max_size,
        }
    }

    /// Store a freshly fetched value as most recently used.
    ///
    /// Returns the number of least-recently-used entries evicted to stay within capacity.
    pub(crate) fn insert(&mut self, key: String, value: V, now: Instant) -> usize {
        self.entries.put(key, CacheEntry::new(value, now, self.ttl));

        let mut evicted = 0;
        while self.entries.len() > self.max_size {
            match self.entries.pop_lru() {
                Some((old_key, _)) => {
                    tracing::debug!(key = %old_key, "evicted least recently used cache entry");
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    /// Remove every expired entry without touching recency or in-flight state.
    pub(crate) fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.pop(key.as_str());
        }
        expired.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<V: Clone, E> Store<V, E> {
    /// Look up a key, refreshing its recency on a hit.
    ///
    /// An expired entry is removed on the spot.
    pub(crate) fn probe(&mut self, key: &str, now: Instant) -> Probe<V> {
        let live = self
            .entries
            .get(key)
            .map(|entry| entry.is_live(now).then(|| entry.value.clone()));

        match live {
            Some(Some(value)) => Probe::Hit(value),
            Some(None) => {
                if let Some(entry) = self.entries.pop(key) {
                    tracing::debug!(key, age_ms = entry.age(now).as_millis() as u64, "cache entry expired");
                }
                Probe::Expired
            }
            None => Probe::Absent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl_ms: u64, max_size: usize) -> Store<i32, ()> {
        Store::new(Duration::from_millis(ttl_ms), max_size)
    }

    #[test]
    fn test_insert_and_probe() {
        let mut store = store(60_000, 10);
        let now = Instant::now();

        store.insert("key1".to_string(), 100, now);
        assert_eq!(store.probe("key1", now), Probe::Hit(100));
        assert_eq!(store.probe("key2", now), Probe::Absent);
    }

    #[test]
    fn test_expired_entry_is_removed_on_probe() {
        let mut store = store(50, 10);
        let now = Instant::now();

        store.insert("key1".to_string(), 100, now);
        let later = now + Duration::from_millis(50);

        assert_eq!(store.probe("key1", later), Probe::Expired);
        assert_eq!(store.len(), 0);
        assert_eq!(store.probe("key1", later), Probe::Absent);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let mut store = store(60_000, 2);
        let now = Instant::now();

        assert_eq!(store.insert("a".to_string(), 1, now), 0);
        assert_eq!(store.insert("b".to_string(), 2, now), 0);

        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(store.probe("a", now), Probe::Hit(1));
        assert_eq!(store.insert("c".to_string(), 3, now), 1);

        assert_eq!(store.len(), 2);
        assert_eq!(store.probe("b", now), Probe::Absent);
        assert_eq!(store.probe("a", now), Probe::Hit(1));
        assert_eq!(store.probe("c", now), Probe::Hit(3));
    }

    #[test]
    fn test_reinsert_replaces_without_eviction() {
        let mut store = store(60_000, 1);
        let now = Instant::now();

        store.insert("a".to_string(), 1, now);
        assert_eq!(store.insert("a".to_string(), 2, now), 0);
        assert_eq!(store.probe("a", now), Probe::Hit(2));
    }

    #[test]
    fn test_purge_expired() {
        let mut store = store(50, 10);
        let now = Instant::now();

        store.insert("old".to_string(), 1, now);
        store.insert("new".to_string(), 2, now + Duration::from_millis(40));

        let purged = store.purge_expired(now + Duration::from_millis(60));
        assert_eq!(purged, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.probe("new", now + Duration::from_millis(60)),
            Probe::Hit(2)
        );
    }

    #[test]
    fn test_entry_age() {
        let now = Instant::now();
        let entry = CacheEntry::new(1, now, Duration::from_secs(1));
        assert_eq!(entry.age(now + Duration::from_millis(250)), Duration::from_millis(250));
        assert!(entry.is_live(now + Duration::from_millis(999)));
        assert!(!entry.is_live(now + Duration::from_secs(1)));
    }
}
