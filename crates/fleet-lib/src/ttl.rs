//! Concurrent key-value cache with per-entry expiry
//!
//! Expired entries are invisible to readers immediately and are physically
//! removed either lazily on access or by [`TtlCache::purge_expired`].

use crate::clock::Clock;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// TTL cache shared between concurrent reconciliation passes
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache whose entries live for `default_ttl` unless told otherwise
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            clock,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a live value
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Whether a live value exists for `key`
    pub fn contains(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map_or(false, |entry| entry.is_live(now))
    }

    /// Insert with the default TTL
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Atomically replace the value for `key` and restart its expiry window
    ///
    /// `f` receives the current live value (if any). The shard holding `key`
    /// stays locked for the duration, so concurrent updates never interleave.
    pub fn update<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let now = self.clock.now();
        let expires_at = now + self.default_ttl;
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let value = f(current.is_live(now).then_some(&current.value));
                occupied.insert(CacheEntry {
                    value: value.clone(),
                    expires_at,
                });
                value
            }
            Entry::Vacant(vacant) => {
                let value = f(None);
                vacant.insert(CacheEntry {
                    value: value.clone(),
                    expires_at,
                });
                value
            }
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Remove everything
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Snapshot of live entries with their remaining lifetime
    pub fn live_entries(&self) -> Vec<(K, V, Duration)> {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|entry| entry.is_live(now))
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value.clone(),
                    entry.expires_at.saturating_duration_since(now),
                )
            })
            .collect()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.iter().filter(|entry| entry.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn cache(ttl_secs: u64) -> (TtlCache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (TtlCache::new(Duration::from_secs(ttl_secs), clock.clone()), clock)
    }

    #[test]
    fn test_entries_expire() {
        let (cache, clock) = cache(60);
        cache.insert("a".into(), 1);
        assert_eq!(cache.get(&"a".into()), Some(1));

        clock.advance(Duration::from_secs(59));
        assert!(cache.contains(&"a".into()));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"a".into()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_update_slides_expiry() {
        let (cache, clock) = cache(60);
        let bump = |v: Option<&u32>| v.copied().unwrap_or(0) + 1;

        assert_eq!(cache.update("k".into(), bump), 1);
        clock.advance(Duration::from_secs(45));
        assert_eq!(cache.update("k".into(), bump), 2);
        clock.advance(Duration::from_secs(45));
        assert_eq!(cache.get(&"k".into()), Some(2));

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.update("k".into(), bump), 1);
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = cache(10);
        cache.insert("short".into(), 1);
        cache.insert_with_ttl("long".into(), 2, Duration::from_secs(100));

        clock.advance(Duration::from_secs(20));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        let live = cache.live_entries();
        assert_eq!(live[0].0, "long");
        assert_eq!(live[0].2, Duration::from_secs(80));
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_increments() {
        let (cache, _clock) = cache(3600);
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        cache.update("hot".into(), |v| v.copied().unwrap_or(0) + 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.get(&"hot".into()), Some(2000));
    }
}
