//! Time-bounded cache for collaborator lookups.
//!
//! The chat-list and last-active-chat requests are memoized here instead
//! of through implicit module-level state. The clock is injected so tests
//! can advance time explicitly.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Injected time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock advanced by hand, for tests.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(std::sync::Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Cache entries expire `ttl` after insertion; expired entries read as
/// absent and are dropped on the next write.
pub struct TtlCache<K, V> {
    entries: HashMap<K, (DateTime<Utc>, V)>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create a cache with the given time-to-live and wall-clock time.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache with an injected clock.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            clock,
        }
    }

    /// Get a value if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        self.entries.get(key).and_then(|(inserted_at, value)| {
            if now - *inserted_at < self.ttl {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    /// Insert a value, resetting its expiry.
    pub fn put(&mut self, key: K, value: V) {
        let now = self.clock.now();
        self.entries
            .retain(|_, (inserted_at, _)| now - *inserted_at < self.ttl);
        self.entries.insert(key, (now, value));
    }

    /// Drop one entry.
    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries, including not-yet-evicted expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> (ManualClock, TtlCache<String, u32>) {
        let clock = ManualClock::new(Utc::now());
        let cache = TtlCache::with_clock(Duration::seconds(30), Arc::new(clock.clone()));
        (clock, cache)
    }

    #[test]
    fn test_get_before_expiry() {
        let (_clock, mut cache) = manual();
        cache.put("k".to_string(), 1);
        assert_eq!(cache.get(&"k".to_string()), Some(1));
    }

    #[test]
    fn test_get_after_expiry() {
        let (clock, mut cache) = manual();
        cache.put("k".to_string(), 1);

        clock.advance(Duration::seconds(31));
        assert_eq!(cache.get(&"k".to_string()), None);
    }

    #[test]
    fn test_put_resets_expiry() {
        let (clock, mut cache) = manual();
        cache.put("k".to_string(), 1);

        clock.advance(Duration::seconds(20));
        cache.put("k".to_string(), 2);

        clock.advance(Duration::seconds(20));
        assert_eq!(cache.get(&"k".to_string()), Some(2));
    }

    #[test]
    fn test_invalidate() {
        let (_clock, mut cache) = manual();
        cache.put("k".to_string(), 1);
        cache.invalidate(&"k".to_string());
        assert_eq!(cache.get(&"k".to_string()), None);
    }

    #[test]
    fn test_expired_entries_evicted_on_write() {
        let (clock, mut cache) = manual();
        cache.put("a".to_string(), 1);

        clock.advance(Duration::seconds(31));
        cache.put("b".to_string(), 2);

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let (_clock, mut cache) = manual();
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
