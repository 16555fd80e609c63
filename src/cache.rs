//! Time-bounded read cache.
//!
//! Entries are stamped when inserted and lazily evicted on read once the TTL
//! has lapsed; there is no background sweep. Every write path in the store
//! invalidates the keys it affects explicitly, so the TTL only bounds
//! staleness from files modified outside the application.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value, evicting it first if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Overwrites any existing entry and restamps it.
    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.lock().remove(key);
    }

    /// Drops every entry whose key matches the predicate.
    pub fn invalidate_if(&self, mut matches: impl FnMut(&K) -> bool) {
        self.entries.lock().retain(|key, _| !matches(key));
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
