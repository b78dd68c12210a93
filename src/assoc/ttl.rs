//! TTL-bounded concurrent map
//!
//! The shared primitive behind the association namespaces. Expiry is lazy:
//! an entry past its deadline is dropped by the `get` that finds it, and a
//! later `insert` under the same key simply replaces it.

use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A string-keyed map whose entries evaporate after a per-entry TTL
pub struct TtlMap<V> {
    entries: DashMap<String, Entry<V>>,
}

impl<V: Clone> TtlMap<V> {
    /// Create an empty map
    pub fn new() -> Self {
        TtlMap {
            entries: DashMap::new(),
        }
    }

    /// Look up a live entry. An expired entry is removed and reported as a
    /// miss; a miss is never an error.
    pub fn get(&self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries
                .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        }
        None
    }

    /// Insert or replace an entry with the given time to live
    pub fn insert(&self, key: String, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove an entry, returning its value if it was still live
    pub fn remove(&self, key: &str) -> Option<V> {
        let (_, entry) = self.entries.remove(key)?;
        (entry.expires_at > Instant::now()).then_some(entry.value)
    }

    /// Number of entries, counting not-yet-collected expired ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for TtlMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
