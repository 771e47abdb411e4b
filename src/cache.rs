//! Bounded in-memory caches owned by the engine.
//!
//! [`BoundedCache`] backs both the conversion-result cache and the metadata
//! cache. Entries are kept in insertion order; when an insert pushes the
//! cache over capacity the entry at the front of the order is evicted.
//!
//! Under [`EvictionPolicy::Fifo`] (the default) the order is fixed at first
//! insertion: a hit never moves an entry and re-inserting an existing key
//! replaces its value in place. Under [`EvictionPolicy::Lru`] a hit or a
//! re-insert moves the key to the back.
//!
//! All mutation happens under a single mutex. The lock is never held across
//! an `.await`, so callers on any task can share one cache.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

/// Which entry to drop when the cache is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the oldest-inserted entry; hits do not refresh recency.
    #[default]
    Fifo,
    /// Evict the least-recently-used entry.
    Lru,
}

/// A capacity-bounded map with a configurable eviction order.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    policy: EvictionPolicy,
    state: Mutex<CacheState<K, V>>,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            capacity,
            policy,
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity.min(1024)),
                order: VecDeque::with_capacity(capacity.min(1024)),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        // Every mutation updates entries and order together, so a poisoned
        // state is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up `key`, refreshing its position only under LRU.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.lock();
        let value = state.entries.get(key).cloned()?;
        if self.policy == EvictionPolicy::Lru {
            state.touch(key);
        }
        Some(value)
    }

    /// Insert `value` under `key` and return the evicted key, if any.
    pub fn insert(&self, key: K, value: V) -> Option<K> {
        if self.capacity == 0 {
            return None;
        }
        let mut state = self.lock();
        if state.entries.insert(key.clone(), value).is_some() {
            if self.policy == EvictionPolicy::Lru {
                state.touch(&key);
            }
            return None;
        }
        state.order.push_back(key);
        if state.entries.len() > self.capacity {
            let oldest = state.order.pop_front()?;
            state.entries.remove(&oldest);
            return Some(oldest);
        }
        None
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut state = self.lock();
        let value = state.entries.remove(key)?;
        state.order.retain(|k| k != key);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }

    /// Keys in eviction order (next victim first).
    pub fn keys(&self) -> Vec<K> {
        self.lock().order.iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }
}

impl<K: Eq + Clone, V> CacheState<K, V> {
    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}
