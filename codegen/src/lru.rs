//! Bounded least-recently-used map.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Fixed-capacity map that evicts the entry touched longest ago.
///
/// Recency is a monotonically increasing tick stamped on every `get` and
/// `insert`; eviction scans for the smallest stamp.
#[derive(Debug)]
pub struct Lru<K, V> {
    entries: HashMap<K, (V, u64)>,
    capacity: usize,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V> Lru<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: HashMap::with_capacity(capacity), capacity, tick: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Looks up `key` and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let tick = self.next_tick();
        let (value, stamp) = self.entries.get_mut(key)?;
        *stamp = tick;
        Some(value)
    }

    /// Looks up `key` without touching recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key).map(|(value, _)| value)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Inserts or replaces `key`. Returns the entry evicted to make room, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let tick = self.next_tick();
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = (value, tick);
            return None;
        }
        let evicted = if self.entries.len() >= self.capacity { self.evict_oldest() } else { None };
        self.entries.insert(key, (value, tick));
        evicted
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let oldest = self.entries.iter().min_by_key(|(_, (_, stamp))| *stamp).map(|(key, _)| key.clone())?;
        self.entries.remove(&oldest).map(|(value, _)| (oldest, value))
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.remove(key).map(|(value, _)| value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys ordered from least to most recently used.
    pub fn keys_by_recency(&self) -> Vec<K> {
        let mut keys: Vec<_> = self.entries.iter().map(|(key, (_, stamp))| (*stamp, key.clone())).collect();
        keys.sort_unstable_by_key(|(stamp, _)| *stamp);
        keys.into_iter().map(|(_, key)| key).collect()
    }
}
