//! Bounded, LRU-evicting concurrent cache keyed by [`TenantKey`].
//!
//! Generalizes the `DashMap`-backed concurrent-map idiom used throughout this
//! workspace's database layer to a bounded cache with eviction: a `DashMap` holds the
//! values, a `Mutex`-guarded `VecDeque` tracks access order. Every operation takes only
//! these two short critical sections — no I/O is ever performed while either is held.

use crate::types::TenantKey;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

const DEFAULT_MAX_ENTRIES: usize = 1000;

pub struct ServiceCache<V: Clone> {
    entries: DashMap<TenantKey, V>,
    order: Mutex<VecDeque<TenantKey>>,
    max_entries: usize,
}

impl<V: Clone> ServiceCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_entries: if max_entries == 0 { DEFAULT_MAX_ENTRIES } else { max_entries },
        }
    }

    pub fn get(&self, key: &TenantKey) -> Option<V> {
        let value = self.entries.get(key).map(|e| e.clone());
        if value.is_some() {
            self.touch(key);
        }
        value
    }

    pub fn set(&self, key: TenantKey, value: V) {
        let is_new = !self.entries.contains_key(&key);
        self.entries.insert(key.clone(), value);
        self.touch(&key);

        if is_new {
            self.evict_if_over_capacity();
        }
    }

    pub fn delete(&self, key: &TenantKey) {
        self.entries.remove(key);
        if let Ok(mut order) = self.order.lock() {
            order.retain(|k| k != key);
        }
    }

    /// Removes every entry for which `predicate` returns `true`, used by NOTIFY-driven
    /// invalidation to drop all entries belonging to one database at once.
    pub fn delete_matching(&self, predicate: impl Fn(&V) -> bool) {
        let to_remove: Vec<TenantKey> = self
            .entries
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.key().clone())
            .collect();

        for key in to_remove {
            self.delete(&key);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        if let Ok(mut order) = self.order.lock() {
            order.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn touch(&self, key: &TenantKey) {
        if let Ok(mut order) = self.order.lock() {
            order.retain(|k| k != key);
            order.push_back(key.clone());
        }
    }

    fn evict_if_over_capacity(&self) {
        while self.entries.len() > self.max_entries {
            let oldest = {
                let mut order = match self.order.lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                order.pop_front()
            };

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_entry_past_capacity() {
        let cache: ServiceCache<u32> = ServiceCache::new(2);
        cache.set(TenantKey("a".into()), 1);
        cache.set(TenantKey("b".into()), 2);
        cache.set(TenantKey("c".into()), 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&TenantKey("a".into())).is_none());
        assert_eq!(cache.get(&TenantKey("b".into())), Some(2));
        assert_eq!(cache.get(&TenantKey("c".into())), Some(3));
    }

    #[test]
    fn get_refreshes_recency_so_it_survives_eviction() {
        let cache: ServiceCache<u32> = ServiceCache::new(2);
        cache.set(TenantKey("a".into()), 1);
        cache.set(TenantKey("b".into()), 2);
        cache.get(&TenantKey("a".into()));
        cache.set(TenantKey("c".into()), 3);

        assert!(cache.get(&TenantKey("b".into())).is_none());
        assert_eq!(cache.get(&TenantKey("a".into())), Some(1));
    }

    #[test]
    fn delete_matching_removes_only_matching_entries() {
        let cache: ServiceCache<u32> = ServiceCache::new(10);
        cache.set(TenantKey("a".into()), 1);
        cache.set(TenantKey("b".into()), 2);
        cache.delete_matching(|v| *v == 1);

        assert!(cache.get(&TenantKey("a".into())).is_none());
        assert_eq!(cache.get(&TenantKey("b".into())), Some(2));
    }
}
