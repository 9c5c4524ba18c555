//! Direct-mapped lookup caches for the term table.
//!
//! A cache is a fixed-size slot array indexed by a hash of the lookup key.
//! Collisions simply overwrite; a hit is validated by comparing the stored
//! key before use. The term table clears every cache under its lock when
//! the table itself is cleared, so entries never outlive their data.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

pub struct DirectCache<K, V> {
    slots: Vec<Option<(K, V)>>,
}

impl<K: Hash + Eq, V: Clone> DirectCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        match &self.slots[self.slot(key)] {
            Some((stored, value)) if stored == key => Some(value.clone()),
            _ => None,
        }
    }

    pub fn put(&mut self, key: K, value: V) {
        let idx = self.slot(&key);
        self.slots[idx] = Some((key, value));
    }

    pub fn clear(&mut self) {
        self.slots.fill_with(|| None);
    }

    fn slot(&self, key: &K) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        hasher.finish() as usize % self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_requires_exact_key() {
        let mut cache = DirectCache::new(8);
        cache.put(1u64, "one".to_string());
        assert_eq!(cache.get(&1).as_deref(), Some("one"));
        assert_eq!(cache.get(&2), None);
    }

    #[test]
    fn collisions_overwrite() {
        let mut cache: DirectCache<u64, u64> = DirectCache::new(1);
        cache.put(1, 10);
        cache.put(2, 20);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));
    }

    #[test]
    fn clear_empties_all_slots() {
        let mut cache = DirectCache::new(8);
        for i in 0..8u64 {
            cache.put(i, i);
        }
        cache.clear();
        for i in 0..8u64 {
            assert_eq!(cache.get(&i), None);
        }
    }
}
