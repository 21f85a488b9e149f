//! Direct-mapped computed table for BDD operation memoization.
//!
//! Each key hashes to exactly one slot and collisions overwrite the previous
//! entry. Entries store the full key, so a lookup never returns a result
//! computed for a different operation.

use crate::utils::MyHash;

pub struct Cache<K, V> {
    entries: Vec<Option<(K, V)>>,
    bitmask: u64,
    hits: usize,
    misses: usize,
}

impl<K, V> Cache<K, V> {
    /// Create a new cache with `2^bits` slots.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Cache bits must be in range 0..=31, got {}", bits);

        let size = 1usize << bits;
        let bitmask = (size - 1) as u64;

        Self {
            entries: (0..size).map(|_| None).collect(),
            bitmask,
            hits: 0,
            misses: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        self.entries.fill_with(|| None);
    }
}

impl<K, V> Cache<K, V>
where
    K: MyHash + Eq,
    V: Copy,
{
    fn index(&self, key: &K) -> usize {
        (key.hash() & self.bitmask) as usize
    }

    /// Look up a cached result.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let index = self.index(key);
        match &self.entries[index] {
            Some((k, v)) if k == key => {
                self.hits += 1;
                Some(*v)
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert a result, overwriting whatever occupied the slot.
    pub fn insert(&mut self, key: K, value: V) {
        let index = self.index(&key);
        self.entries[index] = Some((key, value));
    }
}
