use std::ops::Index;

use crate::utils::MyHash;

/// Hash-consing storage: a dense array of values chained into buckets.
///
/// Index `0` is a sentinel meaning "no entry", so chains end at `0` and real
/// values start at index `1`. Unlike a fixed-capacity table, this one doubles
/// its bucket array whenever the load factor exceeds two, so the only limit
/// is the index space of `u32`.
pub struct Table<T> {
    data: Vec<T>,
    next: Vec<u32>,
    buckets: Vec<u32>,
    bitmask: u64,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table with `2^bits` buckets.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Storage bits should be in the range 0..=31");

        let buckets_size = 1usize << bits;
        Self {
            // Cell 0 is the sentinel.
            data: vec![T::default()],
            next: vec![0],
            buckets: vec![0; buckets_size],
            bitmask: (buckets_size - 1) as u64,
        }
    }
}

impl<T> Table<T> {
    /// Number of stored values (excluding the sentinel).
    pub fn size(&self) -> usize {
        self.data.len() - 1
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Get the reference to the value at the given index.
    pub fn value(&self, index: usize) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index]
    }

    fn push(&mut self, value: T) -> usize {
        let index = self.data.len();
        assert!(index < i32::MAX as usize, "Storage is full");
        self.data.push(value);
        self.next.push(0);
        index
    }
}

impl<T> Table<T>
where
    T: MyHash + Eq,
{
    fn bucket_index(&self, value: &T) -> usize {
        (value.hash() & self.bitmask) as usize
    }

    /// Append a value without looking for duplicates and return its index.
    ///
    /// Used for nodes that must stay distinct from everything else (terminals).
    pub fn add(&mut self, value: T) -> usize {
        let bucket = self.bucket_index(&value);
        let index = self.push(value);
        self.next[index] = self.buckets[bucket];
        self.buckets[bucket] = index as u32;
        index
    }

    /// Put a value into the table and return its index, reusing an equal value.
    pub fn put(&mut self, value: T) -> usize {
        let bucket = self.bucket_index(&value);
        let mut index = self.buckets[bucket] as usize;
        while index != 0 {
            if self.data[index] == value {
                return index;
            }
            index = self.next[index] as usize;
        }

        let index = self.push(value);
        self.next[index] = self.buckets[bucket];
        self.buckets[bucket] = index as u32;

        if self.size() > 2 * self.buckets.len() {
            self.grow();
        }
        index
    }

    fn grow(&mut self) {
        let size = self.buckets.len() * 2;
        log::debug!("Table: growing to {} buckets for {} values", size, self.size());
        self.buckets = vec![0; size];
        self.bitmask = (size - 1) as u64;
        for index in 1..self.data.len() {
            let bucket = self.bucket_index(&self.data[index]);
            self.next[index] = self.buckets[bucket];
            self.buckets[bucket] = index as u32;
        }
    }
}

impl<T> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.value(index)
    }
}
