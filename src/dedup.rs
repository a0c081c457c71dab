//! Sharded insert-if-absent maps keyed by 54-bit board codes.
//!
//! Workers hash a key to one of N shards and take only that shard's lock, so
//! parallel inserts rarely contend. Nothing downstream depends on iteration
//! order of the underlying `HashMap`s.

use std::collections::HashMap;
use std::collections::HashSet;

use parking_lot::Mutex;
use rayon::prelude::*;

fn shard_count() -> usize {
    (num_cpus::get() * 4).next_power_of_two()
}

#[inline]
fn shard_of(key: u64, shards: usize) -> usize {
    let mixed = (key ^ (key >> 29)).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    (mixed >> 40) as usize & (shards - 1)
}

/// Keeps, per key, the smallest batch index that offered it.
///
/// Smallest index wins regardless of thread scheduling, so the survivor of
/// each group is the first one in batch order.
pub struct ShardedFirstSeen {
    shards: Vec<Mutex<HashMap<u64, usize>>>,
}

impl ShardedFirstSeen {
    pub fn new() -> Self {
        Self::with_shards(shard_count())
    }

    /// `shards` is rounded up to a power of two.
    pub fn with_shards(shards: usize) -> Self {
        let n = shards.max(1).next_power_of_two();
        ShardedFirstSeen {
            shards: (0..n).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    pub fn offer(&self, key: u64, index: usize) {
        let mut shard = self.shards[shard_of(key, self.shards.len())].lock();
        shard
            .entry(key)
            .and_modify(|kept| *kept = (*kept).min(index))
            .or_insert(index);
    }

    /// Offers `keys[i]` with index `i` for every `i`, in parallel.
    pub fn offer_all(&self, keys: &[u64]) {
        keys.par_iter().enumerate().for_each(|(i, &k)| self.offer(k, i));
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Surviving indices in ascending order.
    pub fn into_survivors(self) -> Vec<usize> {
        let mut kept: Vec<usize> = self
            .shards
            .into_iter()
            .flat_map(|s| s.into_inner().into_values())
            .collect();
        kept.par_sort_unstable();
        kept
    }
}

impl Default for ShardedFirstSeen {
    fn default() -> Self {
        Self::new()
    }
}

/// Set of keys already admitted; used across chunks of one depth.
pub struct ShardedKeySet {
    shards: Vec<Mutex<HashSet<u64>>>,
}

impl ShardedKeySet {
    pub fn new() -> Self {
        Self::with_shards(shard_count())
    }

    pub fn with_shards(shards: usize) -> Self {
        let n = shards.max(1).next_power_of_two();
        ShardedKeySet {
            shards: (0..n).map(|_| Mutex::new(HashSet::new())).collect(),
        }
    }

    /// True if `key` was not present before.
    pub fn insert(&self, key: u64) -> bool {
        self.shards[shard_of(key, self.shards.len())].lock().insert(key)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.shards[shard_of(key, self.shards.len())].lock().contains(&key)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }
}

impl Default for ShardedKeySet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seen_keeps_smallest_index() {
        let seen = ShardedFirstSeen::with_shards(3);
        seen.offer_all(&[7, 9, 7, 9, 11, 7]);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.into_survivors(), vec![0, 1, 4]);
    }

    #[test]
    fn key_set_admits_once() {
        let set = ShardedKeySet::with_shards(1);
        assert!(set.insert(42));
        assert!(!set.insert(42));
        assert!(set.contains(42));
        assert_eq!(set.len(), 1);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn parallel_inserts_admit_each_key_once() {
        let set = ShardedKeySet::new();
        let admitted: usize = (0..10_000u64)
            .into_par_iter()
            .map(|i| set.insert(i % 1000) as usize)
            .sum();
        assert_eq!(admitted, 1000);
    }
}
