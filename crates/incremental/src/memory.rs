//! Multiset memories keyed by row hashes.
//!
//! Entries are created on the first addition and destroyed when their count
//! returns to 0. Every mutation compares the stored row with the incoming one,
//! so an imperfect hash oracle surfaces as `HashCollisionInvariant` instead
//! of silently merging two rows.

use hashbrown::HashMap;
use tributary_core::{Bindings, Error, HashKey, Result};

/// A stored row and its multiplicity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryEntry {
    pub value: Bindings,
    pub count: u64,
}

/// A multiset of rows keyed by one hash.
#[derive(Clone, Debug, Default)]
pub struct Multiset {
    entries: HashMap<HashKey, MemoryEntry>,
    total: u64,
}

impl Multiset {
    /// Creates an empty multiset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one occurrence of `value`. Returns the new multiplicity.
    pub fn insert(&mut self, key: HashKey, value: Bindings) -> Result<u64> {
        let entry = self.entries.entry(key).or_insert_with(|| MemoryEntry {
            value: value.clone(),
            count: 0,
        });
        if entry.value != value {
            return Err(Error::hash_collision(key, key));
        }
        entry.count += 1;
        self.total += 1;
        Ok(entry.count)
    }

    /// Removes one occurrence of `value`. Returns the remaining multiplicity.
    pub fn remove(&mut self, key: HashKey, value: &Bindings) -> Result<u64> {
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| Error::removal_invariant(format!("row {} was never added", value)))?;
        if entry.value != *value {
            return Err(Error::hash_collision(key, key));
        }
        entry.count -= 1;
        self.total -= 1;
        let remaining = entry.count;
        if remaining == 0 {
            self.entries.remove(&key);
        }
        Ok(remaining)
    }

    /// Removes one occurrence of an arbitrary row.
    pub fn pop_any(&mut self) -> Option<Bindings> {
        let key = *self.entries.keys().next()?;
        let entry = self.entries.get_mut(&key)?;
        let value = entry.value.clone();
        entry.count -= 1;
        self.total -= 1;
        if entry.count == 0 {
            self.entries.remove(&key);
        }
        Some(value)
    }

    /// Returns the multiplicity stored under `key`.
    pub fn count(&self, key: HashKey) -> u64 {
        self.entries.get(&key).map_or(0, |e| e.count)
    }

    /// Gets the entry stored under `key`.
    pub fn get(&self, key: HashKey) -> Option<&MemoryEntry> {
        self.entries.get(&key)
    }

    /// Returns true if `key` has a positive multiplicity.
    pub fn contains(&self, key: HashKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Iterates over the distinct entries.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.values()
    }

    /// Returns the number of distinct rows.
    #[inline]
    pub fn distinct_len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the sum of all multiplicities.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns true if the multiset is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Releases every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total = 0;
    }
}

/// A multiset keyed by `(full_row_hash, join_key_hash)`.
///
/// Lookup by join key alone returns every row sharing that key, which is
/// what the symmetric hash join probes with.
#[derive(Clone, Debug, Default)]
pub struct DualKeyMultiset {
    by_join_key: HashMap<HashKey, HashMap<HashKey, MemoryEntry>>,
    total: u64,
}

impl DualKeyMultiset {
    /// Creates an empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one occurrence of `value`.
    pub fn insert(
        &mut self,
        full_hash: HashKey,
        join_hash: HashKey,
        value: Bindings,
    ) -> Result<()> {
        let entry = self
            .by_join_key
            .entry(join_hash)
            .or_default()
            .entry(full_hash)
            .or_insert_with(|| MemoryEntry {
                value: value.clone(),
                count: 0,
            });
        if entry.value != value {
            return Err(Error::hash_collision(full_hash, join_hash));
        }
        entry.count += 1;
        self.total += 1;
        Ok(())
    }

    /// Removes one occurrence of `value`; removing a row that is not stored
    /// violates the multiset invariant.
    pub fn remove(
        &mut self,
        full_hash: HashKey,
        join_hash: HashKey,
        value: &Bindings,
    ) -> Result<()> {
        let bucket = self.by_join_key.get_mut(&join_hash);
        let entry = bucket
            .and_then(|b| b.get_mut(&full_hash))
            .ok_or_else(|| Error::removal_invariant(format!("join memory has no row {}", value)))?;
        if entry.value != *value {
            return Err(Error::hash_collision(full_hash, join_hash));
        }
        entry.count -= 1;
        self.total -= 1;
        if entry.count == 0 {
            if let Some(bucket) = self.by_join_key.get_mut(&join_hash) {
                bucket.remove(&full_hash);
                if bucket.is_empty() {
                    self.by_join_key.remove(&join_hash);
                }
            }
        }
        Ok(())
    }

    /// Returns every entry stored under `join_hash`.
    pub fn matches(&self, join_hash: HashKey) -> impl Iterator<Item = &MemoryEntry> {
        self.by_join_key
            .get(&join_hash)
            .into_iter()
            .flat_map(|bucket| bucket.values())
    }

    /// Returns the sum of all multiplicities.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns true if nothing is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_join_key.is_empty()
    }

    /// Releases every entry.
    pub fn clear(&mut self) {
        self.by_join_key.clear();
        self.total = 0;
    }
}
