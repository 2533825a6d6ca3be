//! DISTINCT and REDUCED filters.
//!
//! Both keep `hash -> multiplicity` and let a diff through only when it
//! moves the multiplicity across 0. Excess deletions are clamped at 0 and
//! logged instead of raised.

use crate::delta::DiffRow;
use crate::stream::{fuse_on_error, DiffStream};
use futures::future;
use futures::TryStreamExt;
use hashbrown::HashMap;
use tributary_core::{HashKey, SharedHasher, Variable};

/// A multiplicity filter over full rows (DISTINCT) or a projection (REDUCED).
#[derive(Clone)]
pub struct DistinctFilter {
    counts: HashMap<HashKey, u64>,
    hasher: SharedHasher,
    variables: Option<Vec<Variable>>,
}

impl DistinctFilter {
    /// Keys rows by their full content.
    pub fn distinct(hasher: SharedHasher) -> Self {
        Self {
            counts: HashMap::new(),
            hasher,
            variables: None,
        }
    }

    /// Keys rows by their projection onto `variables`.
    pub fn reduced(hasher: SharedHasher, variables: Vec<Variable>) -> Self {
        Self {
            counts: HashMap::new(),
            hasher,
            variables: Some(variables),
        }
    }

    /// Records `row` and returns true if it must be emitted.
    pub fn run(&mut self, row: &DiffRow) -> bool {
        let key = self.hasher.hash(&row.bindings, self.variables.as_deref());
        if row.is_addition {
            let count = self.counts.entry(key).or_insert(0);
            *count += 1;
            return *count == 1;
        }
        match self.counts.get_mut(&key) {
            Some(count) => {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(&key);
                    true
                } else {
                    false
                }
            }
            None => {
                log::warn!("excess deletion of {} ignored by duplicate filter", row.bindings);
                false
            }
        }
    }

    /// Returns the multiplicity recorded for `key`.
    pub fn count(&self, key: HashKey) -> u64 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    /// Number of keys with positive multiplicity.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Hands out independent filters.
#[derive(Clone)]
pub struct DistinctFilterFactory {
    hasher: SharedHasher,
    variables: Option<Vec<Variable>>,
}

impl DistinctFilterFactory {
    pub fn distinct(hasher: SharedHasher) -> Self {
        Self {
            hasher,
            variables: None,
        }
    }

    pub fn reduced(hasher: SharedHasher, variables: Vec<Variable>) -> Self {
        Self {
            hasher,
            variables: Some(variables),
        }
    }

    /// Creates a filter with fresh state.
    pub fn create(&self) -> DistinctFilter {
        match &self.variables {
            Some(vars) => DistinctFilter::reduced(self.hasher.clone(), vars.clone()),
            None => DistinctFilter::distinct(self.hasher.clone()),
        }
    }
}

/// Applies a duplicate filter to a diff stream.
pub fn deduplicate(input: DiffStream, mut filter: DistinctFilter) -> DiffStream {
    fuse_on_error(Box::pin(
        input.try_filter(move |row| future::ready(filter.run(row))),
    ))
}
