//! COUNT and COUNT(*).

use super::{Aggregator, TermAggregator};
use crate::delta::DiffRow;
use crate::memory::Multiset;
use tributary_core::{Error, Result, SharedHasher, Term};

/// `COUNT(?x)`: number of rows binding the expression.
#[derive(Clone, Debug, Default)]
pub struct Count {
    count: u64,
}

impl Count {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.count
    }
}

fn count_term(count: u64) -> Term {
    Term::integer(count as i64)
}

impl TermAggregator for Count {
    fn put_term(&mut self, _term: &Term) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    fn remove_term(&mut self, term: &Term) -> Result<()> {
        self.count = self.count.checked_sub(1).ok_or_else(|| {
            Error::removal_invariant(format!("COUNT is already 0, cannot remove {}", term))
        })?;
        Ok(())
    }

    fn result(&self) -> Result<Option<Term>> {
        Ok(Some(count_term(self.count)))
    }

    fn empty_value_term(&self) -> Option<Term> {
        Some(count_term(0))
    }
}

/// `COUNT(*)`: counts whole rows, keyed by their full content.
pub struct WildcardCount {
    rows: Multiset,
    hasher: SharedHasher,
    distinct: bool,
}

impl WildcardCount {
    pub fn new(hasher: SharedHasher, distinct: bool) -> Self {
        Self {
            rows: Multiset::new(),
            hasher,
            distinct,
        }
    }

    pub fn get(&self) -> u64 {
        if self.distinct {
            self.rows.distinct_len() as u64
        } else {
            self.rows.total()
        }
    }
}

impl Aggregator for WildcardCount {
    fn put_bindings(&mut self, row: &DiffRow) -> Result<()> {
        let key = self.hasher.hash(&row.bindings, None);
        if row.is_addition {
            self.rows.insert(key, row.bindings.clone())?;
        } else {
            self.rows.remove(key, &row.bindings)?;
        }
        Ok(())
    }

    fn result(&self) -> Result<Option<Term>> {
        Ok(Some(count_term(self.get())))
    }

    fn empty_value_term(&self) -> Option<Term> {
        Some(count_term(0))
    }
}
