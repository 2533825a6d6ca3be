//! MIN and MAX over an ordered multiset.

use super::TermAggregator;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tributary_core::{Error, Result, Term, TermComparator};

/// A term ordered by a caller-supplied comparator.
#[derive(Clone)]
struct OrderedTerm {
    term: Term,
    comparator: TermComparator,
}

impl PartialEq for OrderedTerm {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedTerm {}

impl PartialOrd for OrderedTerm {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedTerm {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.comparator)(&self.term, &other.term)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtremumKind {
    Min,
    Max,
}

/// `MIN` / `MAX`.
///
/// Only literals are accepted. Once every value has been removed, asking
/// for a result is an `EmptyAggregateExpression` error.
pub struct Extremum {
    kind: ExtremumKind,
    values: BTreeMap<OrderedTerm, u64>,
    comparator: TermComparator,
    seen: bool,
}

impl Extremum {
    pub fn min(comparator: TermComparator) -> Self {
        Self::new(ExtremumKind::Min, comparator)
    }

    pub fn max(comparator: TermComparator) -> Self {
        Self::new(ExtremumKind::Max, comparator)
    }

    fn new(kind: ExtremumKind, comparator: TermComparator) -> Self {
        Self {
            kind,
            values: BTreeMap::new(),
            comparator,
            seen: false,
        }
    }

    fn key(&self, term: &Term) -> Result<OrderedTerm> {
        if !term.is_literal() {
            return Err(Error::type_error(format!(
                "{:?} only accepts literals, got {}",
                self.kind, term
            )));
        }
        Ok(OrderedTerm {
            term: term.clone(),
            comparator: self.comparator.clone(),
        })
    }

    /// Number of distinct live values.
    pub fn distinct_len(&self) -> usize {
        self.values.len()
    }
}

impl TermAggregator for Extremum {
    fn put_term(&mut self, term: &Term) -> Result<()> {
        let key = self.key(term)?;
        *self.values.entry(key).or_insert(0) += 1;
        self.seen = true;
        Ok(())
    }

    fn remove_term(&mut self, term: &Term) -> Result<()> {
        let key = self.key(term)?;
        let count = self
            .values
            .get_mut(&key)
            .ok_or_else(|| Error::removal_invariant(format!("{} was never added", term)))?;
        *count -= 1;
        if *count == 0 {
            self.values.remove(&key);
        }
        Ok(())
    }

    fn result(&self) -> Result<Option<Term>> {
        let entry = match self.kind {
            ExtremumKind::Min => self.values.keys().next(),
            ExtremumKind::Max => self.values.keys().next_back(),
        };
        match entry {
            Some(key) => Ok(Some(key.term.clone())),
            None if self.seen => Err(Error::empty_aggregate(match self.kind {
                ExtremumKind::Min => "MIN",
                ExtremumKind::Max => "MAX",
            })),
            None => Ok(None),
        }
    }

    fn empty_value_term(&self) -> Option<Term> {
        None
    }
}
