//! SAMPLE.

use super::TermAggregator;
use std::collections::BTreeMap;
use tributary_core::{Error, Result, Term};

/// `SAMPLE`: some live value. The least one under the default ordering is
/// returned so the choice is stable across replays.
#[derive(Clone, Debug, Default)]
pub struct Sample {
    values: BTreeMap<Term, u64>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TermAggregator for Sample {
    fn put_term(&mut self, term: &Term) -> Result<()> {
        *self.values.entry(term.clone()).or_insert(0) += 1;
        Ok(())
    }

    fn remove_term(&mut self, term: &Term) -> Result<()> {
        let count = self
            .values
            .get_mut(term)
            .ok_or_else(|| Error::removal_invariant(format!("{} was never sampled", term)))?;
        *count -= 1;
        if *count == 0 {
            self.values.remove(term);
        }
        Ok(())
    }

    fn result(&self) -> Result<Option<Term>> {
        Ok(self.values.keys().next().cloned())
    }

    fn empty_value_term(&self) -> Option<Term> {
        None
    }
}
