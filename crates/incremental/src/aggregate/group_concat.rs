//! GROUP_CONCAT.

use super::TermAggregator;
use tributary_core::{Error, Result, Term};

/// `GROUP_CONCAT` over literal and IRI values, in arrival order.
///
/// The result keeps a language tag only while every live value carries the
/// same one.
#[derive(Clone, Debug)]
pub struct GroupConcat {
    separator: String,
    values: Vec<(String, Option<String>)>,
}

impl GroupConcat {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            values: Vec::new(),
        }
    }

    fn entry(term: &Term) -> Result<(String, Option<String>)> {
        if let Some(lit) = term.as_literal() {
            return Ok((lit.value().to_string(), lit.language().map(str::to_string)));
        }
        match term.as_iri() {
            Some(iri) => Ok((iri.to_string(), None)),
            None => Err(Error::type_error(format!("GROUP_CONCAT cannot stringify {}", term))),
        }
    }

    fn shared_language(&self) -> Option<&str> {
        let first = self.values.first()?.1.as_deref()?;
        self.values
            .iter()
            .all(|(_, lang)| lang.as_deref() == Some(first))
            .then_some(first)
    }
}

impl TermAggregator for GroupConcat {
    fn put_term(&mut self, term: &Term) -> Result<()> {
        self.values.push(Self::entry(term)?);
        Ok(())
    }

    fn remove_term(&mut self, term: &Term) -> Result<()> {
        let entry = Self::entry(term)?;
        let position = self
            .values
            .iter()
            .position(|v| *v == entry)
            .ok_or_else(|| Error::removal_invariant(format!("{} was never concatenated", term)))?;
        self.values.remove(position);
        Ok(())
    }

    fn result(&self) -> Result<Option<Term>> {
        let joined = self
            .values
            .iter()
            .map(|(value, _)| value.as_str())
            .collect::<Vec<_>>()
            .join(&self.separator);
        Ok(Some(match self.shared_language() {
            Some(lang) => Term::lang(joined, lang),
            None => Term::string(joined),
        }))
    }

    fn empty_value_term(&self) -> Option<Term> {
        Some(Term::string(""))
    }
}
