//! Solution mappings.
//!
//! This module defines `Variable` and `Bindings`, the row type that flows
//! through every operator.

use crate::term::Term;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// A SPARQL variable, stored without its leading `?`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable(String);

impl Variable {
    /// Creates a variable. A leading `?` or `$` is stripped.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.strip_prefix('?').or_else(|| name.strip_prefix('$')) {
            Some(stripped) => Variable(stripped.into()),
            None => Variable(name),
        }
    }

    /// Returns the variable name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Self {
        Variable::new(name)
    }
}

/// An immutable mapping from variables to terms.
///
/// Variables are kept sorted so equality, hashing and iteration do not
/// depend on insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Bindings {
    entries: BTreeMap<Variable, Term>,
}

impl Bindings {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the term bound to a variable.
    pub fn get(&self, variable: &Variable) -> Option<&Term> {
        self.entries.get(variable)
    }

    /// Returns true if the variable is bound.
    pub fn contains(&self, variable: &Variable) -> bool {
        self.entries.contains_key(variable)
    }

    /// Returns a copy with one more binding.
    pub fn with(&self, variable: Variable, term: Term) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(variable, term);
        Self { entries }
    }

    /// Returns a copy without the given variable.
    pub fn without(&self, variable: &Variable) -> Self {
        let mut entries = self.entries.clone();
        entries.remove(variable);
        Self { entries }
    }

    /// Restricts the mapping to the given variables. Unbound variables are
    /// skipped.
    pub fn project(&self, variables: &[Variable]) -> Self {
        let entries = variables
            .iter()
            .filter_map(|v| self.entries.get(v).map(|t| (v.clone(), t.clone())))
            .collect();
        Self { entries }
    }

    /// Returns true if every shared variable is bound to the same term.
    pub fn is_compatible(&self, other: &Bindings) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .entries
            .iter()
            .all(|(v, t)| large.entries.get(v).map_or(true, |o| o == t))
    }

    /// Merges two compatible mappings, or returns None on a conflict.
    pub fn merge(&self, other: &Bindings) -> Option<Bindings> {
        if !self.is_compatible(other) {
            return None;
        }
        let mut entries = self.entries.clone();
        for (v, t) in &other.entries {
            entries.entry(v.clone()).or_insert_with(|| t.clone());
        }
        Some(Self { entries })
    }

    /// Returns the bound variables in order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.entries.keys()
    }

    /// Iterates over `(variable, term)` pairs in variable order.
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.entries.iter()
    }

    /// Returns the number of bound variables.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no variable is bound.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(Variable, Term)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (Variable, Term)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[(&str, Term); N]> for Bindings {
    fn from(pairs: [(&str, Term); N]) -> Self {
        pairs
            .into_iter()
            .map(|(name, term)| (Variable::new(name), term))
            .collect()
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (v, t)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", v, t)?;
        }
        f.write_str("}")
    }
}

/// Collects variables from a slice of names.
pub fn variables(names: &[&str]) -> Vec<Variable> {
    names.iter().map(|n| Variable::new(*n)).collect()
}
