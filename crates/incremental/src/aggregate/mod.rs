//! Incremental aggregators.
//!
//! An aggregator folds a diff stream of rows into a single term. Additions
//! go through `put_term`, deletions through `remove_term`; a deletion that
//! the running state cannot account for is a `RemovalInvariant` error.

mod count;
mod extremum;
mod group_concat;
mod numeric;
mod sample;

pub use count::{Count, WildcardCount};
pub use extremum::{Extremum, ExtremumKind};
pub use group_concat::GroupConcat;
pub use numeric::{Average, NumericAccumulator, Sum};
pub use sample::Sample;

use crate::delta::DiffRow;
use core::fmt;
use futures::future::{self, BoxFuture, FutureExt};
use hashbrown::HashMap;
use tributary_core::{
    default_comparator, CanonicalHasher, Error, Result, SharedHasher, Term, TermComparator,
    Variable,
};

/// An aggregator over a diff stream of rows.
pub trait Aggregator: Send {
    /// Folds one diff into the running state.
    fn put_bindings(&mut self, row: &DiffRow) -> Result<()>;

    /// Returns the current aggregate, or None when it is undefined.
    fn result(&self) -> Result<Option<Term>>;

    /// The value of the aggregate over empty input, if it has one.
    fn empty_value_term(&self) -> Option<Term>;
}

/// An aggregator over the values of a single expression.
pub trait TermAggregator: Send {
    fn put_term(&mut self, term: &Term) -> Result<()>;

    fn remove_term(&mut self, term: &Term) -> Result<()>;

    fn result(&self) -> Result<Option<Term>>;

    fn empty_value_term(&self) -> Option<Term>;
}

/// Adapts a [`TermAggregator`] to rows by reading one variable.
///
/// Rows leaving the variable unbound do not contribute.
pub struct ExpressionAggregator<A> {
    variable: Variable,
    inner: A,
}

impl<A: TermAggregator> ExpressionAggregator<A> {
    pub fn new(variable: Variable, inner: A) -> Self {
        Self { variable, inner }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: TermAggregator> Aggregator for ExpressionAggregator<A> {
    fn put_bindings(&mut self, row: &DiffRow) -> Result<()> {
        match row.bindings.get(&self.variable) {
            Some(term) if row.is_addition => self.inner.put_term(term),
            Some(term) => self.inner.remove_term(term),
            None => Ok(()),
        }
    }

    fn result(&self) -> Result<Option<Term>> {
        self.inner.result()
    }

    fn empty_value_term(&self) -> Option<Term> {
        self.inner.empty_value_term()
    }
}

/// DISTINCT modifier: forwards only 0→1 and 1→0 multiplicity transitions.
pub struct DistinctTerms<A> {
    counts: HashMap<Term, u64>,
    inner: A,
}

impl<A: TermAggregator> DistinctTerms<A> {
    pub fn new(inner: A) -> Self {
        Self {
            counts: HashMap::new(),
            inner,
        }
    }
}

impl<A: TermAggregator> TermAggregator for DistinctTerms<A> {
    fn put_term(&mut self, term: &Term) -> Result<()> {
        let count = self.counts.entry(term.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.inner.put_term(term)?;
        }
        Ok(())
    }

    fn remove_term(&mut self, term: &Term) -> Result<()> {
        let count = self
            .counts
            .get_mut(term)
            .ok_or_else(|| {
                Error::removal_invariant(format!("distinct value {} was never added", term))
            })?;
        *count -= 1;
        if *count == 0 {
            self.counts.remove(term);
            self.inner.remove_term(term)?;
        }
        Ok(())
    }

    fn result(&self) -> Result<Option<Term>> {
        self.inner.result()
    }

    fn empty_value_term(&self) -> Option<Term> {
        self.inner.empty_value_term()
    }
}

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    GroupConcat,
    Sample,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::GroupConcat => "GROUP_CONCAT",
            AggregateFunction::Sample => "SAMPLE",
        };
        f.write_str(name)
    }
}

/// One aggregate of a GROUP BY, e.g. `(SUM(DISTINCT ?x) AS ?total)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateExpression {
    pub function: AggregateFunction,
    /// The aggregated variable; None stands for `*`.
    pub expression: Option<Variable>,
    pub distinct: bool,
    /// GROUP_CONCAT separator, `" "` when absent.
    pub separator: Option<String>,
    pub output: Variable,
}

impl AggregateExpression {
    /// Aggregates `variable` into `output`.
    pub fn new(function: AggregateFunction, variable: Variable, output: Variable) -> Self {
        Self {
            function,
            expression: Some(variable),
            distinct: false,
            separator: None,
            output,
        }
    }

    /// `COUNT(*)`.
    pub fn wildcard_count(output: Variable) -> Self {
        Self {
            function: AggregateFunction::Count,
            expression: None,
            distinct: false,
            separator: None,
            output,
        }
    }

    /// Adds the DISTINCT modifier.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }
}

impl fmt::Display for AggregateExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}(", self.function)?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        match &self.expression {
            Some(v) => write!(f, "{}", v)?,
            None => f.write_str("*")?,
        }
        write!(f, ") AS {})", self.output)
    }
}

/// An aggregator under construction.
pub type AggregatorFuture = BoxFuture<'static, Result<Box<dyn Aggregator>>>;

/// Builds aggregators; construction may suspend.
pub trait AggregatorFactory: Send + Sync {
    fn create(&self, expression: &AggregateExpression) -> AggregatorFuture;
}

/// Builds the standard SPARQL aggregators.
#[derive(Clone)]
pub struct StandardAggregatorFactory {
    comparator: TermComparator,
    hasher: SharedHasher,
}

impl Default for StandardAggregatorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardAggregatorFactory {
    pub fn new() -> Self {
        Self {
            comparator: default_comparator(),
            hasher: CanonicalHasher::shared(),
        }
    }

    /// Orders MIN/MAX with a custom comparator.
    pub fn with_comparator(mut self, comparator: TermComparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Keys `COUNT(*)` rows with a custom hash oracle.
    pub fn with_hasher(mut self, hasher: SharedHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Builds an aggregator without suspending.
    pub fn build(&self, expression: &AggregateExpression) -> Result<Box<dyn Aggregator>> {
        let variable = match &expression.expression {
            Some(v) => v.clone(),
            None if expression.function == AggregateFunction::Count => {
                return Ok(Box::new(WildcardCount::new(
                    self.hasher.clone(),
                    expression.distinct,
                )))
            }
            None => {
                return Err(Error::invalid_operation(format!(
                    "{} does not accept a wildcard",
                    expression.function
                )))
            }
        };
        Ok(match expression.function {
            AggregateFunction::Count => wrap(variable, expression.distinct, Count::new()),
            AggregateFunction::Sum => wrap(variable, expression.distinct, Sum::new()),
            AggregateFunction::Avg => wrap(variable, expression.distinct, Average::new()),
            AggregateFunction::Min => wrap(
                variable,
                expression.distinct,
                Extremum::min(self.comparator.clone()),
            ),
            AggregateFunction::Max => wrap(
                variable,
                expression.distinct,
                Extremum::max(self.comparator.clone()),
            ),
            AggregateFunction::GroupConcat => {
                let separator = expression.separator.clone().unwrap_or_else(|| " ".into());
                wrap(variable, expression.distinct, GroupConcat::new(separator))
            }
            AggregateFunction::Sample => wrap(variable, expression.distinct, Sample::new()),
        })
    }
}

fn wrap<A>(variable: Variable, distinct: bool, inner: A) -> Box<dyn Aggregator>
where
    A: TermAggregator + 'static,
{
    if distinct {
        Box::new(ExpressionAggregator::new(variable, DistinctTerms::new(inner)))
    } else {
        Box::new(ExpressionAggregator::new(variable, inner))
    }
}

impl AggregatorFactory for StandardAggregatorFactory {
    fn create(&self, expression: &AggregateExpression) -> AggregatorFuture {
        future::ready(self.build(expression)).boxed()
    }
}
