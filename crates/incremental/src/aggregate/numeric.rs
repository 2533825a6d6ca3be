//! SUM and AVG.

use super::TermAggregator;
use tributary_core::{Decimal, Error, NumericType, NumericValue, Result, Term};

/// Tally of non-finite floating point values.
///
/// `INF - INF` cannot be undone by subtraction, so infinities and NaN are
/// counted apart from the finite running sum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Specials {
    positive: u64,
    negative: u64,
    nan: u64,
}

impl Specials {
    fn slot(&mut self, value: f64) -> &mut u64 {
        if value.is_nan() {
            &mut self.nan
        } else if value > 0.0 {
            &mut self.positive
        } else {
            &mut self.negative
        }
    }

    fn merged(self, other: Specials) -> Specials {
        Specials {
            positive: self.positive + other.positive,
            negative: self.negative + other.negative,
            nan: self.nan + other.nan,
        }
    }

    /// Applies the tally on top of a finite sum.
    fn apply(self, finite: f64) -> f64 {
        if self.nan > 0 || (self.positive > 0 && self.negative > 0) {
            f64::NAN
        } else if self.positive > 0 {
            f64::INFINITY
        } else if self.negative > 0 {
            f64::NEG_INFINITY
        } else {
            finite
        }
    }
}

/// Running sum and count of numeric terms, split by numeric family.
///
/// Keeping one partial sum per family lets a removal be checked against the
/// family it came from, and lets the result type fall back to a narrower
/// family once the last wider value is removed. Integers and decimals are
/// exact, so adding and then removing a value restores the state bit for bit.
#[derive(Clone, Debug, Default)]
pub struct NumericAccumulator {
    integer_sum: i64,
    decimal_sum: Decimal,
    float_sum: f64,
    double_sum: f64,
    float_specials: Specials,
    double_specials: Specials,
    counts: [u64; 4],
}

fn slot(kind: NumericType) -> usize {
    match kind {
        NumericType::Integer => 0,
        NumericType::Decimal => 1,
        NumericType::Float => 2,
        NumericType::Double => 3,
    }
}

const FAMILIES: [NumericType; 4] = [
    NumericType::Integer,
    NumericType::Decimal,
    NumericType::Float,
    NumericType::Double,
];

impl NumericAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(term: &Term) -> Result<NumericValue> {
        NumericValue::from_term(term)
            .ok_or_else(|| Error::type_error(format!("{} is not a numeric literal", term)))
    }

    /// Adds a numeric term.
    pub fn add(&mut self, term: &Term) -> Result<()> {
        let value = Self::parse(term)?;
        match value {
            NumericValue::Integer(v) => {
                self.integer_sum = self
                    .integer_sum
                    .checked_add(v)
                    .ok_or_else(|| Error::type_error("integer sum overflow"))?;
            }
            NumericValue::Decimal(v) => {
                self.decimal_sum = self
                    .decimal_sum
                    .checked_add(v)
                    .ok_or_else(|| Error::type_error("decimal sum overflow"))?;
            }
            NumericValue::Float(v) if !v.is_finite() => *self.float_specials.slot(v) += 1,
            NumericValue::Double(v) if !v.is_finite() => *self.double_specials.slot(v) += 1,
            NumericValue::Float(v) => self.float_sum += v,
            NumericValue::Double(v) => self.double_sum += v,
        }
        self.counts[slot(value.numeric_type())] += 1;
        Ok(())
    }

    /// Subtracts a numeric term previously added.
    pub fn remove(&mut self, term: &Term) -> Result<()> {
        let value = Self::parse(term)?;
        let kind = value.numeric_type();
        if self.counts[slot(kind)] == 0 {
            return Err(Error::removal_invariant(format!(
                "cannot remove {} from a sum holding no {:?} values",
                term, kind
            )));
        }
        match value {
            NumericValue::Integer(v) => {
                self.integer_sum = self
                    .integer_sum
                    .checked_sub(v)
                    .ok_or_else(|| Error::removal_invariant("integer sum underflow"))?;
            }
            NumericValue::Decimal(v) => {
                self.decimal_sum = self
                    .decimal_sum
                    .checked_sub(v)
                    .ok_or_else(|| Error::removal_invariant("decimal sum underflow"))?;
            }
            NumericValue::Float(v) if !v.is_finite() => {
                Self::take_special(&mut self.float_specials, v, term)?
            }
            NumericValue::Double(v) if !v.is_finite() => {
                Self::take_special(&mut self.double_specials, v, term)?
            }
            NumericValue::Float(v) => self.float_sum -= v,
            NumericValue::Double(v) => self.double_sum -= v,
        }
        self.counts[slot(kind)] -= 1;
        // Drop float residue once a family empties
        match kind {
            NumericType::Float if self.counts[2] == 0 => self.float_sum = 0.0,
            NumericType::Double if self.counts[3] == 0 => self.double_sum = 0.0,
            _ => {}
        }
        Ok(())
    }

    fn take_special(specials: &mut Specials, value: f64, term: &Term) -> Result<()> {
        let count = specials.slot(value);
        if *count == 0 {
            return Err(Error::removal_invariant(format!("{} was never added", term)));
        }
        *count -= 1;
        Ok(())
    }

    /// Number of live values.
    pub fn count(&self) -> u64 {
        self.counts.iter().sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Widest family with a live value.
    pub fn numeric_type(&self) -> Option<NumericType> {
        FAMILIES
            .iter()
            .rev()
            .find(|kind| self.counts[slot(**kind)] > 0)
            .copied()
    }

    fn exact_sum(&self) -> Result<Decimal> {
        Decimal::from(self.integer_sum)
            .checked_add(self.decimal_sum)
            .ok_or_else(|| Error::type_error("decimal sum overflow"))
    }

    fn float_total(&self) -> Result<f64> {
        let exact = NumericValue::Decimal(self.exact_sum()?).as_f64();
        let finite = exact + self.float_sum + self.double_sum;
        Ok(self.float_specials.merged(self.double_specials).apply(finite))
    }

    /// The promoted sum, or None when empty.
    pub fn sum(&self) -> Result<Option<NumericValue>> {
        let kind = match self.numeric_type() {
            Some(kind) => kind,
            None => return Ok(None),
        };
        Ok(Some(match kind {
            NumericType::Integer => NumericValue::Integer(self.integer_sum),
            NumericType::Decimal => NumericValue::Decimal(self.exact_sum()?),
            NumericType::Float => NumericValue::Float(self.float_total()?),
            NumericType::Double => NumericValue::Double(self.float_total()?),
        }))
    }

    /// The promoted mean, or None when empty. A mean of integers is a decimal.
    pub fn mean(&self) -> Result<Option<NumericValue>> {
        let kind = match self.numeric_type() {
            Some(kind) => kind,
            None => return Ok(None),
        };
        let count = self.count();
        Ok(Some(match kind {
            NumericType::Integer | NumericType::Decimal => {
                let mean = self
                    .exact_sum()?
                    .checked_div(Decimal::from(count))
                    .ok_or_else(|| Error::type_error("decimal mean overflow"))?;
                NumericValue::Decimal(mean)
            }
            NumericType::Float => NumericValue::Float(self.float_total()? / count as f64),
            NumericType::Double => NumericValue::Double(self.float_total()? / count as f64),
        }))
    }
}

/// `SUM`; the sum of nothing is `0`.
#[derive(Clone, Debug, Default)]
pub struct Sum {
    acc: NumericAccumulator,
}

impl Sum {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TermAggregator for Sum {
    fn put_term(&mut self, term: &Term) -> Result<()> {
        self.acc.add(term)
    }

    fn remove_term(&mut self, term: &Term) -> Result<()> {
        self.acc.remove(term)
    }

    fn result(&self) -> Result<Option<Term>> {
        Ok(Some(match self.acc.sum()? {
            Some(sum) => sum.to_term(),
            None => Term::integer(0),
        }))
    }

    fn empty_value_term(&self) -> Option<Term> {
        Some(Term::integer(0))
    }
}

/// `AVG`; the mean of nothing is `0`.
#[derive(Clone, Debug, Default)]
pub struct Average {
    acc: NumericAccumulator,
}

impl Average {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TermAggregator for Average {
    fn put_term(&mut self, term: &Term) -> Result<()> {
        self.acc.add(term)
    }

    fn remove_term(&mut self, term: &Term) -> Result<()> {
        self.acc.remove(term)
    }

    fn result(&self) -> Result<Option<Term>> {
        Ok(Some(match self.acc.mean()? {
            Some(mean) => mean.to_term(),
            None => Term::integer(0),
        }))
    }

    fn empty_value_term(&self) -> Option<Term> {
        Some(Term::integer(0))
    }
}
