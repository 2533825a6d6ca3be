//! DiffRow type for incremental evaluation.
//!
//! A DiffRow is a row of bindings tagged with a polarity: an addition
//! raises the multiplicity of the row in the represented multiset by one,
//! a deletion lowers it by one.

use tributary_core::{Bindings, Variable};

/// A multiplicity delta over a row of bindings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffRow {
    /// The row being changed
    pub bindings: Bindings,
    /// true for +1, false for -1
    pub is_addition: bool,
    /// Position assigned by an upstream order operator, if any
    pub order_index: Option<u64>,
}

impl DiffRow {
    /// Creates a diff row with the given polarity.
    #[inline]
    pub fn new(bindings: Bindings, is_addition: bool) -> Self {
        Self {
            bindings,
            is_addition,
            order_index: None,
        }
    }

    /// Creates an addition (+1).
    #[inline]
    pub fn addition(bindings: Bindings) -> Self {
        Self::new(bindings, true)
    }

    /// Creates a deletion (-1).
    #[inline]
    pub fn deletion(bindings: Bindings) -> Self {
        Self::new(bindings, false)
    }

    /// Attaches an order annotation.
    #[inline]
    pub fn with_order(mut self, index: u64) -> Self {
        self.order_index = Some(index);
        self
    }

    /// Returns true if this is a deletion.
    #[inline]
    pub fn is_deletion(&self) -> bool {
        !self.is_addition
    }

    /// Returns +1 or -1.
    #[inline]
    pub fn diff(&self) -> i64 {
        if self.is_addition {
            1
        } else {
            -1
        }
    }

    /// Flips the polarity.
    #[inline]
    pub fn negate(self) -> Self {
        Self {
            is_addition: !self.is_addition,
            ..self
        }
    }

    /// Maps the bindings, keeping polarity and order annotation.
    #[inline]
    pub fn map<F>(self, f: F) -> DiffRow
    where
        F: FnOnce(Bindings) -> Bindings,
    {
        DiffRow {
            bindings: f(self.bindings),
            is_addition: self.is_addition,
            order_index: self.order_index,
        }
    }

    /// Restricts the bindings to the given variables.
    pub fn project(self, variables: &[Variable]) -> DiffRow {
        self.map(|b| b.project(variables))
    }
}

/// A row without an explicit flag is an addition.
impl From<Bindings> for DiffRow {
    fn from(bindings: Bindings) -> Self {
        DiffRow::addition(bindings)
    }
}

/// A batch of diff rows.
pub type DiffBatch = Vec<DiffRow>;

/// Extension trait for working with diff batches.
pub trait DiffBatchExt {
    /// Returns the net effect count (additions minus deletions).
    fn net_count(&self) -> i64;
}

impl DiffBatchExt for [DiffRow] {
    fn net_count(&self) -> i64 {
        self.iter().map(DiffRow::diff).sum()
    }
}
