//! Change set for tracking live result changes.
//!
//! A ChangeSet is the net difference between two states of a live result:
//! the rows that entered and the rows that left, each repeated once per
//! unit of multiplicity.

use tributary_incremental::DiffRow;
use tributary_core::Bindings;

/// A set of changes to a live result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Rows that were added to the result
    pub added: Vec<Bindings>,
    /// Rows that were removed from the result
    pub removed: Vec<Bindings>,
}

impl ChangeSet {
    /// Creates a new empty change set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a change set from a slice of diffs.
    ///
    /// An addition and a deletion of the same row inside one batch cancel out.
    pub fn from_diffs(diffs: &[DiffRow]) -> Self {
        let mut changes = Self::new();
        for diff in diffs {
            if diff.is_addition {
                changes.add(diff.bindings.clone());
            } else {
                changes.remove(diff.bindings.clone());
            }
        }
        changes
    }

    /// Creates a change set where every row is an addition.
    pub fn initial(rows: Vec<Bindings>) -> Self {
        Self {
            added: rows,
            removed: Vec::new(),
        }
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Returns the total number of changes.
    #[inline]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    /// Merges another change set into this one.
    pub fn merge(&mut self, other: ChangeSet) {
        for row in other.removed {
            self.remove(row);
        }
        for row in other.added {
            self.add(row);
        }
    }

    /// Records an added row, cancelling a pending removal of it.
    pub fn add(&mut self, row: Bindings) {
        match self.removed.iter().position(|r| *r == row) {
            Some(i) => {
                self.removed.swap_remove(i);
            }
            None => self.added.push(row),
        }
    }

    /// Records a removed row, cancelling a pending addition of it.
    pub fn remove(&mut self, row: Bindings) {
        match self.added.iter().position(|r| *r == row) {
            Some(i) => {
                self.added.swap_remove(i);
            }
            None => self.removed.push(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_core::Term;

    fn make_row(id: i64) -> Bindings {
        Bindings::from([("id", Term::integer(id))])
    }

    #[test]
    fn test_change_set_new() {
        let cs = ChangeSet::new();
        assert!(cs.is_empty());
        assert_eq!(cs.len(), 0);
    }

    #[test]
    fn test_change_set_from_diffs() {
        let diffs = vec![
            DiffRow::addition(make_row(1)),
            DiffRow::addition(make_row(2)),
            DiffRow::deletion(make_row(3)),
        ];

        let cs = ChangeSet::from_diffs(&diffs);
        assert_eq!(cs.added, vec![make_row(1), make_row(2)]);
        assert_eq!(cs.removed, vec![make_row(3)]);
    }

    #[test]
    fn test_change_set_cancels_within_batch() {
        let diffs = vec![
            DiffRow::addition(make_row(1)),
            DiffRow::addition(make_row(1)),
            DiffRow::deletion(make_row(1)),
            DiffRow::deletion(make_row(2)),
            DiffRow::addition(make_row(2)),
        ];

        let cs = ChangeSet::from_diffs(&diffs);
        assert_eq!(cs.added, vec![make_row(1)]);
        assert!(cs.removed.is_empty());
    }

    #[test]
    fn test_change_set_initial() {
        let cs = ChangeSet::initial(vec![make_row(1), make_row(2)]);

        assert_eq!(cs.added.len(), 2);
        assert!(cs.removed.is_empty());
    }

    #[test]
    fn test_change_set_merge() {
        let mut cs1 = ChangeSet::new();
        cs1.add(make_row(1));

        let mut cs2 = ChangeSet::new();
        cs2.add(make_row(2));
        cs2.remove(make_row(3));

        cs1.merge(cs2);

        assert_eq!(cs1.added.len(), 2);
        assert_eq!(cs1.removed.len(), 1);

        let mut undo = ChangeSet::new();
        undo.remove(make_row(1));
        cs1.merge(undo);
        assert_eq!(cs1.added, vec![make_row(2)]);
    }
}
