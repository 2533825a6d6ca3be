//! Incremental map and project relays.

use crate::delta::{DiffBatch, DiffRow};
use crate::stream::{fuse_on_error, DiffStream};
use futures::TryStreamExt;
use tributary_core::{Bindings, Variable};

/// Applies a mapper function to a batch of diffs.
///
/// Polarity and order annotations are preserved.
pub fn map_diffs<F>(input: &[DiffRow], mapper: F) -> DiffBatch
where
    F: Fn(&Bindings) -> Bindings,
{
    input
        .iter()
        .map(|d| DiffRow {
            bindings: mapper(&d.bindings),
            is_addition: d.is_addition,
            order_index: d.order_index,
        })
        .collect()
}

/// Projects a batch of diffs onto the given variables.
pub fn project_diffs(input: &[DiffRow], variables: &[Variable]) -> DiffBatch {
    map_diffs(input, |b| b.project(variables))
}

/// Maps a diff stream.
pub fn map<F>(input: DiffStream, mapper: F) -> DiffStream
where
    F: Fn(Bindings) -> Bindings + Send + 'static,
{
    fuse_on_error(Box::pin(input.map_ok(move |d| d.map(&mapper))))
}

/// Projects a diff stream. Projection keeps duplicates: two rows that only
/// differ outside `variables` become two copies of the same row.
pub fn project(input: DiffStream, variables: Vec<Variable>) -> DiffStream {
    fuse_on_error(Box::pin(input.map_ok(move |d| d.project(&variables))))
}
