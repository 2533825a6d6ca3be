//! Incremental filter relay.

use crate::delta::{DiffBatch, DiffRow};
use crate::stream::{fuse_on_error, DiffStream};
use futures::future;
use futures::TryStreamExt;
use tributary_core::Bindings;

/// Applies a filter predicate to a batch of diffs.
///
/// Only diffs whose bindings satisfy the predicate are passed through.
/// Polarity is preserved, so a deletion passes exactly when the matching
/// addition did.
///
/// # Example
///
/// ```ignore
/// let diffs = vec![
///     DiffRow::addition(row(10)),
///     DiffRow::addition(row(5)),
///     DiffRow::deletion(row(20)),
/// ];
/// let filtered = filter_diffs(&diffs, |b| value_of(b) > 8);
/// // Result: [+row(10), -row(20)]
/// ```
pub fn filter_diffs<F>(input: &[DiffRow], predicate: F) -> DiffBatch
where
    F: Fn(&Bindings) -> bool,
{
    input
        .iter()
        .filter(|d| predicate(&d.bindings))
        .cloned()
        .collect()
}

/// Filters a diff stream.
pub fn filter<F>(input: DiffStream, predicate: F) -> DiffStream
where
    F: Fn(&Bindings) -> bool + Send + 'static,
{
    fuse_on_error(Box::pin(
        input.try_filter(move |d| future::ready(predicate(&d.bindings))),
    ))
}
