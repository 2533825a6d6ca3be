//! Tributary Incremental - incremental multiset operators for SPARQL.
//!
//! Query results are maintained as live multisets: every operator consumes
//! diff streams of additions and deletions and re-emits diff streams, keeping
//! per-key multiplicities consistent under any interleaving of the two.
//!
//! # Core Concepts
//!
//! - `DiffRow`: a row of bindings tagged with an addition/deletion polarity
//! - `DiffStream`: a pull-based stream of diff rows
//! - `Multiset` / `DualKeyMultiset`: hash-keyed memories with collision checks
//! - `ChangeFeed`: an in-memory, haltable source
//!
//! # Incremental Operators
//!
//! - `filter` / `map` / `project`: polarity-preserving relays
//! - `deduplicate` with a `DistinctFilter`: DISTINCT and REDUCED
//! - `FullHashJoin`: symmetric hash join
//! - `ComputationalBindJoin`: bind join with halt/resume retraction
//! - `GroupBy`: grouped aggregation over `Aggregator`s
//! - `Slice`: ordered and unordered OFFSET/LIMIT windows
//!
//! # Example
//!
//! ```rust
//! use futures::executor::block_on;
//! use futures::StreamExt;
//! use tributary_core::{variables, Bindings, CanonicalHasher, Term};
//! use tributary_incremental::{from_rows, DiffRow, FullHashJoin};
//!
//! let people = from_rows(vec![DiffRow::addition(Bindings::from([
//!     ("person", Term::named("http://example.org/alice")),
//!     ("city", Term::named("http://example.org/paris")),
//! ]))]);
//! let cities = from_rows(vec![DiffRow::addition(Bindings::from([
//!     ("city", Term::named("http://example.org/paris")),
//!     ("name", Term::string("Paris")),
//! ]))]);
//!
//! let join = FullHashJoin::new(people, cities, variables(&["city"]), CanonicalHasher::shared());
//! let output: Vec<DiffRow> = block_on(join.map(|d| d.unwrap()).collect());
//!
//! assert_eq!(output.len(), 1);
//! assert_eq!(output[0].bindings.len(), 3);
//! ```

pub mod aggregate;
pub mod delta;
pub mod memory;
pub mod operators;
pub mod stream;

pub use aggregate::{
    AggregateExpression, AggregateFunction, Aggregator, AggregatorFactory, AggregatorFuture,
    StandardAggregatorFactory, TermAggregator,
};
pub use delta::{DiffBatch, DiffBatchExt, DiffRow};
pub use memory::{DualKeyMultiset, MemoryEntry, Multiset};
pub use operators::{
    deduplicate, filter, filter_diffs, map, map_diffs, project, project_diffs, BindJoinOptions,
    ComputationalBindJoin, DistinctFilter, DistinctFilterFactory, FullHashJoin, GroupBy,
    HashJoinState, JoinSide, OrderedSlice, Slice, SliceStrategy, SliceWindow, SubQueryEvaluator,
    UnorderedSlice,
};
pub use stream::{
    empty, from_bindings, from_rows, fuse_on_error, ChangeFeed, DiffStream, HaltableSource,
    QuerySource,
};
