//! Incremental operators over diff streams.
//!
//! This module provides the stateful operators of the engine:
//! - Filter / Map / Project: polarity-preserving relays
//! - Distinct / Reduced: multiplicity filters
//! - Hash join: symmetric join over dual-keyed memories
//! - Bind join: per-binding evaluation with halt/resume retraction
//! - Group by: keyed aggregation with retract-then-assert output
//! - Slice: ordered and unordered windows

mod bind_join;
mod distinct;
mod filter;
mod group;
mod hash_join;
mod map;
mod slice;

pub use bind_join::{BindJoinOptions, ComputationalBindJoin, SubQueryEvaluator};
pub use distinct::{deduplicate, DistinctFilter, DistinctFilterFactory};
pub use filter::{filter, filter_diffs};
pub use group::GroupBy;
pub use hash_join::{FullHashJoin, HashJoinState, JoinSide};
pub use map::{map, map_diffs, project, project_diffs};
pub use slice::{OrderedSlice, Slice, SliceStrategy, SliceWindow, UnorderedSlice};
