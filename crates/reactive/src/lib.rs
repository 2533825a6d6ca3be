//! Tributary Reactive - live SPARQL results over incremental pipelines.
//!
//! This crate keeps the result of an operator pipeline current. When the
//! pipeline's inputs change, the pipeline emits diffs, and the live query
//! folds them into its result bag and tells subscribers what changed.
//!
//! # Core Concepts
//!
//! - `ChangeSet`: rows that entered and left the result in one batch
//! - `LiveQuery`: drains a diff stream and maintains the current result
//! - `SubscriptionManager`: fans change sets out to callbacks
//!
//! # Example
//!
//! ```rust
//! use futures::executor::block_on;
//! use tributary_core::{Bindings, NumericValue, Term};
//! use tributary_incremental::{filter, ChangeFeed};
//! use tributary_reactive::LiveQueryBuilder;
//!
//! let feed = ChangeFeed::new();
//! let adults = filter(feed.stream(), |row| {
//!     row.get(&"age".into())
//!         .and_then(NumericValue::from_term)
//!         .map_or(false, |age| age.as_f64() >= 18.0)
//! });
//! let mut query = LiveQueryBuilder::new(adults)
//!     .subscribe(|changes| println!("+{} -{}", changes.added.len(), changes.removed.len()))
//!     .build();
//!
//! feed.insert(Bindings::from([("age", Term::integer(25))]));
//! feed.insert(Bindings::from([("age", Term::integer(15))]));
//! feed.close();
//!
//! block_on(query.run_to_end()).unwrap();
//! assert_eq!(query.len(), 1);
//! ```

pub mod change_set;
pub mod live;
pub mod subscription;

pub use change_set::ChangeSet;
pub use live::{LiveQuery, LiveQueryBuilder, QueryState, DEFAULT_BATCH_LIMIT};
pub use subscription::{ChangeCallback, Subscription, SubscriptionId, SubscriptionManager};

// Re-export commonly used types from dependencies
pub use tributary_incremental::{ChangeFeed, DiffRow, DiffStream};
