//! Tributary Core - RDF terms, bindings and shared types for the tributary
//! incremental SPARQL engine.
//!
//! This crate provides the foundational types every incremental operator
//! shares:
//!
//! - `Term`: RDF terms (IRIs, blank nodes, literals) with a default ordering
//! - `Variable` / `Bindings`: solution mappings, the row type of every stream
//! - `BindingsHasher`: the hash oracle keying operator memories
//! - `Operation`: the algebra subset the bind join substitutes into
//! - `Error`: error types for incremental evaluation
//!
//! # Example
//!
//! ```rust
//! use tributary_core::{Bindings, BindingsHasher, CanonicalHasher, Term, Variable};
//!
//! let row = Bindings::from([
//!     ("person", Term::named("http://example.org/alice")),
//!     ("age", Term::integer(42)),
//! ]);
//!
//! assert_eq!(row.get(&Variable::new("age")), Some(&Term::integer(42)));
//!
//! let by_person = [Variable::new("person")];
//! let key = CanonicalHasher.hash(&row, Some(&by_person[..]));
//! assert_eq!(key, CanonicalHasher.hash(&row.project(&by_person), None));
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod algebra;
mod bindings;
mod error;
mod hash;
pub mod numeric;
mod term;

pub use algebra::{Operation, TermPattern, TriplePattern};
pub use bindings::{variables, Bindings, Variable};
pub use error::{Error, Result};
pub use hash::{BindingsHasher, CanonicalHasher, HashKey, SharedHasher};
pub use numeric::{xsd, NumericType, NumericValue};
pub use term::{compare_terms, default_comparator, Literal, Term, TermComparator};

// Exact xsd:decimal arithmetic
pub use rust_decimal::Decimal;
