//! Hash oracle over bindings.
//!
//! Joins, filters, groups and windows key their memories by a hash of a row
//! restricted to a variable subset. The hash must be a pure function of the
//! projected values; structural equality is still checked by the callers,
//! so collisions are detected rather than silently merged.

use crate::bindings::{Bindings, Variable};
use alloc::sync::Arc;
use core::fmt::Write;
use core::hash::Hasher;
use rustc_hash::FxHasher;

/// Hash of a (projected) row.
pub type HashKey = u64;

/// Computes hash keys of bindings.
pub trait BindingsHasher: Send + Sync {
    /// Hashes `bindings` restricted to `variables`, or over every bound
    /// variable when `variables` is None.
    fn hash(&self, bindings: &Bindings, variables: Option<&[Variable]>) -> HashKey;
}

/// Shared handle to a hash oracle.
pub type SharedHasher = Arc<dyn BindingsHasher>;

/// Default oracle: folds the canonical `?var=term` serialization of the row
/// into an `FxHasher`, which is deterministic across runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct CanonicalHasher;

impl CanonicalHasher {
    /// Returns the oracle behind a shared handle.
    pub fn shared() -> SharedHasher {
        Arc::new(CanonicalHasher)
    }
}

struct HashWriter<'a>(&'a mut FxHasher);

impl Write for HashWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.write(s.as_bytes());
        Ok(())
    }
}

impl BindingsHasher for CanonicalHasher {
    fn hash(&self, bindings: &Bindings, variables: Option<&[Variable]>) -> HashKey {
        let mut hasher = FxHasher::default();
        let mut out = HashWriter(&mut hasher);
        match variables {
            Some(vars) => {
                for var in vars {
                    match bindings.get(var) {
                        Some(term) => {
                            let _ = write!(out, "{}={};", var, term);
                        }
                        // Unbound still contributes its position
                        None => {
                            let _ = write!(out, "{}=;", var);
                        }
                    }
                }
            }
            None => {
                for (var, term) in bindings.iter() {
                    let _ = write!(out, "{}={};", var, term);
                }
            }
        }
        hasher.finish()
    }
}
