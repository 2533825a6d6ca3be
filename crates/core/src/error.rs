//! Error types for tributary.

use alloc::string::String;
use core::fmt;

/// Result type alias for tributary operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types raised while maintaining incremental query results.
///
/// Every variant except [`Error::UnsupportedOperation`] is fatal for the
/// stream that raised it: the operator releases its state and ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A deletion hit an element at multiplicity 0, or a value never observed.
    RemovalInvariant {
        message: String,
    },
    /// A term of the wrong kind reached an aggregator.
    Type {
        message: String,
    },
    /// Two structurally different rows mapped to the same dual hash key.
    HashCollisionInvariant {
        full_hash: u64,
        join_hash: u64,
    },
    /// A row reached an ordered slice without an order annotation.
    MissingOrderContext,
    /// MIN/MAX asked for a result while no positive-multiplicity value remains.
    EmptyAggregateExpression {
        aggregator: String,
    },
    /// The bind-join planner cannot bind across this operation.
    UnsupportedOperation {
        message: String,
    },
    /// A sub-query evaluator failed.
    SubQuery {
        message: String,
    },
    /// Invalid operation.
    InvalidOperation {
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RemovalInvariant { message } => {
                write!(f, "Removal invariant violated: {}", message)
            }
            Error::Type { message } => write!(f, "Type error: {}", message),
            Error::HashCollisionInvariant {
                full_hash,
                join_hash,
            } => write!(
                f,
                "Hash collision: different rows share key ({:#018x}, {:#018x})",
                full_hash, join_hash
            ),
            Error::MissingOrderContext => {
                f.write_str(
                    "Missing order context: ordered slice requires an upstream order operator",
                )
            }
            Error::EmptyAggregateExpression { aggregator } => {
                write!(f, "Empty aggregate expression: {} has no remaining values", aggregator)
            }
            Error::UnsupportedOperation { message } => {
                write!(f, "Unsupported operation: {}", message)
            }
            Error::SubQuery { message } => write!(f, "Sub-query failed: {}", message),
            Error::InvalidOperation { message } => {
                write!(f, "Invalid operation: {}", message)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl Error {
    /// Creates a removal invariant error.
    pub fn removal_invariant(message: impl Into<String>) -> Self {
        Error::RemovalInvariant {
            message: message.into(),
        }
    }

    /// Creates a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type {
            message: message.into(),
        }
    }

    /// Creates a hash collision error.
    pub fn hash_collision(full_hash: u64, join_hash: u64) -> Self {
        Error::HashCollisionInvariant {
            full_hash,
            join_hash,
        }
    }

    /// Creates an empty aggregate expression error.
    pub fn empty_aggregate(aggregator: impl Into<String>) -> Self {
        Error::EmptyAggregateExpression {
            aggregator: aggregator.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedOperation {
            message: message.into(),
        }
    }

    /// Creates a sub-query error.
    pub fn sub_query(message: impl Into<String>) -> Self {
        Error::SubQuery {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns false for errors a planner can recover from by picking
    /// another operator.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::UnsupportedOperation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = Error::removal_invariant("count already 0");
        assert!(err.to_string().contains("count already 0"));

        let err = Error::hash_collision(1, 2);
        assert!(err.to_string().contains("Hash collision"));

        let err = Error::MissingOrderContext;
        assert!(err.to_string().contains("order"));
    }

    #[test]
    fn test_error_fatality() {
        assert!(Error::type_error("not numeric").is_fatal());
        assert!(Error::empty_aggregate("max").is_fatal());
        assert!(!Error::unsupported("GROUP").is_fatal());
    }
}
