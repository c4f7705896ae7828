//! Error types for host value extraction

/// Result type for typed value extraction
pub type ValueResult<T> = Result<T, ValueError>;

/// Errors raised while reading a typed Rust value out of a [`Value`](crate::Value)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// The value's variant does not fit the requested shape
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// An array had the wrong number of elements for a tuple shape
    #[error("Arity mismatch: expected {expected} elements, got {got}")]
    ArityMismatch {
        /// Expected element count
        expected: usize,
        /// Actual element count
        got: usize,
    },
}

impl ValueError {
    pub(crate) fn mismatch(expected: &str, got: &str) -> Self {
        ValueError::TypeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}
