//! Bridge error types
//!
//! Every foreign exception is captured at the handle boundary and returned
//! as one of the [`BridgeError`] kinds below. Raw `PyErr` values never reach
//! the host.

use pyo3::prelude::*;
use pyo3::types::PyTracebackMethods;
use serpent_sdk::ValueError;
use std::fmt;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// A foreign exception captured while the runtime lock was held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignException {
    /// Exception class name, e.g. `ZeroDivisionError`
    pub type_name: String,
    /// `str()` of the exception value
    pub message: String,
    /// Formatted traceback, if the exception carried one
    pub traceback: Option<String>,
}

impl ForeignException {
    /// Capture a `PyErr`. Must be called with the runtime lock held.
    pub fn capture(py: Python<'_>, err: &PyErr) -> Self {
        let type_name = err
            .get_type_bound(py)
            .getattr("__name__")
            .and_then(|name| name.extract::<String>())
            .unwrap_or_else(|_| "<unknown>".to_string());
        let message = err.value_bound(py).to_string();
        let traceback = err
            .traceback_bound(py)
            .and_then(|tb| tb.format().ok());
        Self {
            type_name,
            message,
            traceback,
        }
    }

    /// Build an exception record that did not come from a raised `PyErr`
    pub fn synthetic(type_name: &str, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.to_string(),
            message: message.into(),
            traceback: None,
        }
    }
}

impl fmt::Display for ForeignException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

/// Errors surfaced by the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The interpreter could not be prepared (search path, bootstrap)
    #[error("Runtime setup failed: {0}")]
    RuntimeSetup(String),

    /// Module import failed
    #[error("Module not found: {name} ({exception})")]
    ModuleNotFound {
        /// Module name that was requested
        name: String,
        /// Exception raised by the import machinery
        exception: ForeignException,
    },

    /// Class attribute absent or not callable
    #[error("Class not found: {class} in module {module}")]
    ClassNotFound {
        /// Module searched
        module: String,
        /// Class name requested
        class: String,
    },

    /// Constructor raised
    #[error("Failed to construct {class}: {exception}")]
    Construction {
        /// Class being instantiated
        class: String,
        /// Exception raised by the constructor
        exception: ForeignException,
    },

    /// Method attribute absent or not callable
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Plain attribute absent
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    /// Call raised
    #[error("Call to {method} failed: {exception}")]
    Invocation {
        /// Method or function name
        method: String,
        /// Exception raised by the call
        exception: ForeignException,
    },

    /// A host value did not fit the requested shape
    #[error("Unsupported type: expected {expected}, got {got}")]
    UnsupportedType {
        /// Expected shape
        expected: String,
        /// Actual shape
        got: String,
    },

    /// A foreign value has no host representation
    #[error("Cannot convert foreign {type_name}: {reason}")]
    Conversion {
        /// Foreign type name
        type_name: String,
        /// Why the conversion failed
        reason: String,
    },

    /// Required configuration key missing
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// `write` called on a state created without `write_method`
    #[error("State is not writable: no write_method configured")]
    WriteNotConfigured,

    /// No state registered under the name
    #[error("State not found: {0}")]
    StateNotFound(String),

    /// A state is already registered under the name
    #[error("State already exists: {0}")]
    StateAlreadyExists(String),

    /// Termination hook raised
    #[error("Termination failed: {exception}")]
    Termination {
        /// Exception raised by the hook
        exception: ForeignException,
    },

    /// Operation on a terminated state
    #[error("State is already terminated")]
    AlreadyTerminated,

    /// Pickling the live instance failed
    #[error("Serialization failed: {exception}")]
    Serialization {
        /// Exception raised by the serializer
        exception: ForeignException,
    },

    /// Restoring a snapshot failed; the target was left untouched
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Reading or writing a snapshot stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True for the terminated-state sentinel
    pub fn is_already_terminated(&self) -> bool {
        matches!(self, BridgeError::AlreadyTerminated)
    }

    /// The captured foreign exception, when this error wraps one
    pub fn exception(&self) -> Option<&ForeignException> {
        match self {
            BridgeError::ModuleNotFound { exception, .. }
            | BridgeError::Construction { exception, .. }
            | BridgeError::Invocation { exception, .. }
            | BridgeError::Termination { exception }
            | BridgeError::Serialization { exception } => Some(exception),
            _ => None,
        }
    }
}

impl From<ValueError> for BridgeError {
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::TypeMismatch { expected, got } => {
                BridgeError::UnsupportedType { expected, got }
            }
            ValueError::ArityMismatch { expected, got } => BridgeError::UnsupportedType {
                expected: format!("array of {}", expected),
                got: format!("array of {}", got),
            },
        }
    }
}
