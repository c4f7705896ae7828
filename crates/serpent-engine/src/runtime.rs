//! Interpreter runtime guard
//!
//! The embedded interpreter is single-threaded internally. Every entry into
//! foreign code goes through [`with_runtime`], which takes one process-wide
//! reentrant lock and then the interpreter lock. Holding the outer lock for
//! the whole entry keeps two host threads from interleaving foreign calls
//! even when the interpreter drops its own lock in the middle of one.
//!
//! Lock order is always outer lock, then interpreter lock.

use crate::error::{BridgeError, BridgeResult};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::ReentrantMutex;
use pyo3::prelude::*;
use pyo3::types::PyList;
use serde::{Deserialize, Serialize};

static INITIALIZED: OnceCell<()> = OnceCell::new();

static RUNTIME_LOCK: Lazy<ReentrantMutex<()>> = Lazy::new(|| ReentrantMutex::new(()));

// ============================================================================
// Configuration
// ============================================================================

/// Runtime options applied by [`configure`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Directories appended to the module search path, in order.
    /// An empty string stands for the current working directory.
    pub search_paths: Vec<String>,
}

impl RuntimeOptions {
    /// Create options with no extra search paths
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a search path
    pub fn with_search_path(mut self, path: impl Into<String>) -> Self {
        self.search_paths.push(path.into());
        self
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Bring the interpreter to a ready state.
///
/// Idempotent: only the first call bootstraps, later calls return at once.
pub fn initialize() {
    INITIALIZED.get_or_init(|| {
        pyo3::prepare_freethreaded_python();
        tracing::info!("embedded python runtime initialized");
    });
}

/// Whether [`initialize`] has run
pub fn is_initialized() -> bool {
    INITIALIZED.get().is_some()
}

/// Initialize and apply `options`
pub fn configure(options: &RuntimeOptions) -> BridgeResult<()> {
    initialize();
    for path in &options.search_paths {
        import_sys_and_append_path(path)?;
    }
    Ok(())
}

/// Run `f` inside the runtime critical section.
///
/// Initializes the interpreter on first use. Reentrant: `f` may call back
/// into any bridge operation on the same thread.
pub fn with_runtime<F, R>(f: F) -> R
where
    F: for<'py> FnOnce(Python<'py>) -> R,
{
    initialize();
    let _entry = RUNTIME_LOCK.lock();
    Python::with_gil(f)
}

/// Make sure `sys.path` contains `path`.
///
/// An empty `path` stands for the current working directory. A path that is
/// already present is left alone.
pub fn import_sys_and_append_path(path: &str) -> BridgeResult<()> {
    with_runtime(|py| {
        append_path(py, path).map_err(|err| {
            BridgeError::RuntimeSetup(format!(
                "cannot append {:?} to sys.path: {}",
                path,
                crate::error::ForeignException::capture(py, &err)
            ))
        })
    })
}

fn append_path(py: Python<'_>, path: &str) -> PyResult<()> {
    let sys = py.import_bound("sys")?;
    let sys_path = sys.getattr("path")?;
    let sys_path = sys_path.downcast::<PyList>()?;
    if !sys_path.contains(path)? {
        sys_path.append(path)?;
        tracing::debug!(path, "appended module search path");
    }
    Ok(())
}
