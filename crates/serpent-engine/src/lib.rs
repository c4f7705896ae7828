//! Serpent Engine
//!
//! Embeds a Python interpreter and exposes its modules, classes and
//! instances as host objects:
//! - **Runtime guard** (`runtime`): one-time initialization, search path
//!   setup, and the process-wide critical section every foreign call runs in
//! - **Handles** (`handle`): reference-owning wrappers for modules,
//!   classes and instances, with a per-process module cache
//! - **Dispatch** (`call`): generic invoke-by-name plus typed helpers
//! - **Marshaling** (`marshal`): host [`Value`] to foreign object and back
//! - **Pickling** (`pickle`): instance snapshots through the interpreter's
//!   own serializer
//!
//! # Example
//!
//! ```rust,ignore
//! use serpent_engine::{import_sys_and_append_path, load_module, Value};
//!
//! import_sys_and_append_path("")?;
//! let module = load_module("_test")?;
//! assert_eq!(module.call_int_int("tenTimes", 3)?, 30);
//! assert_eq!(module.call("tenTimes", &[Value::Int(4)])?, Value::Int(40));
//! module.release();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod call;
pub mod error;
pub mod handle;
pub mod marshal;
pub mod pickle;
pub mod runtime;

pub use error::{BridgeError, BridgeResult, ForeignException};
pub use handle::{load_module, Handle, InstanceHandle, ModuleHandle};
pub use runtime::{
    configure, import_sys_and_append_path, initialize, is_initialized, with_runtime,
    RuntimeOptions,
};
pub use serpent_sdk::{FromValue, Map, Value};
