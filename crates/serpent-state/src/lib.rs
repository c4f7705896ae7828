//! Serpent State
//!
//! Long-lived host states backed by Python class instances. A
//! [`Creator`] builds a [`PyState`] from a configuration map; the state
//! forwards calls and writes to the instance, runs its `terminate` hook
//! on shutdown, and saves or loads it through a checksummed snapshot.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod creator;
pub mod params;
pub mod registry;
pub mod snapshot;
pub mod state;

pub use creator::{call_method, Creator};
pub use params::StateParams;
pub use registry::{SharedStates, StateRegistry};
pub use snapshot::{Snapshot, SnapshotError, SnapshotMetadata};
pub use state::PyState;
