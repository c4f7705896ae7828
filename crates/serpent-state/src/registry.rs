//! Named registry of shared states

use crate::state::PyState;
use parking_lot::RwLock;
use serpent_engine::{BridgeError, BridgeResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of states addressable by name.
///
/// The registry belongs to the host; the bridge only needs name lookups.
pub trait StateRegistry: Send + Sync {
    /// Register `state` under `name`
    fn add(&self, name: &str, state: Arc<PyState>) -> BridgeResult<()>;

    /// Unregister and return the state under `name`
    fn remove(&self, name: &str) -> Option<Arc<PyState>>;

    /// Look up the state under `name`
    fn get(&self, name: &str) -> Option<Arc<PyState>>;
}

/// In-memory [`StateRegistry`]
#[derive(Default)]
pub struct SharedStates {
    states: RwLock<HashMap<String, Arc<PyState>>>,
}

impl SharedStates {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered states
    pub fn count(&self) -> usize {
        self.states.read().len()
    }

    /// All registered names
    pub fn names(&self) -> Vec<String> {
        self.states.read().keys().cloned().collect()
    }
}

impl StateRegistry for SharedStates {
    fn add(&self, name: &str, state: Arc<PyState>) -> BridgeResult<()> {
        let mut states = self.states.write();
        if states.contains_key(name) {
            return Err(BridgeError::StateAlreadyExists(name.to_string()));
        }
        states.insert(name.to_string(), state);
        Ok(())
    }

    fn remove(&self, name: &str) -> Option<Arc<PyState>> {
        self.states.write().remove(name)
    }

    fn get(&self, name: &str) -> Option<Arc<PyState>> {
        self.states.read().get(name).cloned()
    }
}

impl std::fmt::Debug for SharedStates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStates")
            .field("count", &self.count())
            .finish()
    }
}
