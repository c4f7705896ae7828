//! Building states from configuration maps and snapshots

use crate::params::StateParams;
use crate::registry::StateRegistry;
use crate::snapshot::Snapshot;
use crate::state::{check_identity, restore_instance, PyState};
use serpent_engine::{import_sys_and_append_path, load_module, BridgeError, BridgeResult, Map, Value};
use std::io::Read;

/// Creates [`PyState`]s.
///
/// A configuration map holds `module_name` and `class_name` (required),
/// `module_path` and `write_method` (optional). Every other key is passed
/// to the class constructor as a keyword argument.
#[derive(Debug, Default, Clone, Copy)]
pub struct Creator;

impl Creator {
    /// Create a new creator
    pub fn new() -> Self {
        Self
    }

    /// Instantiate the configured class
    pub fn create_state(&self, config: &Map) -> BridgeResult<PyState> {
        let (params, args) = StateParams::from_config(config)?;
        import_sys_and_append_path(&params.module_path)?;

        let module = load_module(&params.module_name)?;
        let instance = module.get_instance_with_kwargs(&params.class_name, &[], Some(&args));
        module.release();
        let instance = instance?;

        tracing::info!(
            module = %params.module_name,
            class = %params.class_name,
            args = args.len(),
            "Created state"
        );
        Ok(PyState::new(params, args, instance))
    }

    /// Rebuild a state from a snapshot written by [`PyState::save`].
    ///
    /// `config` names the class the snapshot must hold. Its constructor
    /// keys are ignored; the snapshot's own arguments are restored. A
    /// `write_method` in `config` overrides the one in the snapshot.
    pub fn load_state<R: Read + ?Sized>(
        &self,
        config: &Map,
        reader: &mut R,
        params: &Map,
    ) -> BridgeResult<PyState> {
        let (mut state_params, _) = StateParams::from_config(config)?;
        import_sys_and_append_path(&state_params.module_path)?;
        if !params.is_empty() {
            tracing::debug!(keys = ?params.keys().collect::<Vec<_>>(), "Ignoring load params");
        }

        let snapshot = Snapshot::read(reader)?;
        check_identity(&state_params, &snapshot.metadata)?;
        let instance = restore_instance(&state_params, &snapshot.payload)?;
        if state_params.write_method.is_none() {
            state_params.write_method = snapshot.metadata.write_method;
        }

        tracing::info!(
            module = %state_params.module_name,
            class = %state_params.class_name,
            "Loaded state"
        );
        Ok(PyState::new(state_params, snapshot.metadata.args, instance))
    }
}

/// Call `method` on the state registered under `name`
pub fn call_method(
    registry: &dyn StateRegistry,
    name: &str,
    method: &str,
    args: &[Value],
) -> BridgeResult<Value> {
    let state = registry
        .get(name)
        .ok_or_else(|| BridgeError::StateNotFound(name.to_string()))?;
    state.call(method, args)
}
