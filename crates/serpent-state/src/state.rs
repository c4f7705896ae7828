//! A host state backed by one Python instance

use crate::params::StateParams;
use crate::snapshot::{Snapshot, SnapshotError, SnapshotMetadata};
use parking_lot::RwLock;
use serpent_engine::{
    load_module, pickle, BridgeError, BridgeResult, ForeignException, InstanceHandle, Map, Value,
};
use std::io::{Read, Write};

/// Method called on the instance when the state terminates, if defined
pub const TERMINATE_HOOK: &str = "terminate";

/// Save parameter selecting the pickle protocol
pub const PROTOCOL_PARAM: &str = "protocol";

struct Inner {
    /// `None` once terminated
    instance: Option<InstanceHandle>,
    args: Map,
}

/// Stateful object adapter.
///
/// Calls run under a shared lock so they may proceed concurrently (the
/// interpreter serializes them anyway). Terminate and the instance swap
/// at the end of [`PyState::load`] take the exclusive lock.
pub struct PyState {
    params: StateParams,
    inner: RwLock<Inner>,
}

impl PyState {
    pub(crate) fn new(params: StateParams, args: Map, instance: InstanceHandle) -> Self {
        Self {
            params,
            inner: RwLock::new(Inner {
                instance: Some(instance),
                args,
            }),
        }
    }

    /// Parameters the state was created with
    pub fn params(&self) -> &StateParams {
        &self.params
    }

    /// Constructor arguments of the current instance
    pub fn args(&self) -> Map {
        self.inner.read().args.clone()
    }

    /// Whether a write method is configured
    pub fn is_writable(&self) -> bool {
        self.params.write_method.is_some()
    }

    /// Whether [`terminate`](Self::terminate) has run
    pub fn is_terminated(&self) -> bool {
        self.inner.read().instance.is_none()
    }

    /// Fail with [`BridgeError::AlreadyTerminated`] once terminated
    pub fn check_termination(&self) -> BridgeResult<()> {
        if self.is_terminated() {
            return Err(BridgeError::AlreadyTerminated);
        }
        Ok(())
    }

    /// Call `method` on the instance
    pub fn call(&self, method: &str, args: &[Value]) -> BridgeResult<Value> {
        let inner = self.inner.read();
        let instance = inner.instance.as_ref().ok_or(BridgeError::AlreadyTerminated)?;
        instance.call(method, args)
    }

    /// Pass `data` to the configured write method. The method's return
    /// value is discarded.
    pub fn write(&self, data: &Map) -> BridgeResult<()> {
        let inner = self.inner.read();
        let instance = inner.instance.as_ref().ok_or(BridgeError::AlreadyTerminated)?;
        let method = self
            .params
            .write_method
            .as_deref()
            .ok_or(BridgeError::WriteNotConfigured)?;
        instance.call_discarding(method, &[Value::Map(data.clone())])
    }

    /// Run the terminate hook and release the instance.
    ///
    /// The instance is released whether or not the hook succeeds; later
    /// operations fail with [`BridgeError::AlreadyTerminated`].
    pub fn terminate(&self) -> BridgeResult<()> {
        let instance = self
            .inner
            .write()
            .instance
            .take()
            .ok_or(BridgeError::AlreadyTerminated)?;

        let outcome = run_terminate_hook(&instance);
        if let Err(err) = &outcome {
            tracing::warn!(
                class = %self.params.class_name,
                error = %err,
                "Terminate hook failed"
            );
        }
        instance.release();
        tracing::debug!(class = %self.params.class_name, "State terminated");
        outcome
    }

    /// Serialize the instance into `writer`.
    ///
    /// `params` may carry `protocol` (int) to pick the pickle protocol.
    pub fn save<W: Write + ?Sized>(&self, writer: &mut W, params: &Map) -> BridgeResult<()> {
        let protocol = match params.get(PROTOCOL_PARAM) {
            None => None,
            Some(Value::Int(protocol)) => Some(*protocol),
            Some(other) => {
                return Err(BridgeError::UnsupportedType {
                    expected: format!("int for {}", PROTOCOL_PARAM),
                    got: other.type_name().to_string(),
                })
            }
        };

        let (payload, args) = {
            let inner = self.inner.read();
            let instance = inner.instance.as_ref().ok_or(BridgeError::AlreadyTerminated)?;
            (pickle::dumps(instance, protocol)?, inner.args.clone())
        };

        let metadata = SnapshotMetadata {
            module_name: self.params.module_name.clone(),
            class_name: self.params.class_name.clone(),
            write_method: self.params.write_method.clone(),
            args,
        };
        Snapshot::write(writer, &metadata, &payload).map_err(|err| match err {
            SnapshotError::Io(io) => BridgeError::Io(io),
            other => BridgeError::Serialization {
                exception: ForeignException::synthetic("SnapshotError", other.to_string()),
            },
        })?;

        tracing::debug!(
            class = %self.params.class_name,
            bytes = payload.len(),
            "State saved"
        );
        Ok(())
    }

    /// Replace the instance with one read from `reader`.
    ///
    /// The replacement is fully deserialized and checked before it is
    /// installed; on any error the current instance stays in place.
    pub fn load<R: Read + ?Sized>(&self, reader: &mut R, params: &Map) -> BridgeResult<()> {
        self.check_termination()?;
        if !params.is_empty() {
            tracing::debug!(keys = ?params.keys().collect::<Vec<_>>(), "Ignoring load params");
        }

        let snapshot = Snapshot::read(reader)?;
        check_identity(&self.params, &snapshot.metadata)?;
        let replacement = restore_instance(&self.params, &snapshot.payload)?;

        let mut inner = self.inner.write();
        if inner.instance.is_none() {
            drop(inner);
            replacement.release();
            return Err(BridgeError::AlreadyTerminated);
        }
        let previous = inner.instance.replace(replacement);
        inner.args = snapshot.metadata.args;
        drop(inner);

        if let Some(previous) = previous {
            previous.release();
        }
        tracing::debug!(class = %self.params.class_name, "State loaded");
        Ok(())
    }
}

impl std::fmt::Debug for PyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PyState")
            .field("params", &self.params)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

// Any foreign exception on this path, including one raised while looking
// the hook up, is a termination failure.
fn run_terminate_hook(instance: &InstanceHandle) -> BridgeResult<()> {
    let outcome = match instance.has_attr(TERMINATE_HOOK) {
        Ok(false) => Ok(()),
        Ok(true) => instance.call_discarding(TERMINATE_HOOK, &[]),
        Err(err) => Err(err),
    };
    match outcome {
        // A non-callable attribute is not a hook
        Ok(()) | Err(BridgeError::MethodNotFound(_)) => Ok(()),
        Err(BridgeError::Invocation { exception, .. }) => Err(BridgeError::Termination { exception }),
        Err(err) => Err(err),
    }
}

pub(crate) fn check_identity(params: &StateParams, metadata: &SnapshotMetadata) -> BridgeResult<()> {
    if metadata.module_name != params.module_name || metadata.class_name != params.class_name {
        return Err(BridgeError::Deserialization(format!(
            "snapshot of {}.{} cannot be loaded into {}.{}",
            metadata.module_name, metadata.class_name, params.module_name, params.class_name
        )));
    }
    Ok(())
}

pub(crate) fn restore_instance(params: &StateParams, payload: &[u8]) -> BridgeResult<InstanceHandle> {
    let module = load_module(&params.module_name)
        .map_err(|err| BridgeError::Deserialization(err.to_string()))?;
    let instance = pickle::loads(&module, &params.class_name, payload);
    module.release();
    instance
}
