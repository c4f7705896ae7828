//! Instance serialization through the interpreter's own `pickle` module.
//!
//! The produced bytes are opaque to the host: they are only ever handed
//! back to [`loads`].

use crate::error::{BridgeError, BridgeResult, ForeignException};
use crate::handle::{Handle, InstanceHandle, ModuleHandle};
use crate::marshal::foreign_type_name;
use crate::runtime::with_runtime;
use pyo3::prelude::*;
use pyo3::types::PyBytes;

/// Pickle a live instance. `protocol` of `None` uses the interpreter default.
pub fn dumps(instance: &InstanceHandle, protocol: Option<i64>) -> BridgeResult<Vec<u8>> {
    with_runtime(|py| {
        let serialization = |err: PyErr| BridgeError::Serialization {
            exception: ForeignException::capture(py, &err),
        };
        let dumps = py
            .import_bound("pickle")
            .and_then(|pickle| pickle.getattr("dumps"))
            .map_err(serialization)?;
        let object = instance.bind(py).clone();
        let pickled = match protocol {
            Some(protocol) => dumps.call1((object, protocol)),
            None => dumps.call1((object,)),
        }
        .map_err(serialization)?;

        let bytes = pickled.downcast::<PyBytes>().map_err(|_| BridgeError::Serialization {
            exception: ForeignException::synthetic(
                "TypeError",
                format!("pickle.dumps returned {}", foreign_type_name(&pickled)),
            ),
        })?;
        Ok(bytes.as_bytes().to_vec())
    })
}

/// Unpickle `payload` into a new instance, which must be an instance of
/// `class_name` from `module`.
///
/// Nothing outside the returned handle is touched, so a failure leaves
/// every existing object as it was.
pub fn loads(module: &ModuleHandle, class_name: &str, payload: &[u8]) -> BridgeResult<InstanceHandle> {
    let class = module
        .class(class_name)
        .map_err(|err| BridgeError::Deserialization(err.to_string()))?;

    with_runtime(|py| {
        let deserialization = |err: PyErr| {
            BridgeError::Deserialization(ForeignException::capture(py, &err).to_string())
        };
        let loads = py
            .import_bound("pickle")
            .and_then(|pickle| pickle.getattr("loads"))
            .map_err(deserialization)?;
        let object = loads
            .call1((PyBytes::new_bound(py, payload),))
            .map_err(deserialization)?;

        let matches = object.is_instance(class.bind(py)).map_err(deserialization)?;
        if !matches {
            return Err(BridgeError::Deserialization(format!(
                "snapshot holds a {}, expected {}.{}",
                foreign_type_name(&object),
                module.module_name(),
                class_name
            )));
        }

        Ok(InstanceHandle::from_parts(
            Handle::from_bound(class_name, object),
            module.module_name(),
            class_name,
        ))
    })
}
