//! Value marshaling between host [`Value`]s and foreign objects
//!
//! | Host          | Foreign                 |
//! |---------------|-------------------------|
//! | `Null`        | `None`                  |
//! | `Bool`        | `bool`                  |
//! | `Int`         | `int` (must fit in i64) |
//! | `Float`       | `float`                 |
//! | `String`      | `str`                   |
//! | `Blob`        | `bytes` / `bytearray`   |
//! | `Array`       | `list` / `tuple`        |
//! | `Map`         | `dict` with `str` keys  |
//!
//! Both directions run with the runtime lock held. Intermediate foreign
//! objects are `Bound` values and are released when they go out of scope,
//! on the error path as well.

use crate::error::{BridgeError, BridgeResult};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyByteArray, PyBytes, PyDict, PyFloat, PyList, PyLong, PyString, PyTuple};
use serpent_sdk::{Map, Value};

/// Convert a host value into a new foreign object.
pub fn to_foreign<'py>(py: Python<'py>, value: &Value) -> BridgeResult<Bound<'py, PyAny>> {
    let obj = match value {
        Value::Null => py.None().into_bound(py),
        Value::Bool(b) => b.to_object(py).into_bound(py),
        Value::Int(i) => i.to_object(py).into_bound(py),
        Value::Float(f) => f.to_object(py).into_bound(py),
        Value::String(s) => PyString::new_bound(py, s).into_any(),
        Value::Blob(bytes) => PyBytes::new_bound(py, bytes).into_any(),
        Value::Array(items) => {
            let list = PyList::empty_bound(py);
            for item in items {
                list.append(to_foreign(py, item)?)
                    .map_err(|err| append_failure(py, "list", &err))?;
            }
            list.into_any()
        }
        Value::Map(map) => to_foreign_dict(py, map)?.into_any(),
    };
    Ok(obj)
}

/// Convert a host map into a new foreign `dict`.
pub fn to_foreign_dict<'py>(py: Python<'py>, map: &Map) -> BridgeResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    for (key, item) in map {
        dict.set_item(key, to_foreign(py, item)?)
            .map_err(|err| append_failure(py, "dict", &err))?;
    }
    Ok(dict)
}

/// Convert a slice of host values into a foreign argument tuple.
pub fn to_foreign_args<'py>(py: Python<'py>, args: &[Value]) -> BridgeResult<Bound<'py, PyTuple>> {
    let items = args
        .iter()
        .map(|arg| to_foreign(py, arg))
        .collect::<BridgeResult<Vec<_>>>()?;
    Ok(PyTuple::new_bound(py, items))
}

/// Deepest container nesting accepted from the foreign side. A
/// self-referencing list or dict hits this limit instead of the stack.
pub const MAX_NESTING: usize = 128;

/// Convert a foreign object into a host value.
pub fn from_foreign(obj: &Bound<'_, PyAny>) -> BridgeResult<Value> {
    from_foreign_nested(obj, 0)
}

fn from_foreign_nested(obj: &Bound<'_, PyAny>, depth: usize) -> BridgeResult<Value> {
    if depth > MAX_NESTING {
        return Err(conversion(obj, "cyclic or too deeply nested"));
    }
    if obj.is_none() {
        return Ok(Value::Null);
    }
    // bool subclasses int, so it has to be checked first
    if let Ok(b) = obj.downcast::<PyBool>() {
        return Ok(Value::Bool(b.is_true()));
    }
    if obj.is_instance_of::<PyLong>() {
        return obj
            .extract::<i64>()
            .map(Value::Int)
            .map_err(|_| conversion(obj, "integer does not fit in 64 bits"));
    }
    if let Ok(f) = obj.downcast::<PyFloat>() {
        return Ok(Value::Float(f.value()));
    }
    if let Ok(s) = obj.downcast::<PyString>() {
        return s
            .to_str()
            .map(|s| Value::String(s.to_string()))
            .map_err(|_| conversion(obj, "string is not valid UTF-8"));
    }
    if let Ok(bytes) = obj.downcast::<PyBytes>() {
        return Ok(Value::Blob(bytes.as_bytes().to_vec()));
    }
    if let Ok(bytes) = obj.downcast::<PyByteArray>() {
        return Ok(Value::Blob(bytes.to_vec()));
    }
    if let Ok(list) = obj.downcast::<PyList>() {
        return list
            .iter()
            .map(|item| from_foreign_nested(&item, depth + 1))
            .collect::<BridgeResult<Vec<_>>>()
            .map(Value::Array);
    }
    if let Ok(tuple) = obj.downcast::<PyTuple>() {
        return tuple
            .iter()
            .map(|item| from_foreign_nested(&item, depth + 1))
            .collect::<BridgeResult<Vec<_>>>()
            .map(Value::Array);
    }
    if let Ok(dict) = obj.downcast::<PyDict>() {
        let mut map = Map::new();
        for (key, item) in dict.iter() {
            let key = key
                .downcast::<PyString>()
                .map_err(|_| conversion(obj, "dict keys must be strings"))?
                .to_str()
                .map_err(|_| conversion(obj, "dict key is not valid UTF-8"))?
                .to_string();
            map.insert(key, from_foreign_nested(&item, depth + 1)?);
        }
        return Ok(Value::Map(map));
    }
    Err(conversion(obj, "no host value counterpart"))
}

fn conversion(obj: &Bound<'_, PyAny>, reason: &str) -> BridgeError {
    BridgeError::Conversion {
        type_name: foreign_type_name(obj),
        reason: reason.to_string(),
    }
}

fn append_failure(py: Python<'_>, container: &str, err: &PyErr) -> BridgeError {
    BridgeError::Conversion {
        type_name: container.to_string(),
        reason: crate::error::ForeignException::capture(py, err).to_string(),
    }
}

/// `type(obj).__name__`, for error messages
pub(crate) fn foreign_type_name(obj: &Bound<'_, PyAny>) -> String {
    obj.get_type()
        .getattr("__name__")
        .and_then(|name| name.extract::<String>())
        .unwrap_or_else(|_| "<unknown>".to_string())
}
