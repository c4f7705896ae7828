//! Invoke-by-name on foreign objects
//!
//! [`Handle::call`] is the one dispatch path: look the attribute up, check
//! it is callable, marshal the arguments, call, marshal the result back.
//! The typed helpers (`call_int_int`, `call_string_string`, ...) go through
//! the same path and only add a [`FromValue`] extraction on the result, so
//! they classify errors exactly like `call` does.

use crate::error::{BridgeError, BridgeResult, ForeignException};
use crate::handle::Handle;
use crate::marshal;
use crate::runtime::with_runtime;
use pyo3::prelude::*;
use serpent_sdk::{FromValue, Map, Value};

impl Handle {
    /// Call `method` with positional arguments
    pub fn call(&self, method: &str, args: &[Value]) -> BridgeResult<Value> {
        with_runtime(|py| self.invoke(py, method, args, None))
    }

    /// Call `method` with positional and keyword arguments
    pub fn call_with_kwargs(
        &self,
        method: &str,
        args: &[Value],
        kwargs: &Map,
    ) -> BridgeResult<Value> {
        with_runtime(|py| self.invoke(py, method, args, Some(kwargs)))
    }

    /// Call `method` and extract the result as `T`
    pub fn call_as<T: FromValue>(&self, method: &str, args: &[Value]) -> BridgeResult<T> {
        let result = self.call(method, args)?;
        Ok(T::from_value(result)?)
    }

    /// Call `method` for its side effects. The result is dropped without
    /// being marshaled, so any returned object is accepted.
    pub fn call_discarding(&self, method: &str, args: &[Value]) -> BridgeResult<()> {
        with_runtime(|py| self.invoke_raw(py, method, args, None).map(drop))
    }

    pub(crate) fn invoke(
        &self,
        py: Python<'_>,
        method: &str,
        args: &[Value],
        kwargs: Option<&Map>,
    ) -> BridgeResult<Value> {
        let result = self.invoke_raw(py, method, args, kwargs)?;
        marshal::from_foreign(&result)
    }

    fn invoke_raw<'py>(
        &self,
        py: Python<'py>,
        method: &str,
        args: &[Value],
        kwargs: Option<&Map>,
    ) -> BridgeResult<Bound<'py, PyAny>> {
        let callable = match self.bind(py).getattr(method) {
            Ok(attr) if attr.is_callable() => attr,
            _ => return Err(BridgeError::MethodNotFound(method.to_string())),
        };
        let args = marshal::to_foreign_args(py, args)?;
        let kwargs = kwargs
            .map(|kwargs| marshal::to_foreign_dict(py, kwargs))
            .transpose()?;

        callable
            .call(args, kwargs.as_ref())
            .map_err(|err| BridgeError::Invocation {
                method: method.to_string(),
                exception: ForeignException::capture(py, &err),
            })
    }

    // ========================================================================
    // Typed helpers
    // ========================================================================

    /// `fn(int) -> int`
    pub fn call_int_int(&self, method: &str, arg: i64) -> BridgeResult<i64> {
        self.call_as(method, &[Value::Int(arg)])
    }

    /// `fn(str) -> str`
    pub fn call_string_string(&self, method: &str, arg: &str) -> BridgeResult<String> {
        self.call_as(method, &[Value::from(arg)])
    }

    /// `fn() -> str`
    pub fn call_none_string(&self, method: &str) -> BridgeResult<String> {
        self.call_as(method, &[])
    }

    /// `fn() -> (str, str)`
    pub fn call_none_2string(&self, method: &str) -> BridgeResult<(String, String)> {
        self.call_as(method, &[])
    }

    /// `fn(bytes) -> bytes`
    pub fn call_bytes_bytes(&self, method: &str, arg: &[u8]) -> BridgeResult<Vec<u8>> {
        self.call_as(method, &[Value::from(arg)])
    }

    /// `fn(dict) -> str`
    pub fn call_map_string(&self, method: &str, arg: &Map) -> BridgeResult<String> {
        self.call_as(method, &[Value::Map(arg.clone())])
    }
}
