//! Foreign object handles
//!
//! A [`Handle`] owns exactly one reference to a foreign object. It is not
//! `Clone`: taking another reference is an explicit [`Handle::retain`], and
//! giving one up is [`Handle::release`], which consumes the handle so it
//! cannot run twice. A handle that goes out of scope without an explicit
//! release is released by `Drop`, under the runtime lock, on every exit path.
//!
//! [`ModuleHandle`] and [`InstanceHandle`] are handles with a known role.
//! Both deref to [`Handle`], so the generic and typed call operations in
//! [`crate::call`] work on either.

use crate::error::{BridgeError, BridgeResult, ForeignException};
use crate::marshal;
use crate::runtime::with_runtime;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use pyo3::prelude::*;
use serpent_sdk::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::Deref;

/// Imported modules, kept for the life of the process
static MODULES: Lazy<Mutex<HashMap<String, Py<PyModule>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

// ============================================================================
// Handle
// ============================================================================

/// Owner of one foreign object reference
pub struct Handle {
    name: String,
    object: ManuallyDrop<Py<PyAny>>,
}

impl Handle {
    pub(crate) fn new(name: impl Into<String>, object: Py<PyAny>) -> Self {
        Self {
            name: name.into(),
            object: ManuallyDrop::new(object),
        }
    }

    pub(crate) fn from_bound(name: impl Into<String>, object: Bound<'_, PyAny>) -> Self {
        Self::new(name, object.unbind())
    }

    /// Name the object was acquired under (module, class or attribute name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the object for the duration of a runtime entry
    pub(crate) fn bind<'py>(&self, py: Python<'py>) -> &Bound<'py, PyAny> {
        self.object.bind(py)
    }

    /// Take an additional reference to the same foreign object.
    ///
    /// The returned handle must be released independently.
    pub fn retain(&self) -> Handle {
        with_runtime(|py| Handle::new(self.name.clone(), self.object.clone_ref(py)))
    }

    /// Give up this handle's reference.
    pub fn release(self) {
        tracing::trace!(name = %self.name, "releasing foreign handle");
        drop(self);
    }

    /// Whether the object has an attribute called `name`
    pub fn has_attr(&self, name: &str) -> BridgeResult<bool> {
        with_runtime(|py| {
            self.bind(py)
                .hasattr(name)
                .map_err(|err| BridgeError::Invocation {
                    method: format!("hasattr({})", name),
                    exception: ForeignException::capture(py, &err),
                })
        })
    }

    /// Read an attribute and marshal it back
    pub fn get_attr(&self, name: &str) -> BridgeResult<Value> {
        with_runtime(|py| {
            let attr = self
                .bind(py)
                .getattr(name)
                .map_err(|_| BridgeError::AttributeNotFound(name.to_string()))?;
            marshal::from_foreign(&attr)
        })
    }

    /// Whether both handles refer to the same foreign object
    pub fn is_same_object(&self, other: &Handle) -> bool {
        self.object.as_ptr() == other.object.as_ptr()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // SAFETY: `object` is taken exactly once, here, and never touched again.
        let object = unsafe { ManuallyDrop::take(&mut self.object) };
        with_runtime(|_py| drop(object));
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name)
            .field("ptr", &self.object.as_ptr())
            .finish()
    }
}

// ============================================================================
// Modules
// ============================================================================

/// Handle to an imported module
#[derive(Debug)]
pub struct ModuleHandle {
    handle: Handle,
}

impl Deref for ModuleHandle {
    type Target = Handle;

    fn deref(&self) -> &Handle {
        &self.handle
    }
}

/// Resolve a module by name.
///
/// The first load of a name imports it; later loads return a new handle to
/// the cached module object without importing again.
pub fn load_module(name: &str) -> BridgeResult<ModuleHandle> {
    with_runtime(|py| {
        if let Some(module) = MODULES.lock().get(name) {
            tracing::debug!(module = name, "module cache hit");
            return Ok(ModuleHandle {
                handle: Handle::new(name, module.clone_ref(py).into_any()),
            });
        }

        // The cache lock is not held across the import: module code may
        // load other modules.
        let module = PyModule::import_bound(py, name).map_err(|err| {
            BridgeError::ModuleNotFound {
                name: name.to_string(),
                exception: ForeignException::capture(py, &err),
            }
        })?;
        tracing::debug!(module = name, "imported module");

        let module = MODULES
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| module.unbind())
            .clone_ref(py);
        Ok(ModuleHandle {
            handle: Handle::new(name, module.into_any()),
        })
    })
}

impl ModuleHandle {
    /// Module name
    pub fn module_name(&self) -> &str {
        self.handle.name()
    }

    /// Give up this handle's reference. The cached module stays loaded.
    pub fn release(self) {
        self.handle.release();
    }

    /// Look up a class (or any callable factory) attribute
    pub fn class(&self, class_name: &str) -> BridgeResult<Handle> {
        with_runtime(|py| {
            let class = self.lookup_class(py, class_name)?;
            Ok(Handle::from_bound(class_name, class))
        })
    }

    /// Construct an instance of `class_name` with positional arguments
    pub fn get_instance(&self, class_name: &str, args: &[Value]) -> BridgeResult<InstanceHandle> {
        self.get_instance_with_kwargs(class_name, args, None)
    }

    /// Construct an instance of `class_name` with positional and keyword arguments
    pub fn get_instance_with_kwargs(
        &self,
        class_name: &str,
        args: &[Value],
        kwargs: Option<&Map>,
    ) -> BridgeResult<InstanceHandle> {
        with_runtime(|py| {
            let class = self.lookup_class(py, class_name)?;
            let args = marshal::to_foreign_args(py, args)?;
            let kwargs = kwargs
                .map(|kwargs| marshal::to_foreign_dict(py, kwargs))
                .transpose()?;

            let instance = class
                .call(args, kwargs.as_ref())
                .map_err(|err| BridgeError::Construction {
                    class: class_name.to_string(),
                    exception: ForeignException::capture(py, &err),
                })?;
            tracing::debug!(
                module = self.module_name(),
                class = class_name,
                "constructed foreign instance"
            );

            Ok(InstanceHandle {
                handle: Handle::from_bound(class_name, instance),
                module_name: self.module_name().to_string(),
                class_name: class_name.to_string(),
            })
        })
    }

    fn lookup_class<'py>(
        &self,
        py: Python<'py>,
        class_name: &str,
    ) -> BridgeResult<Bound<'py, PyAny>> {
        match self.bind(py).getattr(class_name) {
            Ok(class) if class.is_callable() => Ok(class),
            _ => Err(BridgeError::ClassNotFound {
                module: self.module_name().to_string(),
                class: class_name.to_string(),
            }),
        }
    }
}

// ============================================================================
// Instances
// ============================================================================

/// Handle to an instance of a foreign class
#[derive(Debug)]
pub struct InstanceHandle {
    handle: Handle,
    module_name: String,
    class_name: String,
}

impl Deref for InstanceHandle {
    type Target = Handle;

    fn deref(&self) -> &Handle {
        &self.handle
    }
}

impl InstanceHandle {
    pub(crate) fn from_parts(handle: Handle, module_name: &str, class_name: &str) -> Self {
        Self {
            handle,
            module_name: module_name.to_string(),
            class_name: class_name.to_string(),
        }
    }

    /// Module the class was found in
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Class the instance was constructed from
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Give up the instance reference
    pub fn release(self) {
        self.handle.release();
    }
}
