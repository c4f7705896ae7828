//! State parameters parsed from a host configuration map

use serde::{Deserialize, Serialize};
use serpent_engine::{BridgeError, BridgeResult};
use serpent_sdk::{Map, Value};

/// Directory appended to the module search path (optional, default `""`)
pub const MODULE_PATH: &str = "module_path";
/// Module holding the class (required)
pub const MODULE_NAME: &str = "module_name";
/// Class to instantiate (required)
pub const CLASS_NAME: &str = "class_name";
/// Method invoked by `write` (optional)
pub const WRITE_METHOD: &str = "write_method";

const RESERVED: [&str; 4] = [MODULE_PATH, MODULE_NAME, CLASS_NAME, WRITE_METHOD];

/// Where a state's class comes from and how it is written to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateParams {
    /// Search path directory; empty means the current working directory
    pub module_path: String,
    /// Module name
    pub module_name: String,
    /// Class name
    pub class_name: String,
    /// Method called by `write`, if the state is writable
    pub write_method: Option<String>,
}

impl StateParams {
    /// Params for `class_name` in `module_name`, everything else default
    pub fn new(module_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            module_path: String::new(),
            module_name: module_name.into(),
            class_name: class_name.into(),
            write_method: None,
        }
    }

    /// Split a configuration map into params and constructor arguments.
    ///
    /// Every key that is not a reserved parameter becomes a constructor
    /// argument. The returned map iterates in key order.
    pub fn from_config(config: &Map) -> BridgeResult<(Self, Map)> {
        let params = Self {
            module_path: optional_string(config, MODULE_PATH)?.unwrap_or_default(),
            module_name: required_string(config, MODULE_NAME)?,
            class_name: required_string(config, CLASS_NAME)?,
            write_method: optional_string(config, WRITE_METHOD)?,
        };
        let args = config
            .iter()
            .filter(|(key, _)| !RESERVED.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok((params, args))
    }
}

fn required_string(config: &Map, key: &str) -> BridgeResult<String> {
    optional_string(config, key)?.ok_or_else(|| BridgeError::MissingParameter(key.to_string()))
}

fn optional_string(config: &Map, key: &str) -> BridgeResult<Option<String>> {
    match config.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(BridgeError::UnsupportedType {
            expected: format!("string for {}", key),
            got: other.type_name().to_string(),
        }),
    }
}
