//! Typed extraction from host values.
//!
//! `FromValue` is the inverse of the `From<T> for Value` impls: it reads a
//! statically-typed Rust value out of a [`Value`], failing with
//! [`ValueError`] when the variant does not fit. The typed call helpers in
//! `serpent-engine` are built on it.
//!
//! # Example
//!
//! ```ignore
//! use serpent_sdk::{FromValue, Value};
//!
//! let pair = <(String, String)>::from_value(Value::Array(vec![
//!     Value::from("a"),
//!     Value::from("b"),
//! ]))?;
//! ```

use crate::error::{ValueError, ValueResult};
use crate::value::{Map, Value};

/// Convert a host value into a Rust type.
pub trait FromValue: Sized {
    /// Name of the expected shape, used in mismatch errors
    fn expected() -> &'static str;

    /// Consume the value and extract `Self`
    fn from_value(value: Value) -> ValueResult<Self>;
}

impl FromValue for Value {
    fn expected() -> &'static str {
        "any"
    }

    fn from_value(value: Value) -> ValueResult<Self> {
        Ok(value)
    }
}

impl FromValue for () {
    fn expected() -> &'static str {
        "null"
    }

    fn from_value(value: Value) -> ValueResult<Self> {
        match value {
            Value::Null => Ok(()),
            other => Err(ValueError::mismatch(Self::expected(), other.type_name())),
        }
    }
}

macro_rules! impl_from_value {
    ($ty:ty, $name:literal, $pat:pat => $out:expr) => {
        impl FromValue for $ty {
            fn expected() -> &'static str {
                $name
            }

            fn from_value(value: Value) -> ValueResult<Self> {
                match value {
                    $pat => Ok($out),
                    other => Err(ValueError::mismatch($name, other.type_name())),
                }
            }
        }
    };
}

impl_from_value!(bool, "bool", Value::Bool(b) => b);
impl_from_value!(i64, "int", Value::Int(i) => i);
impl_from_value!(String, "string", Value::String(s) => s);
impl_from_value!(Vec<u8>, "blob", Value::Blob(b) => b);
impl_from_value!(Vec<Value>, "array", Value::Array(a) => a);
impl_from_value!(Map, "map", Value::Map(m) => m);

impl FromValue for f64 {
    fn expected() -> &'static str {
        "float"
    }

    fn from_value(value: Value) -> ValueResult<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => Err(ValueError::mismatch("float", other.type_name())),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn expected() -> &'static str {
        T::expected()
    }

    fn from_value(value: Value) -> ValueResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<A: FromValue, B: FromValue> FromValue for (A, B) {
    fn expected() -> &'static str {
        "array"
    }

    fn from_value(value: Value) -> ValueResult<Self> {
        match value {
            Value::Array(items) => {
                let got = items.len();
                let mut items = items.into_iter();
                match (items.next(), items.next(), items.next()) {
                    (Some(a), Some(b), None) => Ok((A::from_value(a)?, B::from_value(b)?)),
                    _ => Err(ValueError::ArityMismatch { expected: 2, got }),
                }
            }
            other => Err(ValueError::mismatch("array", other.type_name())),
        }
    }
}
