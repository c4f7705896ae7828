//! Serpent SDK - host value model for the Serpent bridge
//!
//! This crate provides the types shared by every layer of the bridge
//! without depending on the embedded interpreter:
//! - [`Value`] and [`Map`]: the canonical exchange type for call arguments
//!   and results
//! - [`FromValue`]: typed extraction used by the statically-typed call helpers
//! - [`ValueError`]: extraction failures
//!
//! # Example
//!
//! ```ignore
//! use serpent_sdk::{Map, Value};
//!
//! let mut args = Map::new();
//! args.insert("string".into(), Value::from("test"));
//! args.insert("int".into(), Value::from(9));
//! args.insert("byte".into(), Value::from(&b"ABC"[..]));
//! ```

#![warn(missing_docs)]

pub mod convert;
pub mod error;
pub mod value;

pub use convert::FromValue;
pub use error::{ValueError, ValueResult};
pub use value::{Map, Value};
