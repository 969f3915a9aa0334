//! Data item catalog and value codec for Nibe heat pump registers.
//!
//! A [`Catalog`] is loaded once at startup from a YAML or JSON list of
//! [`DataItemRecord`]s and never mutated afterwards, so it can be shared
//! between threads behind an `Arc` without locking.
//!
//! The [`codec`] module turns raw register bytes into typed [`Value`]s and
//! back, using the [`DataItemDefinition`] of the register involved.
//!
//! # Example
//!
//! ```rust
//! use nibegw_model::{codec, Catalog, Value};
//!
//! let catalog = Catalog::from_yaml_str(r#"
//! - name: bt1-outdoor-temperature-40004
//!   address: 40004
//!   type: float
//!   scale: 0.1
//!   signed: true
//! "#).unwrap();
//!
//! let def = catalog.by_name("bt1-outdoor-temperature-40004").unwrap();
//! let decoded = codec::decode(def, &[0x74, 0x00]).unwrap();
//! assert_eq!(decoded.value, Value::Float(11.6));
//! ```

mod catalog;
pub mod codec;
mod definition;
mod error;
mod value;

pub use catalog::*;
pub use definition::*;
pub use error::*;
pub use value::*;
