//! # Historial Codec
//!
//! Plain-data values and their CBOR encoding.
//!
//! Everything the record database stores is a [`Value`]: a behavior-free
//! tree of scalars, arrays and text-keyed maps. The database journal
//! persists these trees as CBOR.
//!
//! ## Usage
//!
//! ```
//! use historial_codec::{from_cbor, to_cbor, Value};
//!
//! let record = Value::map([("id", Value::from("123")), ("name", Value::from("Ana"))]);
//! let bytes = to_cbor(&record).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod serde_impl;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use value::Value;
