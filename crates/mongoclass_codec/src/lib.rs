//! # mongoclass codec
//!
//! Schemaless document values and their canonical CBOR encoding.
//!
//! [`Document`] and [`Value`] are the currency of every other crate: the
//! driver stores documents, the mapper produces them, and the cache stores
//! their canonical bytes.
//!
//! ## Canonical CBOR Rules
//!
//! - Document keys are text and sorted (length-first, then bytewise)
//! - Integers use shortest encoding
//! - Floats are always doubles; every NaN is written as the quiet NaN
//! - Object ids are tag 37 over a 16-byte string
//! - No indefinite-length items
//!
//! Because key order is normalized, two equal documents always encode to the
//! same bytes. The cache relies on this to remove entries by value.
//!
//! ## Usage
//!
//! ```
//! use mongoclass_codec::{doc, from_cbor, to_canonical_cbor, Value};
//!
//! let value = Value::Document(doc! { "x" => 1, "y" => 2.5 });
//! let bytes = to_canonical_cbor(&value);
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod document;
mod encoder;
mod error;
mod object_id;
mod value;

pub use decoder::{document_from_cbor, from_cbor};
pub use document::Document;
pub use encoder::{document_to_canonical_cbor, to_canonical_cbor, OBJECT_ID_TAG};
pub use error::{CodecError, CodecResult};
pub use object_id::ObjectId;
pub use value::Value;
