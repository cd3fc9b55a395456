//! # mongoclass driver
//!
//! The document-store contract the mapper is written against, and an
//! embedded in-memory engine that satisfies it.
//!
//! Drivers see plain [`Document`](mongoclass_codec::Document)s only. They
//! know nothing about records, bindings, or nested-reference wrappers.
//!
//! ## Design Principles
//!
//! - One trait for the store ([`DocumentDriver`]), one for its cursors
//!   ([`DriverCursor`])
//! - Cursors are lazy: nothing is read until the first `next`
//! - Drivers must be `Send + Sync`
//!
//! ## Example
//!
//! ```rust
//! use mongoclass_codec::doc;
//! use mongoclass_driver::{DocumentDriver, InMemoryDriver, Namespace, SortOrder};
//!
//! let driver = InMemoryDriver::new();
//! let ns = Namespace::new("main", "position");
//! for x in [3, 1, 2] {
//!     driver.insert_one(&ns, doc! { "x" => x }).unwrap();
//! }
//!
//! let mut cursor = driver.find(&ns, doc! {}).unwrap();
//! cursor.set_sort(vec![("x".to_string(), SortOrder::Ascending)]).unwrap();
//! let xs: Vec<i64> = cursor
//!     .map(|doc| doc.unwrap().get("x").and_then(|v| v.as_integer()).unwrap())
//!     .collect();
//! assert_eq!(xs, vec![1, 2, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod memory;
pub mod query;

pub use driver::{
    DeleteOutcome, DocumentDriver, DriverCursor, InsertManyOptions, InsertManyOutcome,
    InsertOneOutcome, Namespace, SortOrder, UpdateOneOptions, UpdateOutcome, WherePredicate,
};
pub use error::{DriverError, DriverResult};
pub use memory::{InMemoryDriver, MemoryCursor};
pub use query::ID_FIELD;
