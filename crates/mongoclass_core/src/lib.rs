//! # mongoclass core
//!
//! Object-document mapping over a schemaless document store.
//!
//! A plain Rust type implements [`Record`]; declaring it through
//! [`Client::model`] binds it to a database and collection and yields a
//! [`Model`] with the persistence operations (insert, update, save, delete,
//! find). Records live inside [`Entity`] values that carry the store
//! identifier next to the user's fields.
//!
//! ## Architecture
//!
//! - [`Registry`] maps `(database, collection)` to a record constructor and
//!   nesting policy
//! - [`Mapper`] encodes records to documents and back, turning nested
//!   records into tagged wrappers and resolving them through the registry
//! - [`Model`] runs entity operations against the driver
//! - [`Cursor`] decodes lazily over a driver cursor
//!
//! ## Nested Records
//!
//! With nesting on, a field holding another entity is stored as
//!
//! ```text
//! { "data": { ... }, "_nest_collection": "...", "_nest_database": "..." }
//! ```
//!
//! so it can be rebuilt as the right type on read, including records that
//! contain entities of their own type.
//!
//! ## Thread Safety
//!
//! [`Client`], [`Model`] and [`Registry`] are `Send + Sync` and may be
//! shared across threads.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod cursor;
mod entity;
mod error;
mod mapper;
mod model;
mod record;
mod registry;

pub use client::{Client, InsertClassesOptions, InsertClassesOutcome, Insertable};
pub use config::{Config, ModelOptions};
pub use cursor::Cursor;
pub use entity::{AnyEntity, Binding, Entity, Nestable, PersistenceHandle};
pub use error::{CoreError, CoreResult, MapResult, MappingError};
pub use mapper::{Mapper, NEST_COLLECTION, NEST_DATA, NEST_DATABASE};
pub use model::{Model, SaveOutcome, UpdateOptions};
pub use record::{default_collection_name, Decoded, Field, FieldSet, Fields, FromValue, Record};
pub use registry::{construct, Constructor, Registry, RegistryEntry};

pub use mongoclass_codec::{doc, Document, ObjectId, Value};
pub use mongoclass_driver::{
    DeleteOutcome, DocumentDriver, InMemoryDriver, InsertManyOutcome, InsertOneOutcome, Namespace,
    SortOrder, UpdateOutcome, ID_FIELD,
};
