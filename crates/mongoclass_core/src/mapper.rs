//! Record to document mapping.
//!
//! Encoding flattens a record's fields into a [`Document`]. When nesting is
//! on, a field holding another persisted record (or a sequence of them)
//! becomes a tagged wrapper:
//!
//! ```text
//! { "data": { ...fields... }, "_nest_collection": "metadata", "_nest_database": "main" }
//! ```
//!
//! Decoding recognizes a wrapper by its `_nest_collection` key and rebuilds
//! the nested record through the [`Registry`] entry named by its tags.

use crate::entity::{AnyEntity, Entity, Nestable, PersistenceHandle};
use crate::error::{MapResult, MappingError};
use crate::record::{Decoded, Field, FieldSet, Record};
use crate::registry::Registry;
use mongoclass_codec::{doc, Document, Value};
use mongoclass_driver::{Namespace, ID_FIELD};
use std::sync::Arc;

/// Wrapper key holding the nested record's fields.
pub const NEST_DATA: &str = "data";

/// Wrapper key holding the nested record's collection.
pub const NEST_COLLECTION: &str = "_nest_collection";

/// Wrapper key holding the nested record's database.
pub const NEST_DATABASE: &str = "_nest_database";

/// Encodes and decodes records.
#[derive(Debug)]
pub struct Mapper {
    registry: Arc<Registry>,
    max_depth: usize,
}

impl Mapper {
    /// Creates a mapper over `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>, max_depth: usize) -> Self {
        Self {
            registry,
            max_depth,
        }
    }

    /// The registry used to resolve record types.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Deepest chain of nested records accepted.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Encodes a record's user fields.
    ///
    /// # Errors
    ///
    /// - [`MappingError::ReservedField`] if the record declares `_id`
    /// - [`MappingError::NestingDisabled`] if it holds a nested record and
    ///   `perform_nesting` is false
    /// - [`MappingError::NestingTooDeep`] past the depth limit
    pub fn encode(&self, record: &dyn Nestable, perform_nesting: bool) -> MapResult<Document> {
        self.encode_at(record, perform_nesting, 0)
    }

    fn encode_at(
        &self,
        record: &dyn Nestable,
        perform_nesting: bool,
        depth: usize,
    ) -> MapResult<Document> {
        if depth > self.max_depth {
            return Err(MappingError::NestingTooDeep {
                limit: self.max_depth,
            });
        }

        let fields = record.fields();
        let mut document = Document::with_capacity(fields.len());
        for (name, field) in fields {
            if name == ID_FIELD {
                return Err(MappingError::ReservedField { field: name });
            }
            let value = self.encode_field(&name, field, perform_nesting, depth)?;
            document.insert(name, value);
        }
        Ok(document)
    }

    fn encode_field(
        &self,
        name: &str,
        field: Field<'_>,
        perform_nesting: bool,
        depth: usize,
    ) -> MapResult<Value> {
        match field {
            Field::Value(value) => Ok(value),
            Field::Nested(nested) => {
                if !perform_nesting {
                    return Err(MappingError::NestingDisabled {
                        field: name.to_string(),
                    });
                }
                let namespace = &nested.binding().namespace;
                let data = self.encode_at(nested, true, depth + 1)?;
                Ok(Value::Document(doc! {
                    NEST_DATA => data,
                    NEST_COLLECTION => namespace.collection.as_str(),
                    NEST_DATABASE => namespace.database.as_str(),
                }))
            }
            Field::Sequence(items) => items
                .into_iter()
                .map(|item| self.encode_field(name, item, perform_nesting, depth))
                .collect::<MapResult<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Decodes a stored document into the record type registered for
    /// `namespace`.
    ///
    /// Wrappers are unwrapped when the registered type is nested or
    /// `force_nested` is set. A non-null `_id` becomes the identifier. The
    /// input document is not modified.
    ///
    /// # Errors
    ///
    /// - [`MappingError::UnregisteredCollection`] for an unknown namespace,
    ///   including one named by a wrapper
    /// - [`MappingError::MalformedNest`] for a wrapper missing its tags or data
    /// - whatever the record's [`Record::from_fields`] returns
    pub fn decode(
        &self,
        document: &Document,
        namespace: &Namespace,
        force_nested: bool,
    ) -> MapResult<Box<dyn AnyEntity>> {
        self.decode_at(
            document,
            &namespace.database,
            &namespace.collection,
            force_nested,
            0,
        )
    }

    /// Decodes and downcasts to `Entity<T>`.
    ///
    /// # Errors
    ///
    /// As [`Mapper::decode`], plus [`MappingError::TypeMismatch`] if another
    /// record type is registered for `namespace`.
    pub fn decode_as<T: Record>(
        &self,
        document: &Document,
        namespace: &Namespace,
        force_nested: bool,
    ) -> MapResult<Entity<T>> {
        let entity = self.decode(document, namespace, force_nested)?;
        let found = entity.type_name();
        entity
            .into_any()
            .downcast::<Entity<T>>()
            .map(|entity| *entity)
            .map_err(|_| MappingError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: found.to_string(),
            })
    }

    fn decode_at(
        &self,
        document: &Document,
        database: &str,
        collection: &str,
        force_nested: bool,
        depth: usize,
    ) -> MapResult<Box<dyn AnyEntity>> {
        if depth > self.max_depth {
            return Err(MappingError::NestingTooDeep {
                limit: self.max_depth,
            });
        }

        let entry = self.registry.lookup(database, collection)?;
        let unwrap = force_nested || entry.binding.nested;

        let mut document = document.clone();
        // Falsy ids (null, 0, "") leave the entity unpersisted.
        let identifier = document.remove(ID_FIELD).filter(Value::is_truthy);

        let mut fields = Vec::with_capacity(document.len());
        for (name, value) in document {
            let decoded = if unwrap {
                self.unwrap_field(&name, value, depth)?
            } else {
                Decoded::Value(value)
            };
            fields.push((name, decoded));
        }

        let mut fields = FieldSet::from_decoded(entry.type_name, fields);
        let handle = PersistenceHandle::new(entry.binding.clone(), identifier);
        (entry.constructor)(&mut fields, handle)
    }

    fn unwrap_field(&self, name: &str, value: Value, depth: usize) -> MapResult<Decoded> {
        match value {
            Value::Document(wrapper) if Self::is_nest_wrapper(&wrapper) => self
                .unwrap_wrapper(name, &wrapper, depth)
                .map(Decoded::Nested),
            Value::Array(items)
                if items
                    .iter()
                    .any(|item| item.as_document().is_some_and(Self::is_nest_wrapper)) =>
            {
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Document(wrapper) if Self::is_nest_wrapper(&wrapper) => self
                            .unwrap_wrapper(name, &wrapper, depth)
                            .map(Decoded::Nested),
                        other => Ok(Decoded::Value(other)),
                    })
                    .collect::<MapResult<Vec<_>>>()
                    .map(Decoded::Sequence)
            }
            other => Ok(Decoded::Value(other)),
        }
    }

    fn unwrap_wrapper(
        &self,
        field: &str,
        wrapper: &Document,
        depth: usize,
    ) -> MapResult<Box<dyn AnyEntity>> {
        let collection = wrapper.get_text(NEST_COLLECTION).ok_or_else(|| {
            MappingError::malformed_nest(field, format!("'{NEST_COLLECTION}' must be text"))
        })?;
        let database = wrapper.get_text(NEST_DATABASE).ok_or_else(|| {
            MappingError::malformed_nest(field, format!("'{NEST_DATABASE}' must be text"))
        })?;
        let data = wrapper.get_document(NEST_DATA).ok_or_else(|| {
            MappingError::malformed_nest(field, format!("'{NEST_DATA}' must be a document"))
        })?;
        self.decode_at(data, database, collection, true, depth + 1)
    }

    /// Whether a document is a nested-reference wrapper.
    pub fn is_nest_wrapper(document: &Document) -> bool {
        document.contains_key(NEST_COLLECTION)
    }
}
