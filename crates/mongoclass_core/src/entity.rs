//! Persisted record instances.

use crate::record::{Fields, Record};
use mongoclass_codec::Value;
use mongoclass_driver::Namespace;
use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Where a record type lives and how it nests.
///
/// Fixed when the record type is declared; shared by every entity of that
/// declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Bound database and collection.
    pub namespace: Namespace,
    /// Whether nested records are written as tagged wrappers.
    pub nested: bool,
}

impl Binding {
    /// Creates a binding.
    #[must_use]
    pub fn new(namespace: Namespace, nested: bool) -> Self {
        Self { namespace, nested }
    }
}

/// The mapper-owned part of a persisted record: its binding and identifier.
///
/// None of this is part of the record's own fields.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    binding: Arc<Binding>,
    identifier: Option<Value>,
}

impl PersistenceHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(binding: Arc<Binding>, identifier: Option<Value>) -> Self {
        Self {
            binding,
            identifier,
        }
    }

    /// The binding.
    #[must_use]
    pub fn binding(&self) -> &Arc<Binding> {
        &self.binding
    }

    /// The store-assigned identifier, unset until the first insert.
    #[must_use]
    pub fn identifier(&self) -> Option<&Value> {
        self.identifier.as_ref()
    }
}

/// Object-safe view of an entity, used to encode nested records of any type.
pub trait Nestable: Send + Sync {
    /// The entity's binding.
    fn binding(&self) -> &Binding;

    /// The record's user-visible fields.
    fn fields(&self) -> Fields<'_>;
}

/// Type-erased entity produced by registry-driven decoding.
///
/// Downcast with [`AnyEntity::into_any`] or [`AnyEntity::as_any`] to an
/// [`Entity<T>`].
pub trait AnyEntity: Nestable + fmt::Debug {
    /// Borrow as [`Any`].
    fn as_any(&self) -> &dyn Any;

    /// Convert into a boxed [`Any`].
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Name of the record type.
    fn type_name(&self) -> &'static str;

    /// The store-assigned identifier.
    fn identifier(&self) -> Option<&Value>;

    /// Clones into a new box.
    fn clone_box(&self) -> Box<dyn AnyEntity>;

    /// Field-for-field equality with another entity of any type.
    fn eq_dyn(&self, other: &dyn AnyEntity) -> bool;
}

impl Clone for Box<dyn AnyEntity> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for dyn AnyEntity {
    fn eq(&self, other: &Self) -> bool {
        self.eq_dyn(other)
    }
}

/// A record bound to a collection, plus its identifier once persisted.
///
/// Entities dereference to their record, so fields read and write as usual.
/// Equality compares the records only; the identifier and binding do not
/// take part.
///
/// Entities start unpersisted. [`Model::insert`](crate::Model::insert) sets
/// the identifier, which is then the only key used by update, save and
/// delete.
#[derive(Clone)]
pub struct Entity<T: Record> {
    record: T,
    handle: PersistenceHandle,
}

impl<T: Record> Entity<T> {
    pub(crate) fn from_parts(record: T, handle: PersistenceHandle) -> Self {
        Self { record, handle }
    }

    /// The record.
    pub fn record(&self) -> &T {
        &self.record
    }

    /// The record, mutably.
    pub fn record_mut(&mut self) -> &mut T {
        &mut self.record
    }

    /// Consumes the entity, returning the record.
    pub fn into_record(self) -> T {
        self.record
    }

    /// The persistence handle.
    pub fn handle(&self) -> &PersistenceHandle {
        &self.handle
    }

    /// The store-assigned identifier, unset until the first insert.
    pub fn identifier(&self) -> Option<&Value> {
        self.handle.identifier.as_ref()
    }

    /// Whether the entity has an identifier.
    pub fn is_persisted(&self) -> bool {
        self.handle.identifier.is_some()
    }

    /// Bound database and collection.
    pub fn namespace(&self) -> &Namespace {
        &self.handle.binding.namespace
    }

    /// Bound database.
    pub fn database(&self) -> &str {
        &self.handle.binding.namespace.database
    }

    /// Bound collection.
    pub fn collection(&self) -> &str {
        &self.handle.binding.namespace.collection
    }

    /// Whether this entity's type writes nested records as wrappers.
    pub fn nested(&self) -> bool {
        self.handle.binding.nested
    }

    pub(crate) fn set_identifier(&mut self, identifier: Value) {
        self.handle.identifier = Some(identifier);
    }
}

impl<T: Record> Deref for Entity<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

impl<T: Record> DerefMut for Entity<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.record
    }
}

impl<T: Record> PartialEq for Entity<T> {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

impl<T: Record> fmt::Debug for Entity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("namespace", &self.handle.binding.namespace)
            .field("identifier", &self.handle.identifier)
            .field("record", &self.record)
            .finish()
    }
}

impl<T: Record> Nestable for Entity<T> {
    fn binding(&self) -> &Binding {
        &self.handle.binding
    }

    fn fields(&self) -> Fields<'_> {
        self.record.to_fields()
    }
}

impl<T: Record> AnyEntity for Entity<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn identifier(&self) -> Option<&Value> {
        self.handle.identifier.as_ref()
    }

    fn clone_box(&self) -> Box<dyn AnyEntity> {
        Box::new(self.clone())
    }

    fn eq_dyn(&self, other: &dyn AnyEntity) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }
}
