//! Per-record-type persistence operations.

use crate::client::{ClientState, InsertClassesOptions, InsertClassesOutcome, Insertable};
use crate::cursor::Cursor;
use crate::entity::{Binding, Entity, PersistenceHandle};
use crate::error::CoreResult;
use crate::mapper::Mapper;
use crate::record::Record;
use mongoclass_codec::{doc, Document, Value};
use mongoclass_driver::{
    DeleteOutcome, InsertManyOptions, InsertManyOutcome, InsertOneOutcome, Namespace,
    UpdateOneOptions, UpdateOutcome, ID_FIELD,
};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Options for [`Model::update_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Re-fetch and return the stored row after updating.
    pub return_new: bool,
    /// Insert a new row when nothing matches the identifier.
    pub upsert: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            return_new: true,
            upsert: false,
        }
    }
}

impl UpdateOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the stored row is re-fetched.
    #[must_use]
    pub const fn return_new(mut self, value: bool) -> Self {
        self.return_new = value;
        self
    }

    /// Sets whether a missing row is inserted.
    #[must_use]
    pub const fn upsert(mut self, value: bool) -> Self {
        self.upsert = value;
        self
    }
}

/// What [`Model::save`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The entity had no identifier and was inserted.
    Inserted(InsertOneOutcome),
    /// The stored row was overwritten with the entity's fields.
    Updated(UpdateOutcome),
}

/// Persistence operations for record type `T` bound to one collection.
///
/// Obtained from [`Client::model`](crate::Client::model). Declaring a model
/// registers `T` for its namespace, so stored rows (and nested references
/// to them) can be decoded.
///
/// # Example
///
/// ```
/// use mongoclass_codec::doc;
/// use mongoclass_core::{Client, FieldSet, Fields, MapResult, Record};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Profile {
///     name: String,
///     country: String,
/// }
///
/// impl Record for Profile {
///     fn to_fields(&self) -> Fields<'_> {
///         Fields::new()
///             .value("name", self.name.as_str())
///             .value("country", self.country.as_str())
///     }
///
///     fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
///         Ok(Self {
///             name: fields.take("name")?,
///             country: fields.take_or("country", "US".to_string())?,
///         })
///     }
/// }
///
/// let client = Client::in_memory();
/// let profiles = client.model::<Profile>();
///
/// let mut john = profiles.entity(Profile { name: "John".into(), country: "US".into() });
/// profiles.insert(&mut john).unwrap();
/// assert!(john.is_persisted());
///
/// let (_, john) = profiles
///     .update(&mut john, doc! { "$set" => doc! { "country" => "KE" } })
///     .unwrap();
/// assert_eq!(john.country, "KE");
/// ```
pub struct Model<T: Record> {
    binding: Arc<Binding>,
    insert_on_init: bool,
    state: Arc<ClientState>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Model<T> {
    pub(crate) fn new(binding: Arc<Binding>, insert_on_init: bool, state: Arc<ClientState>) -> Self {
        Self {
            binding,
            insert_on_init,
            state,
            _record: PhantomData,
        }
    }

    /// Bound database and collection.
    pub fn namespace(&self) -> &Namespace {
        &self.binding.namespace
    }

    /// Bound database.
    pub fn database(&self) -> &str {
        &self.binding.namespace.database
    }

    /// Bound collection.
    pub fn collection(&self) -> &str {
        &self.binding.namespace.collection
    }

    /// Whether nested records are written as wrappers.
    pub fn nested(&self) -> bool {
        self.binding.nested
    }

    /// Whether [`Model::create`] inserts immediately.
    pub fn insert_on_init(&self) -> bool {
        self.insert_on_init
    }

    /// The mapper shared with the client.
    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.state.mapper
    }

    /// Wraps a record as an unpersisted entity.
    pub fn entity(&self, record: T) -> Entity<T> {
        Entity::from_parts(record, PersistenceHandle::new(Arc::clone(&self.binding), None))
    }

    /// Wraps a record, inserting it if the model was declared with
    /// `insert_on_init`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create(&self, record: T) -> CoreResult<Entity<T>> {
        self.create_with(record, None)
    }

    /// Wraps a record. `insert` overrides the model's `insert_on_init`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_with(&self, record: T, insert: Option<bool>) -> CoreResult<Entity<T>> {
        let mut entity = self.entity(record);
        if insert.unwrap_or(self.insert_on_init) {
            self.insert(&mut entity)?;
        }
        Ok(entity)
    }

    /// Inserts the entity and records its new identifier.
    ///
    /// Not idempotent: inserting twice stores two rows, and the entity keeps
    /// the second identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the driver insert fails.
    pub fn insert(&self, entity: &mut Entity<T>) -> CoreResult<InsertOneOutcome> {
        insert_entity(&self.state, entity)
    }

    /// Applies an update operation to the entity's row and returns the
    /// stored result.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver rejects the update or the re-fetched
    /// row cannot be decoded.
    pub fn update(
        &self,
        entity: &mut Entity<T>,
        operation: Document,
    ) -> CoreResult<(UpdateOutcome, Entity<T>)> {
        self.update_with(entity, operation, UpdateOptions::default())
    }

    /// Applies an update operation to the row matching the entity's
    /// identifier.
    ///
    /// An entity without identifier filters on a null `_id`. If that update
    /// upserts, the entity takes the new identifier. With `return_new` the
    /// row is re-fetched and decoded; otherwise (or if the row is gone) a
    /// copy of the entity is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver rejects the update or the re-fetched
    /// row cannot be decoded.
    pub fn update_with(
        &self,
        entity: &mut Entity<T>,
        operation: Document,
        options: UpdateOptions,
    ) -> CoreResult<(UpdateOutcome, Entity<T>)> {
        let namespace = entity.namespace().clone();
        let outcome = self.state.driver.update_one(
            &namespace,
            &identifier_filter(entity.identifier()),
            &operation,
            UpdateOneOptions {
                upsert: options.upsert,
            },
        )?;
        tracing::debug!(
            namespace = %namespace,
            matched = outcome.matched_count,
            modified = outcome.modified_count,
            upserted = outcome.upserted_id.is_some(),
            "updated entity"
        );

        if !has_identifier(entity) {
            if let Some(id) = &outcome.upserted_id {
                entity.set_identifier(id.clone());
            }
        }

        if !options.return_new {
            return Ok((outcome, entity.clone()));
        }

        let stored = self
            .state
            .driver
            .find_one(&namespace, &identifier_filter(entity.identifier()))?;
        let current = match stored {
            Some(document) => self
                .state
                .mapper
                .decode_as::<T>(&document, &namespace, false)?,
            None => entity.clone(),
        };
        Ok((outcome, current))
    }

    /// Inserts an unpersisted entity, or overwrites a persisted one's row
    /// with its current fields.
    ///
    /// # Errors
    ///
    /// As [`Model::insert`] and [`Model::update`].
    pub fn save(&self, entity: &mut Entity<T>) -> CoreResult<(SaveOutcome, Entity<T>)> {
        self.save_with(entity, true)
    }

    /// As [`Model::save`], choosing whether the stored row is re-fetched.
    ///
    /// # Errors
    ///
    /// As [`Model::insert`] and [`Model::update_with`].
    pub fn save_with(
        &self,
        entity: &mut Entity<T>,
        return_new: bool,
    ) -> CoreResult<(SaveOutcome, Entity<T>)> {
        if !has_identifier(entity) {
            let outcome = self.insert(entity)?;
            return Ok((SaveOutcome::Inserted(outcome), entity.clone()));
        }

        let fields = self.state.mapper.encode(&*entity, entity.nested())?;
        let (outcome, current) = self.update_with(
            entity,
            doc! { "$set" => fields },
            UpdateOptions::new().return_new(return_new),
        )?;
        Ok((SaveOutcome::Updated(outcome), current))
    }

    /// Deletes the row matching the entity's identifier.
    ///
    /// The entity keeps its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver delete fails.
    pub fn delete(&self, entity: &Entity<T>) -> CoreResult<DeleteOutcome> {
        let namespace = entity.namespace();
        let outcome = self
            .state
            .driver
            .delete_one(namespace, &identifier_filter(entity.identifier()))?;
        tracing::debug!(
            namespace = %namespace,
            deleted = outcome.deleted_count,
            "deleted entity"
        );
        Ok(outcome)
    }

    /// Inserts one entity or a batch. See
    /// [`Client::insert_classes`](crate::Client::insert_classes).
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or any insert fails.
    pub fn insert_classes(
        &self,
        items: Insertable<'_, T>,
        options: InsertClassesOptions,
    ) -> CoreResult<InsertClassesOutcome> {
        insert_classes(&self.state, items, options)
    }

    /// First row matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid filter or an undecodable row.
    pub fn find_class(&self, filter: Document) -> CoreResult<Option<Entity<T>>> {
        self.state
            .driver
            .find_one(self.namespace(), &filter)?
            .map(|document| self.decode(&document))
            .transpose()
    }

    /// Lazy cursor over rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid filter.
    pub fn find_classes(&self, filter: Document) -> CoreResult<Cursor<Entity<T>>> {
        let inner = self.state.driver.find(self.namespace(), filter)?;
        Ok(Cursor::new(
            inner,
            self.namespace().clone(),
            Arc::clone(&self.state.mapper),
            decode_entity::<T>,
        ))
    }

    /// Counts rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid filter.
    pub fn count_documents(&self, filter: Document) -> CoreResult<u64> {
        Ok(self.state.driver.count_documents(self.namespace(), &filter)?)
    }

    /// One page of rows matching `filter`. Pages start at 1; page 0 is
    /// treated as page 1.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid filter.
    pub fn paginate(
        &self,
        page: usize,
        page_size: usize,
        filter: Document,
    ) -> CoreResult<Cursor<Entity<T>>> {
        self.paginate_with(page, page_size, filter, |cursor| cursor)
    }

    /// As [`Model::paginate`], letting `pre_call` adjust the cursor (for
    /// example to sort it) before the page window is applied.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid filter.
    pub fn paginate_with<F>(
        &self,
        page: usize,
        page_size: usize,
        filter: Document,
        pre_call: F,
    ) -> CoreResult<Cursor<Entity<T>>>
    where
        F: FnOnce(Cursor<Entity<T>>) -> Cursor<Entity<T>>,
    {
        let skip = page.saturating_sub(1).saturating_mul(page_size);
        let cursor = pre_call(self.find_classes(filter)?);
        Ok(cursor.skip(skip).limit(page_size))
    }

    /// Encodes an entity as it would be stored. `nested` overrides the
    /// model's nesting policy.
    ///
    /// # Errors
    ///
    /// Returns a mapping error if the entity cannot be encoded that way.
    pub fn as_document(&self, entity: &Entity<T>, nested: Option<bool>) -> CoreResult<Document> {
        let nested = nested.unwrap_or(self.binding.nested);
        Ok(self.state.mapper.encode(entity, nested)?)
    }

    /// Decodes a stored document of this model's namespace.
    ///
    /// # Errors
    ///
    /// Returns a mapping error if the document does not fit `T`.
    pub fn decode(&self, document: &Document) -> CoreResult<Entity<T>> {
        decode_entity(&self.state.mapper, self.namespace(), document.clone())
    }
}

impl<T: Record> Clone for Model<T> {
    fn clone(&self) -> Self {
        Self {
            binding: Arc::clone(&self.binding),
            insert_on_init: self.insert_on_init,
            state: Arc::clone(&self.state),
            _record: PhantomData,
        }
    }
}

impl<T: Record> fmt::Debug for Model<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("record", &std::any::type_name::<T>())
            .field("binding", &self.binding)
            .field("insert_on_init", &self.insert_on_init)
            .finish_non_exhaustive()
    }
}

pub(crate) fn decode_entity<T: Record>(
    mapper: &Mapper,
    namespace: &Namespace,
    document: Document,
) -> CoreResult<Entity<T>> {
    Ok(mapper.decode_as::<T>(&document, namespace, false)?)
}

fn identifier_filter(identifier: Option<&Value>) -> Document {
    doc! { ID_FIELD => identifier.cloned().unwrap_or(Value::Null) }
}

fn has_identifier<T: Record>(entity: &Entity<T>) -> bool {
    entity.identifier().is_some_and(Value::is_truthy)
}

pub(crate) fn insert_entity<T: Record>(
    state: &ClientState,
    entity: &mut Entity<T>,
) -> CoreResult<InsertOneOutcome> {
    let document = state.mapper.encode(&*entity, entity.nested())?;
    let outcome = state.driver.insert_one(entity.namespace(), document)?;
    tracing::debug!(
        namespace = %entity.namespace(),
        id = ?outcome.inserted_id,
        "inserted entity"
    );
    entity.set_identifier(outcome.inserted_id.clone());
    Ok(outcome)
}

pub(crate) fn insert_classes<T: Record>(
    state: &ClientState,
    items: Insertable<'_, T>,
    options: InsertClassesOptions,
) -> CoreResult<InsertClassesOutcome> {
    let entities = match items {
        Insertable::One(entity) => {
            return insert_entity(state, entity).map(InsertClassesOutcome::One);
        }
        Insertable::Many(entities) => entities,
    };

    if options.insert_one {
        return entities
            .iter_mut()
            .map(|entity| insert_entity(state, entity))
            .collect::<CoreResult<Vec<_>>>()
            .map(InsertClassesOutcome::Each);
    }

    let Some(first) = entities.first() else {
        return Ok(InsertClassesOutcome::Bulk(InsertManyOutcome {
            inserted_ids: Vec::new(),
        }));
    };
    let namespace = first.namespace().clone();
    let documents = entities
        .iter()
        .map(|entity| state.mapper.encode(entity, entity.nested()))
        .collect::<Result<Vec<_>, _>>()?;

    let outcome = state.driver.insert_many(
        &namespace,
        documents,
        InsertManyOptions {
            ordered: options.ordered,
        },
    )?;
    tracing::debug!(
        namespace = %namespace,
        count = outcome.inserted_ids.len(),
        ordered = options.ordered,
        "bulk inserted entities"
    );

    // Ordered bulk inserts leave identifiers unset.
    if !options.ordered {
        for (entity, id) in entities.iter_mut().zip(&outcome.inserted_ids) {
            entity.set_identifier(id.clone());
        }
    }
    Ok(InsertClassesOutcome::Bulk(outcome))
}
