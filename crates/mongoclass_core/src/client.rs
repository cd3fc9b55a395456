//! Client handle owning the driver, registry and mapper.

use crate::config::{Config, ModelOptions};
use crate::cursor::Cursor;
use crate::entity::{AnyEntity, Entity};
use crate::error::CoreResult;
use crate::mapper::Mapper;
use crate::model::{self, Model};
use crate::record::Record;
use crate::registry::Registry;
use mongoclass_codec::{Document, Value};
use mongoclass_driver::{
    DocumentDriver, InMemoryDriver, InsertManyOutcome, InsertOneOutcome, Namespace,
};
use std::fmt;
use std::sync::Arc;

pub(crate) struct ClientState {
    pub(crate) driver: Arc<dyn DocumentDriver>,
    pub(crate) mapper: Arc<Mapper>,
    pub(crate) config: Config,
}

/// Records handed to [`Client::insert_classes`].
#[derive(Debug)]
pub enum Insertable<'a, T: Record> {
    /// A single entity.
    One(&'a mut Entity<T>),
    /// A batch of entities, stored in the first entity's collection.
    Many(&'a mut [Entity<T>]),
}

/// Options for [`Client::insert_classes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertClassesOptions {
    /// Insert a batch one entity at a time instead of in one bulk write.
    pub insert_one: bool,
    /// Bulk writes stop at the first failure. Ordered bulk writes do not
    /// set the entities' identifiers.
    pub ordered: bool,
}

impl Default for InsertClassesOptions {
    fn default() -> Self {
        Self {
            insert_one: false,
            ordered: true,
        }
    }
}

impl InsertClassesOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether a batch is inserted one entity at a time.
    #[must_use]
    pub const fn insert_one(mut self, value: bool) -> Self {
        self.insert_one = value;
        self
    }

    /// Sets whether a bulk write is ordered.
    #[must_use]
    pub const fn ordered(mut self, value: bool) -> Self {
        self.ordered = value;
        self
    }
}

/// What [`Client::insert_classes`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertClassesOutcome {
    /// A single entity was inserted.
    One(InsertOneOutcome),
    /// A batch was inserted one entity at a time.
    Each(Vec<InsertOneOutcome>),
    /// A batch was inserted in one bulk write.
    Bulk(InsertManyOutcome),
}

impl InsertClassesOutcome {
    /// Identifiers of every inserted row, in input order.
    pub fn inserted_ids(&self) -> Vec<Value> {
        match self {
            Self::One(outcome) => vec![outcome.inserted_id.clone()],
            Self::Each(outcomes) => outcomes.iter().map(|o| o.inserted_id.clone()).collect(),
            Self::Bulk(outcome) => outcome.inserted_ids.clone(),
        }
    }
}

/// Entry point: a driver plus the record type registry.
///
/// Cloning is cheap; clones share the driver and registry.
///
/// # Example
///
/// ```
/// use mongoclass_core::{Client, Config, FieldSet, Fields, MapResult, ModelOptions, Record};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Position {
///     x: i64,
/// }
///
/// impl Record for Position {
///     fn to_fields(&self) -> Fields<'_> {
///         Fields::new().value("x", self.x)
///     }
///
///     fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
///         Ok(Self { x: fields.take_or_default("x")? })
///     }
/// }
///
/// let client = Client::in_memory_with_config(Config::new().default_database("mongoclass"));
/// let coordinates = client.model_with::<Position>(
///     ModelOptions::new().collection("coordinates").insert_on_init(true),
/// );
/// coordinates.create(Position { x: 3 }).unwrap();
///
/// let found = client
///     .find_class::<Position>("coordinates", Default::default(), None)
///     .unwrap()
///     .unwrap();
/// assert_eq!(found.x, 3);
/// ```
#[derive(Clone)]
pub struct Client {
    state: Arc<ClientState>,
}

impl Client {
    /// Creates a client over `driver` with default configuration.
    pub fn new(driver: impl DocumentDriver + 'static) -> Self {
        Self::with_config(driver, Config::default())
    }

    /// Creates a client over `driver`.
    pub fn with_config(driver: impl DocumentDriver + 'static, config: Config) -> Self {
        Self::from_shared(Arc::new(driver), config)
    }

    /// Creates a client over a shared driver.
    pub fn from_shared(driver: Arc<dyn DocumentDriver>, config: Config) -> Self {
        let registry = Arc::new(Registry::new());
        let mapper = Arc::new(Mapper::new(registry, config.max_nesting_depth));
        Self {
            state: Arc::new(ClientState {
                driver,
                mapper,
                config,
            }),
        }
    }

    /// Creates a client over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(InMemoryDriver::new())
    }

    /// Creates a client over a fresh in-memory store.
    pub fn in_memory_with_config(config: Config) -> Self {
        Self::with_config(InMemoryDriver::new(), config)
    }

    /// The client's configuration.
    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Database used when none is named.
    pub fn default_database(&self) -> &str {
        &self.state.config.default_database
    }

    /// The record type registry.
    pub fn registry(&self) -> &Arc<Registry> {
        self.state.mapper.registry()
    }

    /// The mapper.
    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.state.mapper
    }

    /// The driver.
    pub fn driver(&self) -> &Arc<dyn DocumentDriver> {
        &self.state.driver
    }

    /// Declares `T` with default options: its default collection in the
    /// default database, not nested.
    pub fn model<T: Record>(&self) -> Model<T> {
        self.model_with(ModelOptions::default())
    }

    /// Declares `T` and registers it for the resolved namespace.
    ///
    /// Declaring a second type for the same namespace replaces the first in
    /// the registry.
    pub fn model_with<T: Record>(&self, options: ModelOptions) -> Model<T> {
        let namespace = Namespace::new(
            options
                .database
                .unwrap_or_else(|| self.state.config.default_database.clone()),
            options.collection.unwrap_or_else(T::collection_name),
        );
        let entry = self.registry().register::<T>(namespace, options.nested);
        Model::new(entry.binding, options.insert_on_init, Arc::clone(&self.state))
    }

    fn namespace(&self, collection: &str, database: Option<&str>) -> Namespace {
        Namespace::new(database.unwrap_or(self.default_database()), collection)
    }

    /// First row of `collection` matching `filter`, decoded as `T`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid filter, an unregistered namespace, or
    /// a row registered to another type.
    pub fn find_class<T: Record>(
        &self,
        collection: &str,
        filter: Document,
        database: Option<&str>,
    ) -> CoreResult<Option<Entity<T>>> {
        let namespace = self.namespace(collection, database);
        self.state
            .driver
            .find_one(&namespace, &filter)?
            .map(|document| model::decode_entity::<T>(&self.state.mapper, &namespace, document))
            .transpose()
    }

    /// Lazy cursor over rows of `collection` matching `filter`, decoded
    /// as `T`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid filter.
    pub fn find_classes<T: Record>(
        &self,
        collection: &str,
        filter: Document,
        database: Option<&str>,
    ) -> CoreResult<Cursor<Entity<T>>> {
        let namespace = self.namespace(collection, database);
        let inner = self.state.driver.find(&namespace, filter)?;
        Ok(Cursor::new(
            inner,
            namespace,
            Arc::clone(&self.state.mapper),
            model::decode_entity::<T>,
        ))
    }

    /// First row of `collection` matching `filter`, decoded as whatever
    /// type is registered there.
    ///
    /// # Errors
    ///
    /// As [`Client::find_class`].
    pub fn find_any(
        &self,
        collection: &str,
        filter: Document,
        database: Option<&str>,
    ) -> CoreResult<Option<Box<dyn AnyEntity>>> {
        let namespace = self.namespace(collection, database);
        self.state
            .driver
            .find_one(&namespace, &filter)?
            .map(|document| decode_any(&self.state.mapper, &namespace, document))
            .transpose()
    }

    /// Lazy cursor of type-erased entities.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid filter.
    pub fn find_any_classes(
        &self,
        collection: &str,
        filter: Document,
        database: Option<&str>,
    ) -> CoreResult<Cursor<Box<dyn AnyEntity>>> {
        let namespace = self.namespace(collection, database);
        let inner = self.state.driver.find(&namespace, filter)?;
        Ok(Cursor::new(
            inner,
            namespace,
            Arc::clone(&self.state.mapper),
            decode_any,
        ))
    }

    /// Inserts one entity, or a batch.
    ///
    /// A single entity behaves like [`Model::insert`]. A batch goes to the
    /// first entity's collection: one insert per entity when `insert_one`
    /// is set, otherwise one bulk write. Unordered bulk writes set each
    /// entity's identifier from the result, in order; ordered ones leave
    /// identifiers unset.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or any insert fails.
    pub fn insert_classes<T: Record>(
        &self,
        items: Insertable<'_, T>,
        options: InsertClassesOptions,
    ) -> CoreResult<InsertClassesOutcome> {
        model::insert_classes(&self.state, items, options)
    }

    /// Drops a database.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    pub fn drop_database(&self, database: &str) -> CoreResult<()> {
        tracing::debug!(database, "dropping database");
        Ok(self.state.driver.drop_database(database)?)
    }

    /// Names of non-empty databases.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    pub fn database_names(&self) -> CoreResult<Vec<String>> {
        Ok(self.state.driver.database_names()?)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.state.config)
            .field("registry", self.state.mapper.registry())
            .finish_non_exhaustive()
    }
}

fn decode_any(
    mapper: &Mapper,
    namespace: &Namespace,
    document: Document,
) -> CoreResult<Box<dyn AnyEntity>> {
    Ok(mapper.decode(&document, namespace, false)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapResult;
    use crate::record::{FieldSet, Fields};
    use mongoclass_codec::doc;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: i64,
    }

    impl Record for Position {
        fn to_fields(&self) -> Fields<'_> {
            Fields::new().value("x", self.x)
        }

        fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
            Ok(Self {
                x: fields.take_or_default("x")?,
            })
        }
    }

    fn batch(model: &Model<Position>, n: i64) -> Vec<Entity<Position>> {
        (0..n).map(|x| model.entity(Position { x })).collect()
    }

    #[test]
    fn model_namespace_defaults() {
        let client = Client::in_memory();
        let positions = client.model::<Position>();
        assert_eq!(positions.namespace(), &Namespace::new("main", "position"));
        assert!(!positions.nested());
        assert!(client.registry().contains("main", "position"));
    }

    #[test]
    fn insert_classes_one() {
        let client = Client::in_memory();
        let positions = client.model::<Position>();
        let mut entity = positions.entity(Position { x: 1 });

        let outcome = client
            .insert_classes(Insertable::One(&mut entity), InsertClassesOptions::new())
            .unwrap();
        assert!(matches!(outcome, InsertClassesOutcome::One(_)));
        assert_eq!(entity.identifier(), outcome.inserted_ids().first());
    }

    #[test]
    fn insert_classes_each() {
        let client = Client::in_memory();
        let positions = client.model::<Position>();
        let mut entities = batch(&positions, 3);

        let outcome = client
            .insert_classes(
                Insertable::Many(&mut entities),
                InsertClassesOptions::new().insert_one(true),
            )
            .unwrap();
        assert!(matches!(outcome, InsertClassesOutcome::Each(ref each) if each.len() == 3));
        assert!(entities.iter().all(Entity::is_persisted));
    }

    #[test]
    fn ordered_bulk_leaves_identifiers_unset() {
        let client = Client::in_memory();
        let positions = client.model::<Position>();
        let mut entities = batch(&positions, 4);

        let outcome = client
            .insert_classes(Insertable::Many(&mut entities), InsertClassesOptions::new())
            .unwrap();
        assert_eq!(outcome.inserted_ids().len(), 4);
        assert!(entities.iter().all(|e| !e.is_persisted()));
        assert_eq!(positions.count_documents(doc! {}).unwrap(), 4);
    }

    #[test]
    fn unordered_bulk_backfills_in_order() {
        let client = Client::in_memory();
        let positions = client.model::<Position>();
        let mut entities = batch(&positions, 4);

        let outcome = client
            .insert_classes(
                Insertable::Many(&mut entities),
                InsertClassesOptions::new().ordered(false),
            )
            .unwrap();
        let ids: Vec<Value> = entities
            .iter()
            .map(|e| e.identifier().cloned().unwrap())
            .collect();
        assert_eq!(ids, outcome.inserted_ids());

        for entity in &entities {
            let stored = positions
                .find_class(doc! { "_id" => entity.identifier().cloned().unwrap() })
                .unwrap()
                .unwrap();
            assert_eq!(stored.x, entity.x);
        }
    }

    #[test]
    fn empty_bulk() {
        let client = Client::in_memory();
        let mut entities: Vec<Entity<Position>> = Vec::new();
        let outcome = client
            .insert_classes(Insertable::Many(&mut entities), InsertClassesOptions::new())
            .unwrap();
        assert!(outcome.inserted_ids().is_empty());
    }

    #[test]
    fn find_any_resolves_registered_type() {
        let client = Client::in_memory();
        let positions = client.model::<Position>();
        positions.create_with(Position { x: 9 }, Some(true)).unwrap();

        let found = client.find_any("position", doc! {}, None).unwrap().unwrap();
        let position = found.as_any().downcast_ref::<Entity<Position>>().unwrap();
        assert_eq!(position.x, 9);
        assert!(client.find_any("position", doc! { "x" => 1 }, None).unwrap().is_none());

        assert!(client.find_any("ghost", doc! {}, None).unwrap().is_none());
    }

    #[test]
    fn drop_database_clears_rows() {
        let client = Client::in_memory();
        let positions = client.model::<Position>();
        positions.create_with(Position { x: 1 }, Some(true)).unwrap();
        assert_eq!(client.database_names().unwrap(), vec!["main".to_string()]);

        client.drop_database("main").unwrap();
        assert!(client.database_names().unwrap().is_empty());
        assert_eq!(positions.count_documents(doc! {}).unwrap(), 0);
    }
}
