//! Test fixtures: record types and client helpers.
//!
//! The record types cover the shapes the mapper has to handle: flat
//! records, records with defaults, nested records, optional nested records,
//! and a self-referential record.

use mongoclass_cache::{CacheManager, InMemoryListStore};
use mongoclass_core::{
    Client, Config, Entity, FieldSet, Fields, MapResult, Model, ModelOptions, Record,
};
use rand::Rng;
use std::ops::Deref;

use crate::instrumented::InstrumentedLock;

/// Database used by [`TestClient`].
pub const TEST_DATABASE: &str = "mongoclass";

/// A point in space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// X coordinate.
    pub x: i64,
    /// Y coordinate.
    pub y: i64,
    /// Z coordinate.
    pub z: i64,
}

impl Position {
    /// Creates a position.
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }
}

impl Record for Position {
    fn to_fields(&self) -> Fields<'_> {
        Fields::new()
            .value("x", self.x)
            .value("y", self.y)
            .value("z", self.z)
    }

    fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
        Ok(Self {
            x: fields.take("x")?,
            y: fields.take("y")?,
            z: fields.take("z")?,
        })
    }
}

/// Contact details with a defaulted country.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Phone number, if known.
    pub phone: Option<String>,
    /// ISO country code.
    pub country: String,
}

impl Profile {
    /// Creates a profile in the default country.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
            country: "US".to_string(),
        }
    }
}

impl Record for Profile {
    fn to_fields(&self) -> Fields<'_> {
        Fields::new()
            .value("name", self.name.as_str())
            .value("email", self.email.as_str())
            .value("phone", self.phone.clone())
            .value("country", self.country.as_str())
    }

    fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
        Ok(Self {
            name: fields.take_or_default("name")?,
            email: fields.take_or_default("email")?,
            phone: fields.take("phone")?,
            country: fields.take_or("country", "US".to_string())?,
        })
    }
}

/// First and last name.
#[derive(Debug, Clone, PartialEq)]
pub struct NameInformation {
    /// Given name.
    pub first: String,
    /// Family name.
    pub last: String,
}

impl Record for NameInformation {
    fn to_fields(&self) -> Fields<'_> {
        Fields::new()
            .value("first", self.first.as_str())
            .value("last", self.last.as_str())
    }

    fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
        Ok(Self {
            first: fields.take("first")?,
            last: fields.take("last")?,
        })
    }
}

/// Holds a nested name and, optionally, a nested profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Nested name record.
    pub name: Entity<NameInformation>,
    /// Optional nested profile.
    pub profile: Option<Entity<Profile>>,
}

impl Record for Metadata {
    fn to_fields(&self) -> Fields<'_> {
        Fields::new()
            .nested("name", &self.name)
            .optional("profile", self.profile.as_ref())
    }

    fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
        Ok(Self {
            name: fields.take_entity("name")?,
            profile: fields.take_entity_opt("profile")?,
        })
    }
}

/// A user with nested metadata. Declared nested.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Email address.
    pub email: String,
    /// Nested metadata record.
    pub metadata: Entity<Metadata>,
}

impl Record for User {
    fn to_fields(&self) -> Fields<'_> {
        Fields::new()
            .value("email", self.email.as_str())
            .nested("metadata", &self.metadata)
    }

    fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
        Ok(Self {
            email: fields.take("email")?,
            metadata: fields.take_entity("metadata")?,
        })
    }
}

/// A self-referential record.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    /// Name.
    pub name: String,
    /// Relatives, themselves persons.
    pub family_members: Vec<Entity<Person>>,
}

impl Record for Person {
    fn to_fields(&self) -> Fields<'_> {
        Fields::new()
            .value("name", self.name.as_str())
            .sequence("family_members", &self.family_members)
    }

    fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
        Ok(Self {
            name: fields.take("name")?,
            family_members: fields.take_entities_or_default("family_members")?,
        })
    }
}

/// Models for the nested fixtures, declared on one client.
#[derive(Debug, Clone)]
pub struct NestedModels {
    /// `name_information` collection.
    pub names: Model<NameInformation>,
    /// `profile` collection.
    pub profiles: Model<Profile>,
    /// `metadata` collection.
    pub metadata: Model<Metadata>,
    /// `user` collection, nested.
    pub users: Model<User>,
}

impl NestedModels {
    /// Builds an unpersisted user with nested metadata and name.
    pub fn user(&self, email: &str, first: &str, last: &str) -> Entity<User> {
        let name = self.names.entity(NameInformation {
            first: first.to_string(),
            last: last.to_string(),
        });
        let metadata = self.metadata.entity(Metadata {
            name,
            profile: None,
        });
        self.users.entity(User {
            email: email.to_string(),
            metadata,
        })
    }
}

/// A client over a fresh in-memory store, defaulting to the
/// [`TEST_DATABASE`] database.
#[derive(Debug, Clone)]
pub struct TestClient {
    /// The client.
    pub client: Client,
}

impl TestClient {
    /// Creates a client over a new in-memory store.
    pub fn memory() -> Self {
        Self {
            client: Client::in_memory_with_config(
                Config::new().default_database(TEST_DATABASE),
            ),
        }
    }

    /// Declares [`Position`] on its default `position` collection.
    pub fn positions(&self) -> Model<Position> {
        self.client.model::<Position>()
    }

    /// Declares [`Position`] on the `coordinates` collection.
    pub fn coordinates(&self) -> Model<Position> {
        self.client
            .model_with::<Position>(ModelOptions::new().collection("coordinates"))
    }

    /// Declares [`Profile`].
    pub fn profiles(&self) -> Model<Profile> {
        self.client.model::<Profile>()
    }

    /// Declares [`Person`], nested.
    pub fn people(&self) -> Model<Person> {
        self.client
            .model_with::<Person>(ModelOptions::new().nested(true))
    }

    /// Declares the nested fixtures. Only `user` is nested.
    pub fn nested_models(&self) -> NestedModels {
        NestedModels {
            names: self
                .client
                .model_with::<NameInformation>(ModelOptions::new().collection("name_information")),
            profiles: self.profiles(),
            metadata: self.client.model::<Metadata>(),
            users: self
                .client
                .model_with::<User>(ModelOptions::new().nested(true)),
        }
    }

    /// Inserts `count` random positions into `model`, returning them in
    /// insertion order.
    pub fn insert_random_positions(&self, model: &Model<Position>, count: usize) -> Vec<Position> {
        random_positions(count)
            .into_iter()
            .map(|position| {
                model
                    .create_with(position, Some(true))
                    .expect("Failed to insert position");
                position
            })
            .collect()
    }
}

impl Deref for TestClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// `count` positions with coordinates in `-100..100`.
pub fn random_positions(count: usize) -> Vec<Position> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            Position::new(
                rng.gen_range(-100..100),
                rng.gen_range(-100..100),
                rng.gen_range(-100..100),
            )
        })
        .collect()
}

/// A cache manager over a fresh in-memory store and an instrumented lock.
pub fn instrumented_cache() -> (CacheManager, InMemoryListStore, InstrumentedLock) {
    let store = InMemoryListStore::new();
    let lock = InstrumentedLock::new();
    let manager = CacheManager::new(store.clone(), lock.clone());
    (manager, store, lock)
}
