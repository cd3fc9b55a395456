//! Record type registry.
//!
//! Maps a `(database, collection)` pair to the constructor that rebuilds
//! records stored there and to the collection's nesting policy. Decoding a
//! nested wrapper resolves its record type through this table, which is what
//! lets a record type refer to itself.

use crate::entity::{AnyEntity, Binding, Entity, PersistenceHandle};
use crate::error::{MapResult, MappingError};
use crate::record::{FieldSet, Record};
use mongoclass_driver::Namespace;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a type-erased entity from decoded fields.
pub type Constructor = fn(&mut FieldSet, PersistenceHandle) -> MapResult<Box<dyn AnyEntity>>;

/// Generic constructor for record type `T`.
///
/// # Errors
///
/// Returns whatever [`Record::from_fields`] returns.
pub fn construct<T: Record>(
    fields: &mut FieldSet,
    handle: PersistenceHandle,
) -> MapResult<Box<dyn AnyEntity>> {
    let record = T::from_fields(fields)?;
    Ok(Box::new(Entity::from_parts(record, handle)))
}

/// One registered record type.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Namespace and nesting policy.
    pub binding: Arc<Binding>,
    /// Rebuilds records stored under the namespace.
    pub constructor: Constructor,
    /// Name of the record type, for diagnostics.
    pub type_name: &'static str,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("binding", &self.binding)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Thread-safe `(database, collection)` to record type table.
///
/// At most one entry exists per pair. Registering again replaces the earlier
/// entry.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, HashMap<String, RegistryEntry>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers record type `T` under `namespace`.
    pub fn register<T: Record>(&self, namespace: Namespace, nested: bool) -> RegistryEntry {
        let entry = RegistryEntry {
            binding: Arc::new(Binding::new(namespace, nested)),
            constructor: construct::<T>,
            type_name: std::any::type_name::<T>(),
        };
        self.register_entry(entry.clone());
        entry
    }

    /// Registers a prebuilt entry.
    pub fn register_entry(&self, entry: RegistryEntry) {
        let namespace = entry.binding.namespace.clone();
        let mut entries = self.entries.write();
        let previous = entries
            .entry(namespace.database.clone())
            .or_default()
            .insert(namespace.collection.clone(), entry);

        if let Some(previous) = previous {
            tracing::warn!(
                namespace = %namespace,
                previous = previous.type_name,
                "replaced registered record type"
            );
        } else {
            tracing::debug!(namespace = %namespace, "registered record type");
        }
    }

    /// Looks up the entry for a pair.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnregisteredCollection`] if nothing is
    /// registered there.
    pub fn lookup(&self, database: &str, collection: &str) -> MapResult<RegistryEntry> {
        self.entries
            .read()
            .get(database)
            .and_then(|collections| collections.get(collection))
            .cloned()
            .ok_or_else(|| MappingError::UnregisteredCollection {
                database: database.to_string(),
                collection: collection.to_string(),
            })
    }

    /// Whether a pair is registered.
    pub fn contains(&self, database: &str, collection: &str) -> bool {
        self.entries
            .read()
            .get(database)
            .is_some_and(|collections| collections.contains_key(collection))
    }

    /// Number of registered pairs.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every registered namespace, sorted.
    pub fn namespaces(&self) -> Vec<Namespace> {
        let mut namespaces: Vec<Namespace> = self
            .entries
            .read()
            .iter()
            .flat_map(|(database, collections)| {
                collections
                    .keys()
                    .map(move |collection| Namespace::new(database.clone(), collection.clone()))
            })
            .collect();
        namespaces.sort();
        namespaces
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}
