//! Driver contract.

use crate::error::DriverResult;
use mongoclass_codec::{Document, Value};
use std::fmt;
use std::sync::Arc;

/// A `(database, collection)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
}

impl Namespace {
    /// Creates a namespace.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl From<i32> for SortOrder {
    /// `1` (or any non-negative number) is ascending, negative is descending.
    fn from(direction: i32) -> Self {
        if direction < 0 {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }
}

/// Client-side row predicate applied by a cursor's `where` clause.
pub type WherePredicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// Result of a single-document insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneOutcome {
    /// `_id` of the new document.
    pub inserted_id: Value,
}

/// Result of a bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyOutcome {
    /// `_id` of each new document, in input order.
    pub inserted_ids: Vec<Value>,
}

/// Result of a single-document update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateOutcome {
    /// Documents that matched the filter (0 or 1).
    pub matched_count: u64,
    /// Documents whose content changed (0 or 1).
    pub modified_count: u64,
    /// `_id` of the inserted document when the update upserted.
    pub upserted_id: Option<Value>,
}

/// Result of a single-document delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOutcome {
    /// Documents removed (0 or 1).
    pub deleted_count: u64,
}

/// Options for [`DocumentDriver::update_one`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOneOptions {
    /// Insert a document built from the filter when nothing matches.
    pub upsert: bool,
}

/// Options for [`DocumentDriver::insert_many`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertManyOptions {
    /// Stop at the first failure instead of attempting every document.
    pub ordered: bool,
}

impl Default for InsertManyOptions {
    fn default() -> Self {
        Self { ordered: true }
    }
}

/// A document-store client.
///
/// Drivers are the only component that talks to storage. The mapper and the
/// entity operations hand them plain [`Document`]s and never interpret their
/// wire format.
///
/// # Invariants
///
/// - Every stored document has an `_id`; inserts assign a fresh one when the
///   document has none (or a null one)
/// - `insert_many` reports identifiers in input order
/// - `update_one`/`delete_one` touch at most one document, the first match
///   in natural order
/// - Drivers must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryDriver`] - embedded engine for tests and ephemeral use
pub trait DocumentDriver: Send + Sync {
    /// Inserts one document.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::DuplicateKey`](crate::DriverError::DuplicateKey)
    /// if the `_id` is taken.
    fn insert_one(&self, namespace: &Namespace, document: Document)
        -> DriverResult<InsertOneOutcome>;

    /// Inserts several documents.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::BulkWrite`](crate::DriverError::BulkWrite) if any
    /// document fails. Ordered inserts stop at the first failure.
    fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
        options: InsertManyOptions,
    ) -> DriverResult<InsertManyOutcome>;

    /// Returns the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is invalid.
    fn find_one(&self, namespace: &Namespace, filter: &Document) -> DriverResult<Option<Document>>;

    /// Opens a lazy cursor over the documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is invalid.
    fn find(&self, namespace: &Namespace, filter: Document) -> DriverResult<Box<dyn DriverCursor>>;

    /// Applies `update` to the first document matching `filter`.
    ///
    /// `update` is either an operator document (`$set`, `$inc`, ...) or a
    /// full replacement.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter or update is invalid, or if the update
    /// would change `_id`.
    fn update_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
        options: UpdateOneOptions,
    ) -> DriverResult<UpdateOutcome>;

    /// Deletes the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is invalid.
    fn delete_one(&self, namespace: &Namespace, filter: &Document) -> DriverResult<DeleteOutcome>;

    /// Counts documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is invalid.
    fn count_documents(&self, namespace: &Namespace, filter: &Document) -> DriverResult<u64>;

    /// Drops a database and every collection in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn drop_database(&self, database: &str) -> DriverResult<()>;

    /// Names of databases that hold at least one collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn database_names(&self) -> DriverResult<Vec<String>>;
}

/// A lazy iterator over query results.
///
/// Options (`set_sort`, `set_limit`, ...) may only be changed before the first call
/// to `next`. Changing them afterwards fails with
/// [`DriverError::CursorStarted`](crate::DriverError::CursorStarted).
/// A closed cursor yields nothing.
pub trait DriverCursor: Iterator<Item = DriverResult<Document>> + Send {
    /// Orders results by the given keys, first key most significant.
    fn set_sort(&mut self, keys: Vec<(String, SortOrder)>) -> DriverResult<()>;

    /// Caps the number of results. Zero means no limit.
    fn set_limit(&mut self, limit: usize) -> DriverResult<()>;

    /// Skips the first `skip` results.
    fn set_skip(&mut self, skip: usize) -> DriverResult<()>;

    /// Inclusive lower bound over the bound's keys.
    fn set_min(&mut self, bound: Document) -> DriverResult<()>;

    /// Exclusive upper bound over the bound's keys.
    fn set_max(&mut self, bound: Document) -> DriverResult<()>;

    /// Adds a client-side predicate every result must satisfy.
    fn set_where(&mut self, predicate: WherePredicate) -> DriverResult<()>;

    /// Returns an unstarted copy with the same query and options.
    fn clone_cursor(&self) -> Box<dyn DriverCursor>;

    /// Releases resources. Later calls to `next` return `None`.
    fn close(&mut self);
}
