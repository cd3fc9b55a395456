//! In-memory document store.

use crate::driver::{
    DeleteOutcome, DocumentDriver, DriverCursor, InsertManyOptions, InsertManyOutcome,
    InsertOneOutcome, Namespace, SortOrder, UpdateOneOptions, UpdateOutcome, WherePredicate,
};
use crate::error::{DriverError, DriverResult};
use crate::query::{self, ID_FIELD};
use mongoclass_codec::{Document, ObjectId, Value};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Databases = HashMap<String, HashMap<String, Vec<Document>>>;

/// An embedded document store that keeps every collection in memory.
///
/// This driver is suitable for:
/// - Unit and integration tests
/// - Ephemeral stores that don't need persistence
///
/// Documents keep their insertion order, which is the natural order of
/// unsorted queries.
///
/// # Thread Safety
///
/// The driver is `Send + Sync`; clones share the same data.
///
/// # Example
///
/// ```rust
/// use mongoclass_codec::doc;
/// use mongoclass_driver::{DocumentDriver, InMemoryDriver, Namespace};
///
/// let driver = InMemoryDriver::new();
/// let ns = Namespace::new("main", "position");
/// driver.insert_one(&ns, doc! { "x" => 1 }).unwrap();
/// assert_eq!(driver.count_documents(&ns, &doc! {}).unwrap(), 1);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryDriver {
    databases: Arc<RwLock<Databases>>,
}

impl InMemoryDriver {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every document in a collection, in natural order.
    #[must_use]
    pub fn snapshot(&self, namespace: &Namespace) -> Vec<Document> {
        self.databases
            .read()
            .get(&namespace.database)
            .and_then(|db| db.get(&namespace.collection))
            .cloned()
            .unwrap_or_default()
    }

    fn prepare(namespace: &Namespace, rows: &[Document], mut document: Document) -> DriverResult<Document> {
        match document.remove(ID_FIELD) {
            Some(id) if !id.is_null() => {
                if rows
                    .iter()
                    .any(|row| row.get(ID_FIELD).is_some_and(|existing| query::values_equal(existing, &id)))
                {
                    return Err(DriverError::DuplicateKey {
                        namespace: namespace.to_string(),
                        id: render_id(&id),
                    });
                }
                document.insert_first(ID_FIELD, id);
            }
            _ => document.insert_first(ID_FIELD, ObjectId::new()),
        }
        Ok(document)
    }
}

fn render_id(id: &Value) -> String {
    match id {
        Value::ObjectId(oid) => oid.to_string(),
        Value::Text(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

impl fmt::Debug for InMemoryDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let databases = self.databases.read();
        f.debug_struct("InMemoryDriver")
            .field("databases", &databases.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DocumentDriver for InMemoryDriver {
    fn insert_one(&self, namespace: &Namespace, document: Document) -> DriverResult<InsertOneOutcome> {
        let mut databases = self.databases.write();
        let rows = databases
            .entry(namespace.database.clone())
            .or_default()
            .entry(namespace.collection.clone())
            .or_default();
        let document = Self::prepare(namespace, rows, document)?;
        let inserted_id = document.get(ID_FIELD).cloned().unwrap_or_default();
        rows.push(document);
        Ok(InsertOneOutcome { inserted_id })
    }

    fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
        options: InsertManyOptions,
    ) -> DriverResult<InsertManyOutcome> {
        let mut databases = self.databases.write();
        let rows = databases
            .entry(namespace.database.clone())
            .or_default()
            .entry(namespace.collection.clone())
            .or_default();

        let mut inserted_ids = Vec::with_capacity(documents.len());
        let mut first_error = None;
        for document in documents {
            match Self::prepare(namespace, rows, document) {
                Ok(document) => {
                    inserted_ids.push(document.get(ID_FIELD).cloned().unwrap_or_default());
                    rows.push(document);
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                    if options.ordered {
                        break;
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(DriverError::BulkWrite {
                inserted: inserted_ids.len(),
                source: Box::new(err),
            }),
            None => Ok(InsertManyOutcome { inserted_ids }),
        }
    }

    fn find_one(&self, namespace: &Namespace, filter: &Document) -> DriverResult<Option<Document>> {
        query::validate_filter(filter)?;
        let databases = self.databases.read();
        Ok(databases
            .get(&namespace.database)
            .and_then(|db| db.get(&namespace.collection))
            .and_then(|rows| rows.iter().find(|row| query::matches(row, filter)))
            .cloned())
    }

    fn find(&self, namespace: &Namespace, filter: Document) -> DriverResult<Box<dyn DriverCursor>> {
        query::validate_filter(&filter)?;
        Ok(Box::new(MemoryCursor::new(
            Arc::clone(&self.databases),
            namespace.clone(),
            filter,
        )))
    }

    fn update_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
        options: UpdateOneOptions,
    ) -> DriverResult<UpdateOutcome> {
        query::validate_filter(filter)?;
        query::validate_update(update)?;
        let mut databases = self.databases.write();
        let existing = databases
            .get_mut(&namespace.database)
            .and_then(|db| db.get_mut(&namespace.collection))
            .and_then(|rows| rows.iter_mut().find(|row| query::matches(row, filter)));

        if let Some(row) = existing {
            let mut updated = row.clone();
            let changed = query::apply_update(&mut updated, update)?;
            *row = updated;
            return Ok(UpdateOutcome {
                matched_count: 1,
                modified_count: u64::from(changed),
                upserted_id: None,
            });
        }

        if !options.upsert {
            return Ok(UpdateOutcome::default());
        }

        let rows = databases
            .entry(namespace.database.clone())
            .or_default()
            .entry(namespace.collection.clone())
            .or_default();
        let document = query::build_upsert(filter, update)?;
        let document = Self::prepare(namespace, rows, document)?;
        let upserted_id = document.get(ID_FIELD).cloned();
        rows.push(document);
        Ok(UpdateOutcome {
            matched_count: 0,
            modified_count: 0,
            upserted_id,
        })
    }

    fn delete_one(&self, namespace: &Namespace, filter: &Document) -> DriverResult<DeleteOutcome> {
        query::validate_filter(filter)?;
        let mut databases = self.databases.write();
        let Some(rows) = databases
            .get_mut(&namespace.database)
            .and_then(|db| db.get_mut(&namespace.collection))
        else {
            return Ok(DeleteOutcome::default());
        };
        match rows.iter().position(|row| query::matches(row, filter)) {
            Some(index) => {
                rows.remove(index);
                Ok(DeleteOutcome { deleted_count: 1 })
            }
            None => Ok(DeleteOutcome::default()),
        }
    }

    fn count_documents(&self, namespace: &Namespace, filter: &Document) -> DriverResult<u64> {
        query::validate_filter(filter)?;
        let databases = self.databases.read();
        let count = databases
            .get(&namespace.database)
            .and_then(|db| db.get(&namespace.collection))
            .map_or(0, |rows| rows.iter().filter(|row| query::matches(row, filter)).count());
        Ok(count as u64)
    }

    fn drop_database(&self, database: &str) -> DriverResult<()> {
        self.databases.write().remove(database);
        Ok(())
    }

    fn database_names(&self) -> DriverResult<Vec<String>> {
        let databases = self.databases.read();
        let mut names: Vec<String> = databases
            .iter()
            .filter(|(_, collections)| !collections.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Cursor over an [`InMemoryDriver`] collection.
///
/// Nothing is read until the first call to `next`, at which point the
/// matching documents are snapshotted and the options applied in the order
/// filter, `where`, `min`/`max`, sort, skip, limit.
pub struct MemoryCursor {
    databases: Arc<RwLock<Databases>>,
    namespace: Namespace,
    filter: Document,
    sort: Vec<(String, SortOrder)>,
    skip: usize,
    limit: usize,
    min: Option<Document>,
    max: Option<Document>,
    predicates: Vec<WherePredicate>,
    results: Option<std::vec::IntoIter<Document>>,
    closed: bool,
}

impl MemoryCursor {
    fn new(databases: Arc<RwLock<Databases>>, namespace: Namespace, filter: Document) -> Self {
        Self {
            databases,
            namespace,
            filter,
            sort: Vec::new(),
            skip: 0,
            limit: 0,
            min: None,
            max: None,
            predicates: Vec::new(),
            results: None,
            closed: false,
        }
    }

    fn ensure_unstarted(&self) -> DriverResult<()> {
        if self.results.is_some() {
            return Err(DriverError::CursorStarted);
        }
        Ok(())
    }

    fn materialize(&self) -> Vec<Document> {
        let mut rows: Vec<Document> = {
            let databases = self.databases.read();
            databases
                .get(&self.namespace.database)
                .and_then(|db| db.get(&self.namespace.collection))
                .map(|rows| {
                    rows.iter()
                        .filter(|row| query::matches(row, &self.filter))
                        .filter(|row| self.predicates.iter().all(|p| p(row)))
                        .filter(|row| {
                            self.min
                                .as_ref()
                                .map_or(true, |min| query::compare_to_bound(row, min) != Ordering::Less)
                        })
                        .filter(|row| {
                            self.max
                                .as_ref()
                                .map_or(true, |max| query::compare_to_bound(row, max) == Ordering::Less)
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        query::sort_documents(&mut rows, &self.sort);
        let take = if self.limit == 0 { usize::MAX } else { self.limit };
        let rows: Vec<Document> = rows.into_iter().skip(self.skip).take(take).collect();
        tracing::trace!(namespace = %self.namespace, rows = rows.len(), "cursor materialized");
        rows
    }
}

impl fmt::Debug for MemoryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCursor")
            .field("namespace", &self.namespace)
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("started", &self.results.is_some())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Iterator for MemoryCursor {
    type Item = DriverResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        if self.results.is_none() {
            self.results = Some(self.materialize().into_iter());
        }
        self.results.as_mut()?.next().map(Ok)
    }
}

impl DriverCursor for MemoryCursor {
    fn set_sort(&mut self, keys: Vec<(String, SortOrder)>) -> DriverResult<()> {
        self.ensure_unstarted()?;
        self.sort = keys;
        Ok(())
    }

    fn set_limit(&mut self, limit: usize) -> DriverResult<()> {
        self.ensure_unstarted()?;
        self.limit = limit;
        Ok(())
    }

    fn set_skip(&mut self, skip: usize) -> DriverResult<()> {
        self.ensure_unstarted()?;
        self.skip = skip;
        Ok(())
    }

    fn set_min(&mut self, bound: Document) -> DriverResult<()> {
        self.ensure_unstarted()?;
        self.min = Some(bound);
        Ok(())
    }

    fn set_max(&mut self, bound: Document) -> DriverResult<()> {
        self.ensure_unstarted()?;
        self.max = Some(bound);
        Ok(())
    }

    fn set_where(&mut self, predicate: WherePredicate) -> DriverResult<()> {
        self.ensure_unstarted()?;
        self.predicates.push(predicate);
        Ok(())
    }

    fn clone_cursor(&self) -> Box<dyn DriverCursor> {
        Box::new(Self {
            databases: Arc::clone(&self.databases),
            namespace: self.namespace.clone(),
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            limit: self.limit,
            min: self.min.clone(),
            max: self.max.clone(),
            predicates: self.predicates.clone(),
            results: None,
            closed: false,
        })
    }

    fn close(&mut self) {
        self.closed = true;
        self.results = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongoclass_codec::doc;

    fn ns() -> Namespace {
        Namespace::new("test", "items")
    }

    fn seeded() -> InMemoryDriver {
        let driver = InMemoryDriver::new();
        for (i, name) in ["c", "a", "b", "e", "d"].iter().enumerate() {
            driver
                .insert_one(&ns(), doc! { "n" => i as i64, "name" => *name })
                .unwrap();
        }
        driver
    }

    fn names(cursor: Box<dyn DriverCursor>) -> Vec<String> {
        cursor
            .map(|d| d.unwrap().get_text("name").unwrap().to_string())
            .collect()
    }

    #[test]
    fn insert_assigns_object_id_first() {
        let driver = InMemoryDriver::new();
        let outcome = driver.insert_one(&ns(), doc! { "x" => 1 }).unwrap();
        assert!(matches!(outcome.inserted_id, Value::ObjectId(_)));
        let stored = driver.snapshot(&ns());
        assert_eq!(stored[0].keys().next(), Some("_id"));
        assert_eq!(stored[0].get("_id"), Some(&outcome.inserted_id));
    }

    #[test]
    fn null_id_is_replaced() {
        let driver = InMemoryDriver::new();
        let outcome = driver
            .insert_one(&ns(), doc! { "_id" => Value::Null, "x" => 1 })
            .unwrap();
        assert!(matches!(outcome.inserted_id, Value::ObjectId(_)));
    }

    #[test]
    fn duplicate_id_rejected() {
        let driver = InMemoryDriver::new();
        driver.insert_one(&ns(), doc! { "_id" => 1 }).unwrap();
        assert!(matches!(
            driver.insert_one(&ns(), doc! { "_id" => 1 }),
            Err(DriverError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn insert_many_reports_ids_in_order() {
        let driver = InMemoryDriver::new();
        let outcome = driver
            .insert_many(
                &ns(),
                vec![doc! { "_id" => 1 }, doc! { "x" => 2 }, doc! { "_id" => 3 }],
                InsertManyOptions::default(),
            )
            .unwrap();
        assert_eq!(outcome.inserted_ids.len(), 3);
        assert_eq!(outcome.inserted_ids[0], Value::Integer(1));
        assert!(matches!(outcome.inserted_ids[1], Value::ObjectId(_)));
        assert_eq!(outcome.inserted_ids[2], Value::Integer(3));
    }

    #[test]
    fn ordered_insert_many_stops_at_failure() {
        let driver = InMemoryDriver::new();
        let docs = vec![doc! { "_id" => 1 }, doc! { "_id" => 1 }, doc! { "_id" => 2 }];
        let err = driver
            .insert_many(&ns(), docs.clone(), InsertManyOptions { ordered: true })
            .unwrap_err();
        assert!(matches!(err, DriverError::BulkWrite { inserted: 1, .. }));
        assert_eq!(driver.count_documents(&ns(), &doc! {}).unwrap(), 1);

        let other = Namespace::new("test", "unordered");
        let err = driver
            .insert_many(&other, docs, InsertManyOptions { ordered: false })
            .unwrap_err();
        assert!(matches!(err, DriverError::BulkWrite { inserted: 2, .. }));
        assert_eq!(driver.count_documents(&other, &doc! {}).unwrap(), 2);
    }

    #[test]
    fn find_natural_order() {
        let driver = seeded();
        let cursor = driver.find(&ns(), doc! {}).unwrap();
        assert_eq!(names(cursor), vec!["c", "a", "b", "e", "d"]);
    }

    #[test]
    fn sort_skip_limit() {
        let driver = seeded();
        let mut cursor = driver.find(&ns(), doc! {}).unwrap();
        cursor.set_sort(vec![("name".into(), SortOrder::Ascending)]).unwrap();
        cursor.set_skip(1).unwrap();
        cursor.set_limit(3).unwrap();
        assert_eq!(names(cursor), vec!["b", "c", "d"]);
    }

    #[test]
    fn min_inclusive_max_exclusive() {
        let driver = seeded();
        let mut cursor = driver.find(&ns(), doc! {}).unwrap();
        cursor.set_min(doc! { "n" => 1 }).unwrap();
        cursor.set_max(doc! { "n" => 3 }).unwrap();
        assert_eq!(names(cursor), vec!["a", "b"]);
    }

    #[test]
    fn where_clause_filters() {
        let driver = seeded();
        let mut cursor = driver.find(&ns(), doc! {}).unwrap();
        cursor
            .set_where(Arc::new(|d: &Document| {
                d.get("n").and_then(Value::as_integer).is_some_and(|n| n % 2 == 0)
            }))
            .unwrap();
        assert_eq!(names(cursor), vec!["c", "b", "d"]);
    }

    #[test]
    fn options_locked_after_start() {
        let driver = seeded();
        let mut cursor = driver.find(&ns(), doc! {}).unwrap();
        assert!(cursor.next().is_some());
        assert_eq!(cursor.set_limit(1), Err(DriverError::CursorStarted));
    }

    #[test]
    fn clone_restarts() {
        let driver = seeded();
        let mut cursor = driver.find(&ns(), doc! { "n" => doc! { "$gte" => 3 } }).unwrap();
        assert!(cursor.next().is_some());
        let copy = cursor.clone_cursor();
        assert_eq!(names(copy), vec!["e", "d"]);
        assert_eq!(cursor.count(), 1);
    }

    #[test]
    fn closed_cursor_is_empty() {
        let driver = seeded();
        let mut cursor = driver.find(&ns(), doc! {}).unwrap();
        cursor.close();
        assert!(cursor.next().is_none());
    }

    #[test]
    fn cursor_sees_writes_before_first_next() {
        let driver = InMemoryDriver::new();
        let cursor = driver.find(&ns(), doc! {}).unwrap();
        driver.insert_one(&ns(), doc! { "name" => "late" }).unwrap();
        assert_eq!(names(cursor), vec!["late"]);
    }

    #[test]
    fn invalid_filter_rejected() {
        let driver = seeded();
        assert!(matches!(
            driver.find(&ns(), doc! { "$where" => "1" }),
            Err(DriverError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn update_first_match() {
        let driver = seeded();
        let outcome = driver
            .update_one(
                &ns(),
                &doc! { "name" => "a" },
                &doc! { "$set" => doc! { "name" => "z" } },
                UpdateOneOptions::default(),
            )
            .unwrap();
        assert_eq!(outcome.matched_count, 1);
        assert_eq!(outcome.modified_count, 1);
        assert!(driver.find_one(&ns(), &doc! { "name" => "z" }).unwrap().is_some());
    }

    #[test]
    fn update_without_match() {
        let driver = seeded();
        let outcome = driver
            .update_one(
                &ns(),
                &doc! { "name" => "missing" },
                &doc! { "$set" => doc! { "x" => 1 } },
                UpdateOneOptions::default(),
            )
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
    }

    #[test]
    fn upsert_inserts_and_reports_id() {
        let driver = InMemoryDriver::new();
        let outcome = driver
            .update_one(
                &ns(),
                &doc! { "_id" => Value::Null },
                &doc! { "$set" => doc! { "x" => 1 } },
                UpdateOneOptions { upsert: true },
            )
            .unwrap();
        let id = outcome.upserted_id.unwrap();
        assert!(matches!(id, Value::ObjectId(_)));
        let stored = driver.find_one(&ns(), &doc! { "_id" => id }).unwrap().unwrap();
        assert_eq!(stored.get("x"), Some(&Value::Integer(1)));
    }

    #[test]
    fn delete_removes_one() {
        let driver = seeded();
        let outcome = driver
            .delete_one(&ns(), &doc! { "n" => doc! { "$gte" => 0 } })
            .unwrap();
        assert_eq!(outcome.deleted_count, 1);
        assert_eq!(driver.count_documents(&ns(), &doc! {}).unwrap(), 4);
        let missing = Namespace::new("nowhere", "none");
        assert_eq!(driver.delete_one(&missing, &doc! {}).unwrap().deleted_count, 0);
    }

    #[test]
    fn drop_database_and_names() {
        let driver = seeded();
        driver
            .insert_one(&Namespace::new("other", "c"), doc! {})
            .unwrap();
        assert_eq!(driver.database_names().unwrap(), vec!["other", "test"]);
        driver.drop_database("test").unwrap();
        assert_eq!(driver.database_names().unwrap(), vec!["other"]);
        assert_eq!(driver.count_documents(&ns(), &doc! {}).unwrap(), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn sorted_cursor_matches_local_sort(xs in prop::collection::vec(-50i64..50, 0..30)) {
                let driver = InMemoryDriver::new();
                for x in &xs {
                    driver.insert_one(&ns(), doc! { "x" => *x }).unwrap();
                }
                let mut cursor = driver.find(&ns(), doc! {}).unwrap();
                cursor.set_sort(vec![("x".into(), SortOrder::Ascending)]).unwrap();
                let found: Vec<i64> = cursor
                    .map(|d| d.unwrap().get("x").and_then(Value::as_integer).unwrap())
                    .collect();
                let mut expected = xs.clone();
                expected.sort_unstable();
                prop_assert_eq!(found, expected);
            }

            #[test]
            fn float_keys_sort_with_nan_first(
                keys in prop::collection::vec(
                    prop_oneof![
                        1 => Just(f64::NAN),
                        4 => any::<f64>().prop_filter("real", |f| !f.is_nan()),
                        2 => (-20i64..20).prop_map(|n| n as f64 + 0.5),
                    ],
                    0..60,
                ),
            ) {
                let driver = InMemoryDriver::new();
                for key in &keys {
                    driver.insert_one(&ns(), doc! { "v" => *key }).unwrap();
                }
                let mut cursor = driver.find(&ns(), doc! {}).unwrap();
                cursor.set_sort(vec![("v".into(), SortOrder::Ascending)]).unwrap();
                let found: Vec<f64> = cursor
                    .map(|d| d.unwrap().get("v").and_then(Value::as_f64).unwrap())
                    .collect();

                let nans = keys.iter().filter(|f| f.is_nan()).count();
                prop_assert!(found[..nans].iter().all(|f| f.is_nan()));
                let mut expected: Vec<f64> = keys.iter().copied().filter(|f| !f.is_nan()).collect();
                expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
                prop_assert_eq!(&found[nans..], &expected[..]);
            }

            #[test]
            fn mixed_numbers_order_transitively(
                values in prop::collection::vec(
                    prop_oneof![
                        any::<i64>().prop_map(Value::Integer),
                        ((1i64 << 53) - 4..(1i64 << 53) + 4).prop_map(Value::Integer),
                        any::<f64>().prop_map(Value::Float),
                        Just(Value::Float(9_007_199_254_740_992.0)),
                    ],
                    3,
                ),
            ) {
                let (a, b, c) = (&values[0], &values[1], &values[2]);
                let le = |x: &Value, y: &Value| query::compare_values(x, y) != Ordering::Greater;
                if le(a, b) && le(b, c) {
                    prop_assert!(le(a, c));
                }
                prop_assert_eq!(
                    query::compare_values(a, b),
                    query::compare_values(b, a).reverse()
                );
            }
        }
    }
}
