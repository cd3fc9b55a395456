//! Cache manager.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::lock::{DistributedLock, LockGuard};
use crate::refresh::RefreshHandle;
use crate::store::ListStore;
use mongoclass_codec::{from_cbor, to_canonical_cbor, Document, Value};
use mongoclass_core::{Entity, Model, Record, ID_FIELD};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

struct CacheInner {
    store: Arc<dyn ListStore>,
    lock: Arc<dyn DistributedLock>,
    config: CacheConfig,
}

/// Shadows whole collections in a [`ListStore`].
///
/// Each cached collection is one list at `mongoclass:{database}:{collection}`
/// holding the canonical CBOR of every row. Writers ([`CacheManager::cache`],
/// [`CacheManager::insert_to_cache`]) hold the named lock
/// `lock:{database}:{collection}`; readers do not, so a reader racing a
/// rebuild may see an empty or partial list.
///
/// The list only changes through this API. Writes made directly through a
/// [`Model`] are not reflected until the next rebuild.
///
/// Entries are canonical, so a cached row's fields (and those of any
/// embedded mapping) come back in canonical key order rather than the order
/// they were written in. Every NaN is stored as the same quiet NaN.
///
/// Cloning is cheap; clones share the store and lock.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<CacheInner>,
}

impl CacheManager {
    /// Creates a manager with default configuration.
    pub fn new(store: impl ListStore + 'static, lock: impl DistributedLock + 'static) -> Self {
        Self::with_config(store, lock, CacheConfig::default())
    }

    /// Creates a manager.
    pub fn with_config(
        store: impl ListStore + 'static,
        lock: impl DistributedLock + 'static,
        config: CacheConfig,
    ) -> Self {
        Self::from_shared(Arc::new(store), Arc::new(lock), config)
    }

    /// Creates a manager over a shared store and lock.
    pub fn from_shared(
        store: Arc<dyn ListStore>,
        lock: Arc<dyn DistributedLock>,
        config: CacheConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                lock,
                config,
            }),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// List key for a model.
    pub fn list_key<T: Record>(&self, model: &Model<T>) -> String {
        self.inner.config.list_key(model.namespace())
    }

    /// Lock name for a model.
    pub fn lock_key<T: Record>(&self, model: &Model<T>) -> String {
        self.inner.config.lock_key(model.namespace())
    }

    fn acquire<T: Record>(&self, model: &Model<T>) -> CacheResult<LockGuard<'_>> {
        Ok(LockGuard::acquire(
            self.inner.lock.as_ref(),
            self.lock_key(model),
        )?)
    }

    /// Rebuilds the cached list from every row of the model's collection.
    ///
    /// Runs under the collection lock. Rows are read and serialized first;
    /// the list is then cleared and refilled in one batch write. Returns the
    /// number of cached entries.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, encoding or writing fails. A failure
    /// before the clear leaves the old list in place.
    pub fn cache<T: Record>(&self, model: &Model<T>) -> CacheResult<usize> {
        let key = self.list_key(model);
        let _guard = self.acquire(model)?;

        let mut entries = Vec::new();
        for entity in model.find_classes(Document::new())? {
            entries.push(encode_entry(model, &entity?)?);
        }
        let count = entries.len();

        self.inner.store.delete(&key)?;
        self.inner.store.push_batch(&key, entries)?;
        tracing::debug!(key = %key, count, "rebuilt cache");
        Ok(count)
    }

    /// Rebuilds the cache now, then every `every` on a background thread.
    ///
    /// The refresh stops when the returned handle is stopped or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidInterval`] for a zero interval, and any
    /// error of the first rebuild.
    pub fn cache_every<T: Record>(
        &self,
        model: &Model<T>,
        every: Duration,
    ) -> CacheResult<RefreshHandle> {
        if every.is_zero() {
            return Err(CacheError::InvalidInterval);
        }
        self.cache(model)?;
        RefreshHandle::spawn(self.clone(), model.clone(), every)
    }

    /// Appends one entity under the collection lock. Returns the new list
    /// length.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn insert_to_cache<T: Record>(
        &self,
        model: &Model<T>,
        entity: &Entity<T>,
    ) -> CacheResult<usize> {
        let key = self.list_key(model);
        let entry = encode_entry(model, entity)?;
        let _guard = self.acquire(model)?;
        let len = self.inner.store.push(&key, entry)?;
        tracing::debug!(key = %key, len, "appended cache entry");
        Ok(len)
    }

    /// Removes the first cached entity satisfying `predicate`. Returns
    /// whether one was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, decoding or removing fails.
    pub fn delete_from_cache<T, F>(&self, model: &Model<T>, predicate: F) -> CacheResult<bool>
    where
        T: Record,
        F: Fn(&Entity<T>) -> bool,
    {
        let mut records = self.get_cached(model)?;
        while let Some(entry) = records.next_raw() {
            let entry = entry?;
            let entity = decode_entry(model, &records.key, &entry)?;
            if predicate(&entity) {
                let removed = self.inner.store.remove(&records.key, 1, &entry)?;
                tracing::debug!(key = %records.key, removed, "removed cache entry");
                return Ok(removed > 0);
            }
        }
        Ok(false)
    }

    /// First cached entity satisfying `predicate`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or decoding fails.
    pub fn get_from_cache<T, F>(
        &self,
        model: &Model<T>,
        predicate: F,
    ) -> CacheResult<Option<Entity<T>>>
    where
        T: Record,
        F: Fn(&Entity<T>) -> bool,
    {
        for entity in self.get_cached(model)? {
            let entity = entity?;
            if predicate(&entity) {
                return Ok(Some(entity));
            }
        }
        Ok(None)
    }

    /// Every cached entity, read lazily in pages of the default batch size.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidBatchSize`] if the configured default is
    /// zero.
    pub fn get_cached<T: Record>(&self, model: &Model<T>) -> CacheResult<CachedRecords<T>> {
        self.get_cached_in_batches(model, self.inner.config.default_batch_size)
    }

    /// Every cached entity, read lazily in pages of `batch_size`.
    ///
    /// Paging stops at the first empty page. Each call starts from the head
    /// of the list.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidBatchSize`] for a zero batch size.
    pub fn get_cached_in_batches<T: Record>(
        &self,
        model: &Model<T>,
        batch_size: usize,
    ) -> CacheResult<CachedRecords<T>> {
        if batch_size == 0 {
            return Err(CacheError::InvalidBatchSize);
        }
        Ok(CachedRecords {
            store: Arc::clone(&self.inner.store),
            model: model.clone(),
            key: self.list_key(model),
            batch_size,
            page: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    /// Number of cached entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn cached_len<T: Record>(&self, model: &Model<T>) -> CacheResult<usize> {
        Ok(self.inner.store.len(&self.list_key(model))?)
    }
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Lazy, paged iterator over a cached collection.
pub struct CachedRecords<T: Record> {
    store: Arc<dyn ListStore>,
    model: Model<T>,
    key: String,
    batch_size: usize,
    page: usize,
    buffer: VecDeque<Vec<u8>>,
    exhausted: bool,
}

impl<T: Record> CachedRecords<T> {
    /// List key being read.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Page size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn next_raw(&mut self) -> Option<CacheResult<Vec<u8>>> {
        if self.buffer.is_empty() && !self.exhausted {
            let start = self.page.saturating_mul(self.batch_size);
            let stop = start.saturating_add(self.batch_size - 1);
            match self.store.range(&self.key, start, stop) {
                Ok(page) if page.is_empty() => self.exhausted = true,
                Ok(page) => {
                    self.page += 1;
                    self.buffer.extend(page);
                }
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err.into()));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl<T: Record> Iterator for CachedRecords<T> {
    type Item = CacheResult<Entity<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.next_raw()? {
            Ok(entry) => entry,
            Err(err) => return Some(Err(err)),
        };
        Some(decode_entry(&self.model, &self.key, &entry))
    }
}

impl<T: Record> fmt::Debug for CachedRecords<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedRecords")
            .field("key", &self.key)
            .field("batch_size", &self.batch_size)
            .field("page", &self.page)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

/// Canonical CBOR of the stored form of `entity`, with its `_id` when set.
fn encode_entry<T: Record>(model: &Model<T>, entity: &Entity<T>) -> CacheResult<Vec<u8>> {
    let mut document = model.as_document(entity, None)?;
    if let Some(id) = entity.identifier() {
        document.insert(ID_FIELD, id.clone());
    }
    Ok(to_canonical_cbor(&Value::Document(document)))
}

fn decode_entry<T: Record>(model: &Model<T>, key: &str, entry: &[u8]) -> CacheResult<Entity<T>> {
    match from_cbor(entry)? {
        Value::Document(document) => Ok(model.decode(&document)?),
        other => Err(CacheError::CorruptEntry {
            key: key.to_string(),
            message: format!("expected a document, found {}", other.type_name()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::InMemoryLock;
    use crate::store::{InMemoryListStore, UnavailableListStore};
    use mongoclass_codec::doc;
    use mongoclass_core::{Client, FieldSet, Fields, MapResult};

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

    fn seeded(n: i64) -> (Model<Position>, CacheManager, InMemoryListStore) {
        let client = Client::in_memory();
        let model = client.model::<Position>();
        for x in 0..n {
            model.create_with(Position { x }, Some(true)).unwrap();
        }
        let store = InMemoryListStore::new();
        let manager = CacheManager::new(store.clone(), InMemoryLock::new());
        (model, manager, store)
    }

    fn xs(records: CachedRecords<Position>) -> Vec<i64> {
        records.map(|r| r.unwrap().x).collect()
    }

    #[test]
    fn cache_mirrors_collection() {
        let (model, manager, store) = seeded(5);
        assert_eq!(manager.cache(&model).unwrap(), 5);
        assert_eq!(store.keys(), vec!["mongoclass:main:position".to_string()]);
        assert_eq!(xs(manager.get_cached(&model).unwrap()), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn rebuild_replaces_list() {
        let (model, manager, _) = seeded(3);
        manager.cache(&model).unwrap();
        manager.cache(&model).unwrap();
        assert_eq!(manager.cached_len(&model).unwrap(), 3);

        model.create_with(Position { x: 10 }, Some(true)).unwrap();
        assert_eq!(manager.cached_len(&model).unwrap(), 3);
        manager.cache(&model).unwrap();
        assert_eq!(manager.cached_len(&model).unwrap(), 4);
    }

    #[test]
    fn cached_entities_keep_identifiers() {
        let (model, manager, _) = seeded(1);
        manager.cache(&model).unwrap();
        let mut cached = manager.get_cached(&model).unwrap().next().unwrap().unwrap();
        assert!(cached.is_persisted());

        cached.x = 42;
        model.save(&mut cached).unwrap();
        assert_eq!(
            model.find_class(doc! { "x" => 42 }).unwrap().map(|p| p.x),
            Some(42)
        );
    }

    #[test]
    fn entries_hold_fields_in_canonical_order() {
        let (model, manager, store) = seeded(1);
        manager.cache(&model).unwrap();
        let entries = store.range(&manager.list_key(&model), 0, 0).unwrap();
        let document = mongoclass_codec::document_from_cbor(&entries[0]).unwrap();
        assert_eq!(document.keys().collect::<Vec<_>>(), vec!["x", ID_FIELD]);
        assert!(document.get(ID_FIELD).is_some_and(Value::is_truthy));
    }

    #[test]
    fn paging_in_small_batches() {
        let (model, manager, _) = seeded(7);
        manager.cache(&model).unwrap();
        for batch in 1..=8 {
            let records = manager.get_cached_in_batches(&model, batch).unwrap();
            assert_eq!(xs(records), (0..7).collect::<Vec<_>>(), "batch {batch}");
        }
        assert!(matches!(
            manager.get_cached_in_batches(&model, 0),
            Err(CacheError::InvalidBatchSize)
        ));
    }

    #[test]
    fn insert_get_delete() {
        let (model, manager, _) = seeded(0);
        assert!(xs(manager.get_cached(&model).unwrap()).is_empty());

        let entity = model.create_with(Position { x: 7 }, Some(true)).unwrap();
        assert_eq!(manager.insert_to_cache(&model, &entity).unwrap(), 1);
        manager.insert_to_cache(&model, &entity).unwrap();

        let found = manager.get_from_cache(&model, |p| p.x == 7).unwrap();
        assert_eq!(found.as_ref().map(|p| p.x), Some(7));
        assert!(manager.get_from_cache(&model, |p| p.x == 8).unwrap().is_none());

        assert!(manager.delete_from_cache(&model, |p| p.x == 7).unwrap());
        assert_eq!(manager.cached_len(&model).unwrap(), 1);
        assert!(manager.delete_from_cache(&model, |p| p.x == 7).unwrap());
        assert!(!manager.delete_from_cache(&model, |p| p.x == 7).unwrap());
    }

    #[test]
    fn corrupt_entry() {
        let (model, manager, store) = seeded(0);
        let key = manager.list_key(&model);
        store
            .push(&key, to_canonical_cbor(&Value::Integer(1)))
            .unwrap();
        let err = manager.get_cached(&model).unwrap().next().unwrap().unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry { .. }));
    }

    #[test]
    fn store_failure_releases_lock() {
        let (model, _, _) = seeded(2);
        let lock = InMemoryLock::new();
        let manager = CacheManager::new(UnavailableListStore, lock.clone());

        assert!(matches!(manager.cache(&model), Err(CacheError::Store(_))));
        assert!(!lock.is_held("lock:main:position"));
    }

    #[test]
    fn zero_interval_rejected() {
        let (model, manager, _) = seeded(0);
        assert!(matches!(
            manager.cache_every(&model, Duration::ZERO),
            Err(CacheError::InvalidInterval)
        ));
    }
}
