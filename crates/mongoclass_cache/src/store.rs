//! List store abstraction.

use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A keyed store of byte-string lists.
///
/// Mirrors the list commands of a key/value server: push to the tail, read
/// an inclusive index range, remove by value, delete a key. A missing key
/// behaves as an empty list.
///
/// # Invariants
///
/// - `push_batch` is atomic: readers see all of the batch or none of it
/// - `range` never fails for out-of-bounds indexes; it returns what exists
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`InMemoryListStore`] - process-local store for tests and single-node use
pub trait ListStore: Send + Sync {
    /// Deletes a key. Returns whether it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Appends one item. Returns the new length.
    fn push(&self, key: &str, item: Vec<u8>) -> StoreResult<usize>;

    /// Appends several items in one atomic write. Returns the new length.
    fn push_batch(&self, key: &str, items: Vec<Vec<u8>>) -> StoreResult<usize>;

    /// Items `start..=stop`, clamped to the list.
    fn range(&self, key: &str, start: usize, stop: usize) -> StoreResult<Vec<Vec<u8>>>;

    /// Removes up to `count` items equal to `item`, head first. Returns how
    /// many were removed.
    fn remove(&self, key: &str, count: usize, item: &[u8]) -> StoreResult<usize>;

    /// Length of the list.
    fn len(&self, key: &str) -> StoreResult<usize>;
}

/// In-memory [`ListStore`].
///
/// Clones share the same lists, so several cache managers built over clones
/// of one store see each other's writes.
#[derive(Clone, Default)]
pub struct InMemoryListStore {
    lists: Arc<RwLock<HashMap<String, Vec<Vec<u8>>>>>,
}

impl InMemoryListStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of non-empty lists, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lists.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for InMemoryListStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryListStore")
            .field("keys", &self.keys())
            .finish()
    }
}

impl ListStore for InMemoryListStore {
    fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.lists.write().remove(key).is_some())
    }

    fn push(&self, key: &str, item: Vec<u8>) -> StoreResult<usize> {
        self.push_batch(key, vec![item])
    }

    fn push_batch(&self, key: &str, items: Vec<Vec<u8>>) -> StoreResult<usize> {
        if items.is_empty() {
            return self.len(key);
        }
        let mut lists = self.lists.write();
        let list = lists.entry(key.to_string()).or_default();
        list.extend(items);
        Ok(list.len())
    }

    fn range(&self, key: &str, start: usize, stop: usize) -> StoreResult<Vec<Vec<u8>>> {
        let lists = self.lists.read();
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        if start >= list.len() || start > stop {
            return Ok(Vec::new());
        }
        let end = stop.saturating_add(1).min(list.len());
        Ok(list[start..end].to_vec())
    }

    fn remove(&self, key: &str, count: usize, item: &[u8]) -> StoreResult<usize> {
        let mut lists = self.lists.write();
        let Some(list) = lists.get_mut(key) else {
            return Ok(0);
        };

        let mut removed = 0;
        list.retain(|existing| {
            if removed < count && existing.as_slice() == item {
                removed += 1;
                false
            } else {
                true
            }
        });
        if list.is_empty() {
            lists.remove(key);
        }
        Ok(removed)
    }

    fn len(&self, key: &str) -> StoreResult<usize> {
        Ok(self.lists.read().get(key).map_or(0, Vec::len))
    }
}

/// A store that fails every call. Used to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct UnavailableListStore;

impl ListStore for UnavailableListStore {
    fn delete(&self, _key: &str) -> StoreResult<bool> {
        Err(StoreError::unavailable("store offline"))
    }

    fn push(&self, _key: &str, _item: Vec<u8>) -> StoreResult<usize> {
        Err(StoreError::unavailable("store offline"))
    }

    fn push_batch(&self, _key: &str, _items: Vec<Vec<u8>>) -> StoreResult<usize> {
        Err(StoreError::unavailable("store offline"))
    }

    fn range(&self, _key: &str, _start: usize, _stop: usize) -> StoreResult<Vec<Vec<u8>>> {
        Err(StoreError::unavailable("store offline"))
    }

    fn remove(&self, _key: &str, _count: usize, _item: &[u8]) -> StoreResult<usize> {
        Err(StoreError::unavailable("store offline"))
    }

    fn len(&self, _key: &str) -> StoreResult<usize> {
        Err(StoreError::unavailable("store offline"))
    }
}
