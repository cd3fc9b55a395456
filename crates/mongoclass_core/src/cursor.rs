//! Lazy, decoding result cursors.

use crate::error::{CoreError, CoreResult};
use crate::mapper::Mapper;
use mongoclass_codec::Document;
use mongoclass_driver::{DriverCursor, DriverResult, Namespace, SortOrder, WherePredicate};
use std::fmt;
use std::sync::Arc;

/// Converts one stored document into a cursor item.
pub(crate) type DecodeFn<O> = fn(&Mapper, &Namespace, Document) -> CoreResult<O>;

/// A lazy iterator over query results, decoded into `O`.
///
/// Modifiers forward to the driver cursor and return the same cursor, so
/// they chain:
///
/// ```
/// # use mongoclass_core::{Client, Fields, FieldSet, MapResult, Record};
/// # #[derive(Debug, Clone, PartialEq)]
/// # struct Position { x: i64 }
/// # impl Record for Position {
/// #     fn to_fields(&self) -> Fields<'_> { Fields::new().value("x", self.x) }
/// #     fn from_fields(f: &mut FieldSet) -> MapResult<Self> { Ok(Self { x: f.take("x")? }) }
/// # }
/// # let client = Client::in_memory();
/// # let positions = client.model::<Position>();
/// # for x in 0..10 { positions.insert(&mut positions.entity(Position { x })).unwrap(); }
/// let xs: Vec<i64> = positions
///     .find_classes(Default::default())
///     .unwrap()
///     .sort("x", -1)
///     .skip(1)
///     .limit(2)
///     .map(|p| p.unwrap().x)
///     .collect();
/// assert_eq!(xs, vec![8, 7]);
/// ```
///
/// Nothing is read until the first call to `next`. Once started a cursor
/// cannot be rewound; [`Clone`] gives an unstarted copy of the same query.
/// A modifier the driver rejects (for example after iteration began) is
/// reported by the next call to `next`.
pub struct Cursor<O> {
    inner: Box<dyn DriverCursor>,
    namespace: Namespace,
    mapper: Arc<Mapper>,
    decode: DecodeFn<O>,
    pending: Option<CoreError>,
}

impl<O> Cursor<O> {
    pub(crate) fn new(
        inner: Box<dyn DriverCursor>,
        namespace: Namespace,
        mapper: Arc<Mapper>,
        decode: DecodeFn<O>,
    ) -> Self {
        Self {
            inner,
            namespace,
            mapper,
            decode,
            pending: None,
        }
    }

    /// Namespace being read.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn forward(
        mut self,
        apply: impl FnOnce(&mut Box<dyn DriverCursor>) -> DriverResult<()>,
    ) -> Self {
        if self.pending.is_none() {
            if let Err(err) = apply(&mut self.inner) {
                self.pending = Some(err.into());
            }
        }
        self
    }

    /// Sorts by one key. Later calls replace earlier ones.
    #[must_use]
    pub fn sort(self, key: impl Into<String>, order: impl Into<SortOrder>) -> Self {
        let keys = vec![(key.into(), order.into())];
        self.forward(|inner| inner.set_sort(keys))
    }

    /// Sorts by several keys, most significant first.
    #[must_use]
    pub fn sort_by<K: Into<String>>(self, keys: impl IntoIterator<Item = (K, SortOrder)>) -> Self {
        let keys = keys.into_iter().map(|(key, order)| (key.into(), order)).collect();
        self.forward(|inner| inner.set_sort(keys))
    }

    /// Caps the number of results. Zero means no limit.
    #[must_use]
    pub fn limit(self, limit: usize) -> Self {
        self.forward(|inner| inner.set_limit(limit))
    }

    /// Skips the first `skip` results.
    #[must_use]
    pub fn skip(self, skip: usize) -> Self {
        self.forward(|inner| inner.set_skip(skip))
    }

    /// Inclusive lower bound.
    #[must_use]
    pub fn min(self, bound: Document) -> Self {
        self.forward(|inner| inner.set_min(bound))
    }

    /// Exclusive upper bound.
    #[must_use]
    pub fn max(self, bound: Document) -> Self {
        self.forward(|inner| inner.set_max(bound))
    }

    /// Keeps only stored documents satisfying `predicate`.
    #[must_use]
    pub fn where_clause<F>(self, predicate: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        let predicate: WherePredicate = Arc::new(predicate);
        self.forward(|inner| inner.set_where(predicate))
    }

    /// Releases the driver cursor. Later calls to `next` return `None`.
    pub fn close(&mut self) {
        self.pending = None;
        self.inner.close();
    }
}

impl<O> Iterator for Cursor<O> {
    type Item = CoreResult<O>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            self.inner.close();
            return Some(Err(err));
        }
        let document = match self.inner.next()? {
            Ok(document) => document,
            Err(err) => return Some(Err(err.into())),
        };
        Some((self.decode)(&self.mapper, &self.namespace, document))
    }
}

impl<O> Clone for Cursor<O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_cursor(),
            namespace: self.namespace.clone(),
            mapper: Arc::clone(&self.mapper),
            decode: self.decode,
            pending: self.pending.clone(),
        }
    }
}

impl<O> fmt::Debug for Cursor<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("namespace", &self.namespace)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}
