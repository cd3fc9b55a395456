//! # mongoclass cache
//!
//! Shadows whole collections inside a list store so reads can skip the
//! primary document store.
//!
//! ## Layout
//!
//! | what | key |
//! |------|-----|
//! | cached rows | `mongoclass:{database}:{collection}` |
//! | writer lock | `lock:{database}:{collection}` |
//!
//! Each list element is the canonical CBOR of one stored row, `_id`
//! included. Canonical bytes are what make removal by value exact.
//!
//! ## Consistency
//!
//! - Rebuilds and appends hold the collection's lock, so writers never
//!   interleave
//! - Reads take no lock and may observe a rebuild in progress
//! - Writes made directly through a model are not mirrored until the next
//!   rebuild, explicit or periodic
//!
//! ## Example
//!
//! ```rust
//! use mongoclass_cache::{CacheManager, InMemoryListStore, InMemoryLock};
//! use mongoclass_core::{Client, FieldSet, Fields, MapResult, Record};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Position {
//!     x: i64,
//! }
//!
//! impl Record for Position {
//!     fn to_fields(&self) -> Fields<'_> {
//!         Fields::new().value("x", self.x)
//!     }
//!
//!     fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
//!         Ok(Self { x: fields.take("x")? })
//!     }
//! }
//!
//! let client = Client::in_memory();
//! let positions = client.model::<Position>();
//! for x in 0..3 {
//!     positions.create_with(Position { x }, Some(true)).unwrap();
//! }
//!
//! let cache = CacheManager::new(InMemoryListStore::new(), InMemoryLock::new());
//! cache.cache(&positions).unwrap();
//!
//! let hit = cache.get_from_cache(&positions, |p| p.x == 2).unwrap();
//! assert!(hit.is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod lock;
mod manager;
mod refresh;
mod store;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult, LockError, LockResult, StoreError, StoreResult};
pub use lock::{DistributedLock, InMemoryLock, LockGuard};
pub use manager::{CacheManager, CachedRecords};
pub use refresh::RefreshHandle;
pub use store::{InMemoryListStore, ListStore, UnavailableListStore};
