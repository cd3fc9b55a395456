//! Cache configuration.

use mongoclass_core::Namespace;

/// Configuration for a [`CacheManager`](crate::CacheManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Prefix of list keys: `{key_prefix}:{database}:{collection}`.
    pub key_prefix: String,

    /// Prefix of lock names: `{lock_prefix}:{database}:{collection}`.
    pub lock_prefix: String,

    /// Page size used by `get_cached`.
    pub default_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "mongoclass".to_string(),
            lock_prefix: "lock".to_string(),
            default_batch_size: 500,
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the list key prefix.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the lock name prefix.
    #[must_use]
    pub fn lock_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lock_prefix = prefix.into();
        self
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn default_batch_size(mut self, size: usize) -> Self {
        self.default_batch_size = size;
        self
    }

    /// List key for a namespace.
    pub fn list_key(&self, namespace: &Namespace) -> String {
        format!(
            "{}:{}:{}",
            self.key_prefix, namespace.database, namespace.collection
        )
    }

    /// Lock name for a namespace.
    pub fn lock_key(&self, namespace: &Namespace) -> String {
        format!(
            "{}:{}:{}",
            self.lock_prefix, namespace.database, namespace.collection
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keys() {
        let config = CacheConfig::default();
        let ns = Namespace::new("main", "position");
        assert_eq!(config.list_key(&ns), "mongoclass:main:position");
        assert_eq!(config.lock_key(&ns), "lock:main:position");
        assert_eq!(config.default_batch_size, 500);
    }

    #[test]
    fn custom_prefixes() {
        let config = CacheConfig::new()
            .key_prefix("app")
            .lock_prefix("mutex")
            .default_batch_size(10);
        let ns = Namespace::new("db", "coll");
        assert_eq!(config.list_key(&ns), "app:db:coll");
        assert_eq!(config.lock_key(&ns), "mutex:db:coll");
        assert_eq!(config.default_batch_size, 10);
    }
}
