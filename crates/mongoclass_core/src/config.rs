//! Client and model configuration.

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct Config {
    /// Database used when a model or lookup names none.
    pub default_database: String,

    /// Deepest chain of nested records the mapper will encode or decode.
    pub max_nesting_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_database: "main".to_string(),
            max_nesting_depth: 64,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default database.
    #[must_use]
    pub fn default_database(mut self, name: impl Into<String>) -> Self {
        self.default_database = name.into();
        self
    }

    /// Sets the nesting depth limit.
    #[must_use]
    pub const fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }
}

/// How a record type is bound when a [`Model`](crate::Model) is declared.
#[derive(Debug, Clone, Default)]
pub struct ModelOptions {
    /// Collection name. Defaults to the lowercase type name.
    pub collection: Option<String>,

    /// Database name. Defaults to the client's default database.
    pub database: Option<String>,

    /// Insert records as soon as they are created through the model.
    pub insert_on_init: bool,

    /// Encode nested records as tagged wrappers.
    pub nested: bool,
}

impl ModelOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the collection name.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Sets the database name.
    #[must_use]
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }

    /// Sets whether records are inserted on creation.
    #[must_use]
    pub const fn insert_on_init(mut self, value: bool) -> Self {
        self.insert_on_init = value;
        self
    }

    /// Sets whether nested records are encoded as tagged wrappers.
    #[must_use]
    pub const fn nested(mut self, value: bool) -> Self {
        self.nested = value;
        self
    }
}
