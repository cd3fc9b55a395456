//! Record declarations and field conversion.
//!
//! A record is a plain Rust type. Implementing [`Record`] tells the mapper
//! how to list its fields ([`Fields`]) and how to rebuild it from decoded
//! fields ([`FieldSet`]).

use crate::entity::{AnyEntity, Entity, Nestable};
use crate::error::{MapResult, MappingError};
use mongoclass_codec::{Document, ObjectId, Value};
use std::fmt;

/// A user record type that can be persisted.
///
/// # Example
///
/// ```
/// use mongoclass_core::{FieldSet, Fields, MapResult, Record};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Position {
///     x: i64,
///     y: i64,
/// }
///
/// impl Record for Position {
///     fn to_fields(&self) -> Fields<'_> {
///         Fields::new().value("x", self.x).value("y", self.y)
///     }
///
///     fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
///         Ok(Self {
///             x: fields.take_or_default("x")?,
///             y: fields.take_or_default("y")?,
///         })
///     }
/// }
///
/// assert_eq!(Position::collection_name(), "position");
/// ```
pub trait Record: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Collection used when a model names none.
    fn collection_name() -> String {
        default_collection_name::<Self>()
    }

    /// Lists the record's user-visible fields in declaration order.
    fn to_fields(&self) -> Fields<'_>;

    /// Rebuilds the record from decoded fields.
    ///
    /// Fields absent from the document should fall back to the record's own
    /// defaults (see [`FieldSet::take_or`]). Fields not consumed are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or has the wrong kind.
    fn from_fields(fields: &mut FieldSet) -> MapResult<Self>;
}

/// Lowercase final path segment of `T`'s type name, generics stripped.
#[must_use]
pub fn default_collection_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_lowercase()
}

/// One field as produced by [`Record::to_fields`].
pub enum Field<'a> {
    /// A plain value.
    Value(Value),
    /// Another persisted record.
    Nested(&'a dyn Nestable),
    /// A sequence whose elements may be nested records.
    Sequence(Vec<Field<'a>>),
}

impl fmt::Debug for Field<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Nested(nested) => f
                .debug_tuple("Nested")
                .field(&nested.binding().namespace)
                .finish(),
            Self::Sequence(items) => f.debug_tuple("Sequence").field(items).finish(),
        }
    }
}

/// Ordered list of a record's fields, borrowed from the record.
#[derive(Debug, Default)]
pub struct Fields<'a> {
    entries: Vec<(String, Field<'a>)>,
}

impl<'a> Fields<'a> {
    /// Creates an empty field list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain value.
    #[must_use]
    pub fn value(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(name, Field::Value(value.into()))
    }

    /// Adds a nested record.
    #[must_use]
    pub fn nested<U: Record>(self, name: impl Into<String>, entity: &'a Entity<U>) -> Self {
        self.field(name, Field::Nested(entity))
    }

    /// Adds an optional nested record. `None` is written as null.
    #[must_use]
    pub fn optional<U: Record>(
        self,
        name: impl Into<String>,
        entity: Option<&'a Entity<U>>,
    ) -> Self {
        match entity {
            Some(entity) => self.nested(name, entity),
            None => self.field(name, Field::Value(Value::Null)),
        }
    }

    /// Adds a sequence of nested records.
    #[must_use]
    pub fn sequence<U: Record>(self, name: impl Into<String>, entities: &'a [Entity<U>]) -> Self {
        let items = entities
            .iter()
            .map(|entity| Field::Nested(entity as &dyn Nestable))
            .collect();
        self.field(name, Field::Sequence(items))
    }

    /// Adds an arbitrary field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: Field<'a>) -> Self {
        self.entries.push((name.into(), field));
        self
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, field)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field<'a>)> {
        self.entries.iter().map(|(name, field)| (name.as_str(), field))
    }
}

impl<'a> IntoIterator for Fields<'a> {
    type Item = (String, Field<'a>);
    type IntoIter = std::vec::IntoIter<(String, Field<'a>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// One field as produced by decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A plain value.
    Value(Value),
    /// A reconstructed nested record.
    Nested(Box<dyn AnyEntity>),
    /// A sequence that held at least one nested record.
    Sequence(Vec<Decoded>),
}

impl Decoded {
    /// Converts to a plain value. `None` if anything inside is a nested record.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Nested(_) => None,
            Self::Sequence(items) => items
                .into_iter()
                .map(Decoded::into_value)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Short description used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Value(value) => value.type_name(),
            Self::Nested(_) => "nested record",
            Self::Sequence(_) => "array",
        }
    }
}

/// Decoded fields handed to [`Record::from_fields`].
///
/// Each `take*` method removes the field it returns.
#[derive(Debug, Clone)]
pub struct FieldSet {
    record: &'static str,
    fields: Vec<(String, Decoded)>,
}

impl FieldSet {
    /// Creates an empty set for the named record type.
    #[must_use]
    pub fn new(record: &'static str) -> Self {
        Self {
            record,
            fields: Vec::new(),
        }
    }

    /// Builds a set from a plain document.
    #[must_use]
    pub fn from_document(record: &'static str, document: Document) -> Self {
        let fields = document
            .into_iter()
            .map(|(name, value)| (name, Decoded::Value(value)))
            .collect();
        Self { record, fields }
    }

    pub(crate) fn from_decoded(record: &'static str, fields: Vec<(String, Decoded)>) -> Self {
        Self { record, fields }
    }

    /// Name of the record type being decoded.
    pub fn record_name(&self) -> &'static str {
        self.record
    }

    /// Appends a field, replacing any earlier one of the same name.
    pub fn push(&mut self, name: impl Into<String>, decoded: Decoded) {
        let name = name.into();
        self.fields.retain(|(existing, _)| *existing != name);
        self.fields.push((name, decoded));
    }

    /// Number of fields not yet taken.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether every field has been taken.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether a field is present.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(existing, _)| existing == name)
    }

    /// Removes a field in its decoded form.
    pub fn take_decoded(&mut self, name: &str) -> Option<Decoded> {
        let index = self.fields.iter().position(|(existing, _)| existing == name)?;
        Some(self.fields.remove(index).1)
    }

    /// Removes a required plain field.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::MissingField`] if absent (unless `V` accepts a
    /// missing value, as `Option` does) and [`MappingError::InvalidField`] on
    /// a kind mismatch.
    pub fn take<V: FromValue>(&mut self, name: &str) -> MapResult<V> {
        match self.take_decoded(name) {
            Some(decoded) => self.convert(name, decoded),
            None => V::from_missing().ok_or_else(|| MappingError::missing_field(self.record, name)),
        }
    }

    /// Removes a plain field, falling back to `default` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::InvalidField`] on a kind mismatch.
    pub fn take_or<V: FromValue>(&mut self, name: &str, default: V) -> MapResult<V> {
        match self.take_decoded(name) {
            Some(decoded) => self.convert(name, decoded),
            None => Ok(default),
        }
    }

    /// Removes a plain field, falling back to `V::default()` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::InvalidField`] on a kind mismatch.
    pub fn take_or_default<V: FromValue + Default>(&mut self, name: &str) -> MapResult<V> {
        self.take_or(name, V::default())
    }

    /// Removes a required nested record.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::MissingField`] if absent,
    /// [`MappingError::InvalidField`] if the field is not a nested record, and
    /// [`MappingError::TypeMismatch`] if it decoded to another record type.
    pub fn take_entity<U: Record>(&mut self, name: &str) -> MapResult<Entity<U>> {
        match self.take_decoded(name) {
            Some(decoded) => self.downcast(name, decoded),
            None => Err(MappingError::missing_field(self.record, name)),
        }
    }

    /// Removes an optional nested record. Absent and null both give `None`.
    ///
    /// # Errors
    ///
    /// As [`FieldSet::take_entity`] for any other value.
    pub fn take_entity_opt<U: Record>(&mut self, name: &str) -> MapResult<Option<Entity<U>>> {
        match self.take_decoded(name) {
            None | Some(Decoded::Value(Value::Null)) => Ok(None),
            Some(decoded) => self.downcast(name, decoded).map(Some),
        }
    }

    /// Removes a required sequence of nested records. An empty array is
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::MissingField`] if absent and
    /// [`MappingError::InvalidField`] if any element is not a nested record.
    pub fn take_entities<U: Record>(&mut self, name: &str) -> MapResult<Vec<Entity<U>>> {
        match self.take_decoded(name) {
            Some(decoded) => self.downcast_all(name, decoded),
            None => Err(MappingError::missing_field(self.record, name)),
        }
    }

    /// Removes a sequence of nested records, defaulting to empty when absent.
    ///
    /// # Errors
    ///
    /// As [`FieldSet::take_entities`] for a present field.
    pub fn take_entities_or_default<U: Record>(
        &mut self,
        name: &str,
    ) -> MapResult<Vec<Entity<U>>> {
        match self.take_decoded(name) {
            Some(decoded) => self.downcast_all(name, decoded),
            None => Ok(Vec::new()),
        }
    }

    fn convert<V: FromValue>(&self, name: &str, decoded: Decoded) -> MapResult<V> {
        let found = decoded.kind();
        decoded
            .into_value()
            .and_then(V::from_value)
            .ok_or_else(|| MappingError::invalid_field(self.record, name, V::expected(), found))
    }

    fn downcast<U: Record>(&self, name: &str, decoded: Decoded) -> MapResult<Entity<U>> {
        match decoded {
            Decoded::Nested(entity) => {
                let found = entity.type_name();
                entity
                    .into_any()
                    .downcast::<Entity<U>>()
                    .map(|entity| *entity)
                    .map_err(|_| MappingError::TypeMismatch {
                        expected: std::any::type_name::<U>().to_string(),
                        found: found.to_string(),
                    })
            }
            other => Err(MappingError::invalid_field(
                self.record,
                name,
                "nested record",
                other.kind(),
            )),
        }
    }

    fn downcast_all<U: Record>(&self, name: &str, decoded: Decoded) -> MapResult<Vec<Entity<U>>> {
        match decoded {
            Decoded::Sequence(items) => items
                .into_iter()
                .map(|item| self.downcast(name, item))
                .collect(),
            Decoded::Value(Value::Array(items)) if items.is_empty() => Ok(Vec::new()),
            other => Err(MappingError::invalid_field(
                self.record,
                name,
                "sequence of nested records",
                other.kind(),
            )),
        }
    }
}

/// Conversion from a stored [`Value`] into a record field type.
pub trait FromValue: Sized {
    /// Kind name used in error messages.
    fn expected() -> &'static str;

    /// Converts, or `None` on a kind mismatch.
    fn from_value(value: Value) -> Option<Self>;

    /// Value used when the field is absent. `None` makes it required.
    fn from_missing() -> Option<Self> {
        None
    }
}

impl FromValue for Value {
    fn expected() -> &'static str {
        "any value"
    }

    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl FromValue for bool {
    fn expected() -> &'static str {
        "bool"
    }

    fn from_value(value: Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for i64 {
    fn expected() -> &'static str {
        "integer"
    }

    fn from_value(value: Value) -> Option<Self> {
        value.as_integer()
    }
}

impl FromValue for i32 {
    fn expected() -> &'static str {
        "32-bit integer"
    }

    fn from_value(value: Value) -> Option<Self> {
        value.as_integer().and_then(|n| i32::try_from(n).ok())
    }
}

impl FromValue for u32 {
    fn expected() -> &'static str {
        "unsigned 32-bit integer"
    }

    fn from_value(value: Value) -> Option<Self> {
        value.as_integer().and_then(|n| u32::try_from(n).ok())
    }
}

impl FromValue for u64 {
    fn expected() -> &'static str {
        "unsigned integer"
    }

    fn from_value(value: Value) -> Option<Self> {
        value.as_integer().and_then(|n| u64::try_from(n).ok())
    }
}

impl FromValue for f64 {
    fn expected() -> &'static str {
        "number"
    }

    fn from_value(value: Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for String {
    fn expected() -> &'static str {
        "text"
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl FromValue for Document {
    fn expected() -> &'static str {
        "document"
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Document(document) => Some(document),
            _ => None,
        }
    }
}

impl FromValue for ObjectId {
    fn expected() -> &'static str {
        "object id"
    }

    fn from_value(value: Value) -> Option<Self> {
        value.as_object_id()
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn expected() -> &'static str {
        "array"
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn expected() -> &'static str {
        T::expected()
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn from_missing() -> Option<Self> {
        Some(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Binding, PersistenceHandle};
    use mongoclass_codec::doc;
    use mongoclass_driver::Namespace;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: i64,
        label: Option<String>,
    }

    impl Record for Position {
        fn to_fields(&self) -> Fields<'_> {
            Fields::new()
                .value("x", self.x)
                .value("label", self.label.clone())
        }

        fn from_fields(fields: &mut FieldSet) -> MapResult<Self> {
            Ok(Self {
                x: fields.take("x")?,
                label: fields.take("label")?,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Other;

    impl Record for Other {
        fn collection_name() -> String {
            "others".to_string()
        }

        fn to_fields(&self) -> Fields<'_> {
            Fields::new()
        }

        fn from_fields(_fields: &mut FieldSet) -> MapResult<Self> {
            Ok(Self)
        }
    }

    fn entity<T: Record>(record: T) -> Entity<T> {
        let binding = Arc::new(Binding::new(Namespace::new("main", "x"), false));
        Entity::from_parts(record, PersistenceHandle::new(binding, None))
    }

    #[test]
    fn collection_names() {
        assert_eq!(Position::collection_name(), "position");
        assert_eq!(Other::collection_name(), "others");
        assert_eq!(default_collection_name::<Vec<Position>>(), "vec");
    }

    #[test]
    fn take_plain_fields() {
        let mut fields = FieldSet::from_document("Position", doc! { "x" => 4, "extra" => true });
        let position = Position::from_fields(&mut fields).unwrap();
        assert_eq!(position, Position { x: 4, label: None });
        assert_eq!(fields.len(), 1);
        assert!(fields.contains("extra"));
    }

    #[test]
    fn missing_and_invalid_fields() {
        let mut fields = FieldSet::from_document("Position", doc! {});
        assert_eq!(
            Position::from_fields(&mut fields),
            Err(MappingError::missing_field("Position", "x"))
        );

        let mut fields = FieldSet::from_document("Position", doc! { "x" => "four" });
        assert!(matches!(
            fields.take::<i64>("x"),
            Err(MappingError::InvalidField { ref found, .. }) if found == "text"
        ));
    }

    #[test]
    fn take_or_uses_default_only_when_absent() {
        let mut fields = FieldSet::from_document("Profile", doc! { "country" => "KE" });
        assert_eq!(fields.take_or("country", "US".to_string()).unwrap(), "KE");
        assert_eq!(fields.take_or("country", "US".to_string()).unwrap(), "US");
        assert_eq!(fields.take_or_default::<i64>("age").unwrap(), 0);
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(f64::from_value(Value::Integer(3)), Some(3.0));
        assert_eq!(i32::from_value(Value::Integer(i64::MAX)), None);
        assert_eq!(u64::from_value(Value::Integer(-1)), None);
        assert_eq!(
            Vec::<i64>::from_value(Value::from(vec![1, 2])),
            Some(vec![1, 2])
        );
    }

    #[test]
    fn nested_entities_downcast() {
        let mut fields = FieldSet::new("Holder");
        fields.push("position", Decoded::Nested(Box::new(entity(Position { x: 1, label: None }))));
        fields.push("other", Decoded::Nested(Box::new(entity(Other))));
        fields.push("empty", Decoded::Value(Value::Array(Vec::new())));
        fields.push("none", Decoded::Value(Value::Null));

        let position: Entity<Position> = fields.take_entity("position").unwrap();
        assert_eq!(position.x, 1);
        assert!(matches!(
            fields.take_entity::<Position>("other"),
            Err(MappingError::TypeMismatch { .. })
        ));
        assert!(fields.take_entities::<Position>("empty").unwrap().is_empty());
        assert!(fields.take_entity_opt::<Position>("none").unwrap().is_none());
        assert!(fields.take_entities_or_default::<Position>("absent").unwrap().is_empty());
        assert!(fields.is_empty());
    }

    #[test]
    fn sequence_into_value() {
        let plain = Decoded::Sequence(vec![Decoded::Value(Value::Integer(1))]);
        assert_eq!(plain.into_value(), Some(Value::from(vec![1])));

        let nested = Decoded::Sequence(vec![Decoded::Nested(Box::new(entity(Other)))]);
        assert_eq!(nested.into_value(), None);
    }
}
