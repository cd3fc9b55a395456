//! Filter matching, update application and result ordering.
//!
//! The dialect is a small subset of the MongoDB query language:
//!
//! - filters: field equality (dotted paths, array containment), `$eq`,
//!   `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`, and the
//!   top-level combinators `$and`, `$or`, `$nor`
//! - updates: `$set`, `$unset`, `$inc`, `$push`, or a full replacement
//!
//! A missing field compares as null.

use crate::driver::SortOrder;
use crate::error::{DriverError, DriverResult};
use mongoclass_codec::{Document, ObjectId, Value};
use std::cmp::Ordering;

/// Field holding the primary key.
pub const ID_FIELD: &str = "_id";

const FIELD_OPERATORS: &[&str] = &[
    "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$exists",
];

const UPDATE_OPERATORS: &[&str] = &["$set", "$unset", "$inc", "$push"];

fn is_operator_document(value: &Value) -> bool {
    match value {
        Value::Document(doc) => !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

/// Checks that every operator in `filter` is known and well-formed.
///
/// # Errors
///
/// Returns [`DriverError::InvalidFilter`] describing the first problem.
pub fn validate_filter(filter: &Document) -> DriverResult<()> {
    for (key, condition) in filter.iter() {
        match key {
            "$and" | "$or" | "$nor" => {
                let clauses = condition.as_array().ok_or_else(|| {
                    DriverError::invalid_filter(format!("{key} expects an array"))
                })?;
                if clauses.is_empty() {
                    return Err(DriverError::invalid_filter(format!(
                        "{key} expects a non-empty array"
                    )));
                }
                for clause in clauses {
                    let clause = clause.as_document().ok_or_else(|| {
                        DriverError::invalid_filter(format!("{key} clauses must be documents"))
                    })?;
                    validate_filter(clause)?;
                }
            }
            other if other.starts_with('$') => {
                return Err(DriverError::invalid_filter(format!(
                    "unknown top-level operator {other}"
                )));
            }
            _ => {
                if let Some(operators) = condition.as_document().filter(|_| is_operator_document(condition)) {
                    for (op, operand) in operators.iter() {
                        if !FIELD_OPERATORS.contains(&op) {
                            return Err(DriverError::invalid_filter(format!(
                                "unknown operator {op} on field {key}"
                            )));
                        }
                        if matches!(op, "$in" | "$nin") && operand.as_array().is_none() {
                            return Err(DriverError::invalid_filter(format!(
                                "{op} on field {key} expects an array"
                            )));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Whether `doc` satisfies `filter`. The filter must already be valid.
#[must_use]
pub fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key {
        "$and" => clauses(condition).all(|c| matches(doc, c)),
        "$or" => clauses(condition).any(|c| matches(doc, c)),
        "$nor" => !clauses(condition).any(|c| matches(doc, c)),
        path => matches_field(doc.get_path(path), condition),
    })
}

fn clauses(condition: &Value) -> impl Iterator<Item = &Document> {
    condition
        .as_array()
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_document)
}

fn matches_field(value: Option<&Value>, condition: &Value) -> bool {
    let Some(operators) = condition.as_document().filter(|_| is_operator_document(condition)) else {
        return equals_or_contains(value, condition);
    };
    operators.iter().all(|(op, operand)| match op {
        "$eq" => equals_or_contains(value, operand),
        "$ne" => !equals_or_contains(value, operand),
        "$gt" => compares(value, operand, |o| o == Ordering::Greater),
        "$gte" => compares(value, operand, |o| o != Ordering::Less),
        "$lt" => compares(value, operand, |o| o == Ordering::Less),
        "$lte" => compares(value, operand, |o| o != Ordering::Greater),
        "$in" => in_list(value, operand),
        "$nin" => !in_list(value, operand),
        "$exists" => value.is_some() == operand.is_truthy(),
        _ => false,
    })
}

fn in_list(value: Option<&Value>, operand: &Value) -> bool {
    operand
        .as_array()
        .unwrap_or_default()
        .iter()
        .any(|candidate| equals_or_contains(value, candidate))
}

fn equals_or_contains(value: Option<&Value>, operand: &Value) -> bool {
    match value {
        None => operand.is_null(),
        Some(Value::Array(items)) if !matches!(operand, Value::Array(_)) => {
            items.iter().any(|item| values_equal(item, operand))
        }
        Some(v) => values_equal(v, operand),
    }
}

fn compares(value: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |v: &Value| type_rank(v) == type_rank(operand) && accept(compare_values(v, operand));
    match value {
        None => false,
        Some(Value::Array(items)) if !matches!(operand, Value::Array(_)) => {
            items.iter().any(check)
        }
        Some(v) => check(v),
    }
}

/// Equality with integers and floats compared numerically.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if a.is_number() && b.is_number() {
        return compare_values(a, b) == Ordering::Equal;
    }
    a == b
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 1,
        Value::Integer(_) | Value::Float(_) => 2,
        Value::Text(_) => 3,
        Value::Document(_) => 4,
        Value::Array(_) => 5,
        Value::Bytes(_) => 6,
        Value::ObjectId(_) => 7,
        Value::Bool(_) => 8,
    }
}

/// Total order used for sorting and range operators.
///
/// Values of different kinds order as null < numbers < text < documents <
/// arrays < bytes < object ids < booleans. Among numbers NaN sorts first,
/// and integers compare exactly against floats.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => compare_floats(*x, *y),
        (Value::Integer(x), Value::Float(y)) => compare_integer_float(*x, *y),
        (Value::Float(x), Value::Integer(y)) => compare_integer_float(*y, *x).reverse(),
        (Value::Text(x), Value::Text(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Document(x), Value::Document(y)) => {
            for ((xk, xv), (yk, yv)) in x.iter().zip(y.iter()) {
                let ord = xk.cmp(yk).then_with(|| compare_values(xv, yv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Array(x), Value::Array(y)) => {
            for (xv, yv) in x.iter().zip(y.iter()) {
                let ord = compare_values(xv, yv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Bytes(x), Value::Bytes(y)) => x.len().cmp(&y.len()).then_with(|| x.cmp(y)),
        (Value::ObjectId(x), Value::ObjectId(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn compare_floats(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        // -0.0 and 0.0 are equal
        (false, false) if x == y => Ordering::Equal,
        (false, false) => x.total_cmp(&y),
    }
}

/// Compares `n` with `f` without rounding `n` to a float.
#[allow(clippy::cast_possible_truncation)]
fn compare_integer_float(n: i64, f: f64) -> Ordering {
    // 2^63 is exactly representable; i64 covers [-2^63, 2^63).
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return Ordering::Greater;
    }
    if f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match n.cmp(&(whole as i64)) {
        Ordering::Equal => {
            let fraction = f - whole;
            if fraction > 0.0 {
                Ordering::Less
            } else if fraction < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        other => other,
    }
}

/// Stable sort by `keys`, first key most significant.
pub fn sort_documents(docs: &mut [Document], keys: &[(String, SortOrder)]) {
    if keys.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        keys.iter()
            .map(|(path, order)| {
                let ord = compare_values(
                    a.get_path(path).unwrap_or(&Value::Null),
                    b.get_path(path).unwrap_or(&Value::Null),
                );
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Compares `doc` against a `min`/`max` bound over the bound's keys, in order.
#[must_use]
pub fn compare_to_bound(doc: &Document, bound: &Document) -> Ordering {
    bound
        .iter()
        .map(|(path, limit)| compare_values(doc.get_path(path).unwrap_or(&Value::Null), limit))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Shape of an update document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Only `$` operators.
    Operators,
    /// Plain fields replacing the whole document.
    Replacement,
}

/// Classifies and validates an update document.
///
/// # Errors
///
/// Returns [`DriverError::InvalidUpdate`] for mixed documents, unknown
/// operators or operands that are not documents.
pub fn validate_update(update: &Document) -> DriverResult<UpdateKind> {
    let operators = update.keys().filter(|k| k.starts_with('$')).count();
    if operators == 0 {
        return Ok(UpdateKind::Replacement);
    }
    if operators != update.len() {
        return Err(DriverError::invalid_update(
            "update mixes operators and plain fields",
        ));
    }
    for (op, operand) in update.iter() {
        if !UPDATE_OPERATORS.contains(&op) {
            return Err(DriverError::invalid_update(format!("unknown operator {op}")));
        }
        if operand.as_document().is_none() {
            return Err(DriverError::invalid_update(format!(
                "{op} expects a document"
            )));
        }
    }
    Ok(UpdateKind::Operators)
}

/// Applies `update` to `doc`, returning whether anything changed.
///
/// `_id` is immutable: replacements keep the existing one and operators may
/// not change it.
///
/// # Errors
///
/// Returns an error for invalid updates, non-numeric `$inc` targets,
/// non-array `$push` targets, or an attempt to change `_id`.
pub fn apply_update(doc: &mut Document, update: &Document) -> DriverResult<bool> {
    let before = doc.clone();
    match validate_update(update)? {
        UpdateKind::Replacement => {
            if let (Some(old), Some(new)) = (doc.get(ID_FIELD), update.get(ID_FIELD)) {
                if !values_equal(old, new) {
                    return Err(DriverError::ImmutableField {
                        field: ID_FIELD.to_string(),
                    });
                }
            }
            let id = doc.remove(ID_FIELD);
            let mut replacement = update.clone();
            if let Some(id) = id {
                replacement.insert_first(ID_FIELD, id);
            }
            *doc = replacement;
        }
        UpdateKind::Operators => {
            for (op, operand) in update.iter() {
                let Some(fields) = operand.as_document() else {
                    continue;
                };
                for (path, arg) in fields.iter() {
                    apply_operator(doc, op, path, arg)?;
                }
            }
            if let (Some(old), Some(new)) = (before.get(ID_FIELD), doc.get(ID_FIELD)) {
                if !values_equal(old, new) {
                    return Err(DriverError::ImmutableField {
                        field: ID_FIELD.to_string(),
                    });
                }
            }
        }
    }
    Ok(*doc != before)
}

fn apply_operator(doc: &mut Document, op: &str, path: &str, arg: &Value) -> DriverResult<()> {
    match op {
        "$set" => set_path(doc, path, arg.clone()),
        "$unset" => {
            unset_path(doc, path);
            Ok(())
        }
        "$inc" => {
            if !arg.is_number() {
                return Err(DriverError::invalid_update(format!(
                    "$inc on {path} needs a numeric operand"
                )));
            }
            let next = match doc.get_path(path) {
                None => arg.clone(),
                Some(Value::Integer(current)) => match arg {
                    Value::Integer(delta) => current
                        .checked_add(*delta)
                        .map(Value::Integer)
                        .ok_or_else(|| DriverError::invalid_update(format!("$inc on {path} overflows")))?,
                    _ => Value::Float(current_as_f64(*current) + arg.as_f64().unwrap_or_default()),
                },
                Some(Value::Float(current)) => Value::Float(current + arg.as_f64().unwrap_or_default()),
                Some(other) => {
                    return Err(DriverError::invalid_update(format!(
                        "$inc on {path} found {}",
                        other.type_name()
                    )))
                }
            };
            set_path(doc, path, next)
        }
        "$push" => {
            let next = match doc.get_path(path) {
                None => Value::Array(vec![arg.clone()]),
                Some(Value::Array(items)) => {
                    let mut items = items.clone();
                    items.push(arg.clone());
                    Value::Array(items)
                }
                Some(other) => {
                    return Err(DriverError::invalid_update(format!(
                        "$push on {path} found {}",
                        other.type_name()
                    )))
                }
            };
            set_path(doc, path, next)
        }
        other => Err(DriverError::invalid_update(format!("unknown operator {other}"))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn current_as_f64(n: i64) -> f64 {
    n as f64
}

fn set_path(doc: &mut Document, path: &str, value: Value) -> DriverResult<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Value::Document(child)) => set_path(child, rest, value),
                _ => Err(DriverError::invalid_update(format!(
                    "cannot descend into non-document field {head}"
                ))),
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Document(child)) = doc.get_mut(head) {
                unset_path(child, rest);
            }
        }
    }
}

/// Builds the document an upsert inserts when nothing matched.
///
/// Equality conditions in `filter` seed the document, then `update` is
/// applied on top. A missing or null `_id` is replaced by a fresh one.
///
/// # Errors
///
/// Returns an error if the update cannot be applied.
pub fn build_upsert(filter: &Document, update: &Document) -> DriverResult<Document> {
    let mut seed = Document::new();
    for (key, condition) in filter.iter() {
        if key.starts_with('$') {
            continue;
        }
        let value = match condition.as_document().filter(|_| is_operator_document(condition)) {
            Some(operators) => match operators.get("$eq") {
                Some(v) => v.clone(),
                None => continue,
            },
            None => condition.clone(),
        };
        set_path(&mut seed, key, value)?;
    }

    let mut doc = match validate_update(update)? {
        UpdateKind::Replacement => {
            let mut replacement = update.clone();
            if let Some(id) = seed.remove(ID_FIELD) {
                replacement.insert_first(ID_FIELD, id);
            }
            replacement
        }
        UpdateKind::Operators => {
            apply_update(&mut seed, update)?;
            seed
        }
    };

    match doc.remove(ID_FIELD) {
        Some(id) if !id.is_null() => doc.insert_first(ID_FIELD, id),
        _ => doc.insert_first(ID_FIELD, ObjectId::new()),
    }
    Ok(doc)
}
