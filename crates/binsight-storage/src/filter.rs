//! Document filter language.
//!
//! A filter is a JSON object in the familiar document-database style:
//!
//! ```text
//! { "bin_id": "bin-1" }                                  equality
//! { "status.fill_level": { "$gt": 80 } }                 operators on a dotted path
//! { "$or": [ {"state": "offline"}, {"battery": {"$lt": 3.3}} ] }
//! ```
//!
//! Top-level keys form an implicit `$and`. Parsing produces a typed
//! [`DocumentFilter`] that backends either evaluate in process
//! ([`DocumentFilter::matches`]) or compile to their native query language.

use serde_json::Value;

use binsight_core::FieldMap;

use crate::error::PersistenceError;
use crate::value::{compare_same_type, get_path, split_path, type_name, values_equal};

/// Comparison applied to the value found at a path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

/// Parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentFilter {
    /// All sub-filters match. An empty conjunction matches everything.
    And(Vec<DocumentFilter>),
    /// At least one sub-filter matches.
    Or(Vec<DocumentFilter>),
    /// No sub-filter matches.
    Nor(Vec<DocumentFilter>),
    /// A comparison on one dotted path.
    Field { path: String, op: FieldOp },
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl DocumentFilter {
    /// Filter matching every document.
    #[must_use]
    pub fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Equality on one path.
    #[must_use]
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Field {
            path: path.into(),
            op: FieldOp::Eq(value.into()),
        }
    }

    /// Returns true if this filter matches every document.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::And(clauses) if clauses.iter().all(Self::is_empty))
    }

    /// Parses a JSON filter object.
    pub fn parse(filter: &Value) -> Result<Self, PersistenceError> {
        match filter {
            Value::Object(map) => Self::from_fields(map),
            other => Err(PersistenceError::invalid_query(format!(
                "filter must be an object, got {}",
                type_name(other)
            ))),
        }
    }

    /// Parses a filter from a field map.
    pub fn from_fields(map: &FieldMap) -> Result<Self, PersistenceError> {
        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            match key.as_str() {
                "$and" => clauses.push(Self::And(parse_list(key, value)?)),
                "$or" => clauses.push(Self::Or(parse_list(key, value)?)),
                "$nor" => clauses.push(Self::Nor(parse_list(key, value)?)),
                op if op.starts_with('$') => {
                    return Err(PersistenceError::invalid_query(format!(
                        "unknown top-level operator '{op}'"
                    )));
                }
                path => {
                    split_path(path)?;
                    parse_field(path, value, &mut clauses)?;
                }
            }
        }
        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Self::And(clauses)
        })
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
            Self::Or(clauses) => clauses.iter().any(|c| c.matches(doc)),
            Self::Nor(clauses) => !clauses.iter().any(|c| c.matches(doc)),
            Self::Field { path, op } => op.matches(get_path(doc, path)),
        }
    }
}

impl TryFrom<Value> for DocumentFilter {
    type Error = PersistenceError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

fn parse_list(op: &str, value: &Value) -> Result<Vec<DocumentFilter>, PersistenceError> {
    match value {
        Value::Array(items) if !items.is_empty() => items.iter().map(DocumentFilter::parse).collect(),
        _ => Err(PersistenceError::invalid_query(format!(
            "'{op}' expects a non-empty array of filters"
        ))),
    }
}

fn parse_field(
    path: &str,
    value: &Value,
    clauses: &mut Vec<DocumentFilter>,
) -> Result<(), PersistenceError> {
    let operators = match value {
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
        _ => {
            clauses.push(DocumentFilter::eq(path, value.clone()));
            return Ok(());
        }
    };

    for (name, operand) in operators {
        let op = match name.as_str() {
            "$eq" => FieldOp::Eq(operand.clone()),
            "$ne" => FieldOp::Ne(operand.clone()),
            "$gt" => FieldOp::Gt(operand.clone()),
            "$gte" => FieldOp::Gte(operand.clone()),
            "$lt" => FieldOp::Lt(operand.clone()),
            "$lte" => FieldOp::Lte(operand.clone()),
            "$in" => FieldOp::In(operand_list(path, name, operand)?),
            "$nin" => FieldOp::Nin(operand_list(path, name, operand)?),
            "$exists" => match operand {
                Value::Bool(b) => FieldOp::Exists(*b),
                Value::Number(n) => FieldOp::Exists(n.as_f64() != Some(0.0)),
                _ => {
                    return Err(PersistenceError::invalid_query(format!(
                        "'$exists' on '{path}' expects a boolean"
                    )));
                }
            },
            other if other.starts_with('$') => {
                return Err(PersistenceError::invalid_query(format!(
                    "unknown operator '{other}' on '{path}'"
                )));
            }
            other => {
                return Err(PersistenceError::invalid_query(format!(
                    "cannot mix operators and field '{other}' on '{path}'"
                )));
            }
        };
        clauses.push(DocumentFilter::Field {
            path: path.to_string(),
            op,
        });
    }
    Ok(())
}

fn operand_list(path: &str, op: &str, operand: &Value) -> Result<Vec<Value>, PersistenceError> {
    match operand {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(PersistenceError::invalid_query(format!(
            "'{op}' on '{path}' expects an array"
        ))),
    }
}

impl FieldOp {
    /// Evaluates the comparison against the value found at the path.
    #[must_use]
    pub fn matches(&self, target: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => eq_matches(target, expected),
            Self::Ne(expected) => !eq_matches(target, expected),
            Self::In(options) => options.iter().any(|o| eq_matches(target, o)),
            Self::Nin(options) => !options.iter().any(|o| eq_matches(target, o)),
            Self::Exists(expected) => target.is_some() == *expected,
            Self::Gt(bound) => ordered_matches(target, bound, |o| o.is_gt()),
            Self::Gte(bound) => ordered_matches(target, bound, |o| o.is_ge()),
            Self::Lt(bound) => ordered_matches(target, bound, |o| o.is_lt()),
            Self::Lte(bound) => ordered_matches(target, bound, |o| o.is_le()),
        }
    }
}

/// Equality with the usual array semantics: an array field matches a scalar
/// it contains, or an array equal to itself. A missing field equals `null`.
fn eq_matches(target: Option<&Value>, expected: &Value) -> bool {
    match target {
        None => expected.is_null(),
        Some(value @ Value::Array(items)) => {
            items.iter().any(|item| values_equal(item, expected))
                || (expected.is_array() && values_equal(value, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

fn ordered_matches(
    target: Option<&Value>,
    bound: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    let check = |v: &Value| compare_same_type(v, bound).is_some_and(&accept);
    match target {
        None => false,
        Some(Value::Array(items)) => items.iter().any(check),
        Some(value) => check(value),
    }
}
