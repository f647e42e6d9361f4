//! Dotted-path access and ordering over JSON documents.

use std::cmp::Ordering;

use binsight_core::FieldMap;
use serde_json::Value;

use crate::error::PersistenceError;

/// Splits a dotted path, rejecting empty segments and operator-like names.
pub fn split_path(path: &str) -> Result<Vec<&str>, PersistenceError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || s.starts_with('$'))
    {
        return Err(PersistenceError::invalid_query(format!(
            "invalid field path '{path}'"
        )));
    }
    Ok(segments)
}

/// Resolves a dotted path. Numeric segments index into arrays.
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolves a dotted path on a field map.
pub fn get_field<'a>(doc: &'a FieldMap, path: &str) -> Option<&'a Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let value = doc.get(head)?;
    match rest {
        Some(rest) => get_path(value, rest),
        None => Some(value),
    }
}

/// Sets a dotted path, creating intermediate objects.
///
/// Fails if an intermediate segment exists and is not an object.
pub fn set_field(doc: &mut FieldMap, path: &str, value: Value) -> Result<(), PersistenceError> {
    let segments = split_path(path)?;
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| PersistenceError::invalid_query("empty field path"))?;

    let mut current = doc;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(FieldMap::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(PersistenceError::invalid_record(format!(
                    "cannot set '{path}': '{segment}' is not an object"
                )));
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Removes a dotted path if present.
pub fn remove_field(doc: &mut FieldMap, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Value::Object(inner)) => remove_field(inner, rest),
            _ => None,
        },
    }
}

/// Equality used by filters: numbers compare by value, everything else structurally.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Ordering between two values of the same comparable type (numbers or strings).
///
/// Returns `None` when the types differ or are not ordered by filters.
pub fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Bool(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Total order used for sorting:
/// missing < null < numbers < strings < booleans < arrays < objects.
///
/// Arrays and objects compare by length first, then member by member.
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.as_bytes().cmp(y.as_bytes()),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y)
                .map(|(a, b)| compare_for_sort(Some(a), Some(b)))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        (Some(Value::Object(x)), Some(Value::Object(y))) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y)
                .map(|((ka, va), (kb, vb))| {
                    ka.as_bytes()
                        .cmp(kb.as_bytes())
                        .then_with(|| compare_for_sort(Some(va), Some(vb)))
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        _ => Ordering::Equal,
    }
}

/// Name of a value's JSON type, as used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_path_nested_and_indexed() {
        let doc = json!({"status": {"fill_level": 70}, "tags": ["a", "b"]});
        assert_eq!(get_path(&doc, "status.fill_level"), Some(&json!(70)));
        assert_eq!(get_path(&doc, "tags.1"), Some(&json!("b")));
        assert_eq!(get_path(&doc, "status.missing"), None);
        assert_eq!(get_path(&doc, "tags.x"), None);
    }

    #[test]
    fn test_set_field_creates_intermediates() {
        let mut doc = FieldMap::new();
        set_field(&mut doc, "status.fill_level", json!(55)).unwrap();
        assert_eq!(Value::Object(doc.clone()), json!({"status": {"fill_level": 55}}));

        doc.insert("bin_id".into(), json!("bin-1"));
        let err = set_field(&mut doc, "bin_id.nested", json!(1)).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(set_field(&mut doc, "a..b", json!(1)).is_err());
    }

    #[test]
    fn test_remove_field() {
        let mut doc = binsight_core::field_map(json!({"a": {"b": 1, "c": 2}})).unwrap();
        assert_eq!(remove_field(&mut doc, "a.b"), Some(json!(1)));
        assert_eq!(remove_field(&mut doc, "a.z"), None);
        assert_eq!(Value::Object(doc), json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_values_equal_numbers() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_sort_order_across_types() {
        let mut values = [
            Some(json!({"a": 1})),
            Some(json!(true)),
            Some(json!("b")),
            None,
            Some(json!([1])),
            Some(json!(2)),
            Some(Value::Null),
            Some(json!(-1.5)),
            Some(json!("a")),
        ];
        values.sort_by(|a, b| compare_for_sort(a.as_ref(), b.as_ref()));
        assert_eq!(
            values.to_vec(),
            vec![
                None,
                Some(Value::Null),
                Some(json!(-1.5)),
                Some(json!(2)),
                Some(json!("a")),
                Some(json!("b")),
                Some(json!(true)),
                Some(json!([1])),
                Some(json!({"a": 1})),
            ]
        );
    }

    #[test]
    fn test_compare_same_type_only() {
        assert_eq!(
            compare_same_type(&json!(3), &json!(2.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(compare_same_type(&json!("3"), &json!(2)), None);
    }
}
