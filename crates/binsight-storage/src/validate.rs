//! Payload checks shared by the repository backends.

use binsight_core::{FieldMap, Record, generate_id, validate_document_id};
use serde_json::Value;

use crate::error::PersistenceError;
use crate::value::set_field;

/// Rejects a create payload that supplies `id` or names unknown columns.
pub fn check_create_fields<M: Record>(fields: &FieldMap) -> Result<(), PersistenceError> {
    if fields.contains_key("id") {
        return Err(PersistenceError::invalid_record(format!(
            "{}: id is assigned by the store",
            M::TABLE
        )));
    }
    check_columns::<M>(fields)
}

/// Rejects an update payload that supplies `id` or names unknown columns.
pub fn check_update_fields<M: Record>(fields: &FieldMap) -> Result<(), PersistenceError> {
    if fields.contains_key("id") {
        return Err(PersistenceError::invalid_record(format!(
            "{}: id cannot be updated",
            M::TABLE
        )));
    }
    check_columns::<M>(fields)
}

fn check_columns<M: Record>(fields: &FieldMap) -> Result<(), PersistenceError> {
    match fields.keys().find(|k| !M::has_column(k)) {
        Some(column) => Err(PersistenceError::invalid_record(format!(
            "{}: unknown column '{column}'",
            M::TABLE
        ))),
        None => Ok(()),
    }
}

/// Drops filter keys that are not columns of `M`.
pub fn known_filters<M: Record>(filters: &FieldMap) -> FieldMap {
    filters
        .iter()
        .filter(|(column, _)| {
            let known = M::has_column(column);
            if !known {
                tracing::debug!(table = M::TABLE, column = %column, "Ignoring unknown filter column");
            }
            known
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Returns the `_id` of a new document, generating one if the payload has none.
///
/// A generated id is written back into `fields`.
pub fn assign_document_id(fields: &mut FieldMap) -> Result<String, PersistenceError> {
    if let Some(key) = fields.keys().find(|k| k.starts_with('$') || k.contains('.')) {
        return Err(PersistenceError::invalid_record(format!(
            "invalid document field name '{key}'"
        )));
    }
    match fields.get("_id") {
        Some(Value::String(id)) => {
            validate_document_id(id).map_err(|e| PersistenceError::invalid_record(e.to_string()))?;
            Ok(id.clone())
        }
        Some(_) => Err(PersistenceError::invalid_record("_id must be a string")),
        None => {
            let id = generate_id();
            fields.insert("_id".to_string(), Value::String(id.clone()));
            Ok(id)
        }
    }
}

/// Applies `$set`-style changes to a stored document.
///
/// Keys may be dotted paths. `_id` may be repeated but not changed.
pub fn apply_set(doc: &mut FieldMap, changes: &FieldMap) -> Result<(), PersistenceError> {
    for (path, value) in changes {
        if path == "_id" {
            if doc.get("_id") != Some(value) {
                return Err(PersistenceError::invalid_record("_id cannot be changed"));
            }
            continue;
        }
        if path.starts_with("_id.") {
            return Err(PersistenceError::invalid_record("_id cannot be changed"));
        }
        set_field(doc, path, value.clone())
            .map_err(|e| PersistenceError::invalid_record(e.to_string()))?;
    }
    Ok(())
}
