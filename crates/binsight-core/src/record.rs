//! Structural contracts shared by every persisted model.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Primary key type of relational records.
pub type RecordId = i64;

/// Column/field name to value mapping used for create, update and filter payloads.
pub type FieldMap = serde_json::Map<String, Value>;

/// A row-shaped entity stored in the relational store.
///
/// The repository never inspects the model beyond these constants: rows are
/// moved between the database and the model through their JSON form, so the
/// serde field names must match the column names exactly.
///
/// # Example
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Operator { id: i64, name: String }
///
/// impl Record for Operator {
///     const TABLE: &'static str = "operators";
///     const COLUMNS: &'static [&'static str] = &["id", "name"];
///     fn id(&self) -> RecordId { self.id }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Table holding rows of this type.
    const TABLE: &'static str;

    /// Every column of the table, including `id`.
    const COLUMNS: &'static [&'static str];

    /// Columns carrying a uniqueness constraint (besides `id`).
    const UNIQUE: &'static [&'static str] = &[];

    /// Column refreshed with the current time on every update, if any.
    const TOUCH_ON_UPDATE: Option<&'static str> = None;

    /// Returns the primary key.
    fn id(&self) -> RecordId;

    /// Returns true if `column` is a column of this record type.
    fn has_column(column: &str) -> bool {
        Self::COLUMNS.contains(&column)
    }

    /// Converts the record into its column map.
    fn to_fields(&self) -> Result<FieldMap> {
        into_object(std::any::type_name::<Self>(), serde_json::to_value(self)?)
    }

    /// Builds a record from a full column map.
    fn from_fields(fields: FieldMap) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// A schema-free entity stored in a document collection.
///
/// The `_id` field is the document key; models usually map it with
/// `#[serde(rename = "_id")]`.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Collection holding documents of this type.
    const COLLECTION: &'static str;

    /// Returns the `_id` value.
    fn id(&self) -> &str;

    /// Converts the document into its JSON object form.
    fn to_fields(&self) -> Result<FieldMap> {
        into_object(std::any::type_name::<Self>(), serde_json::to_value(self)?)
    }

    /// Builds a document from its JSON object form.
    fn from_fields(fields: FieldMap) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// Converts a JSON object literal into a [`FieldMap`].
///
/// ```
/// use binsight_core::field_map;
///
/// let fields = field_map(serde_json::json!({"role": "admin"})).unwrap();
/// assert_eq!(fields["role"], "admin");
/// ```
pub fn field_map(value: Value) -> Result<FieldMap> {
    into_object("FieldMap", value)
}

fn into_object(model: &'static str, value: Value) -> Result<FieldMap> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::not_an_object(model, &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Operator {
        id: RecordId,
        name: String,
    }

    impl Record for Operator {
        const TABLE: &'static str = "operators";
        const COLUMNS: &'static [&'static str] = &["id", "name"];

        fn id(&self) -> RecordId {
            self.id
        }
    }

    #[test]
    fn test_record_field_round_trip() {
        let op = Operator {
            id: 7,
            name: "night shift".into(),
        };
        let fields = op.to_fields().unwrap();
        assert_eq!(fields["id"], 7);
        assert_eq!(Operator::from_fields(fields).unwrap(), op);
    }

    #[test]
    fn test_has_column() {
        assert!(Operator::has_column("name"));
        assert!(!Operator::has_column("email"));
    }

    #[test]
    fn test_field_map_rejects_non_objects() {
        let err = field_map(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }
}
