//! In-memory relational tables.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use binsight_core::{FieldMap, Record, RecordId};
use binsight_storage::validate::{check_create_fields, check_update_fields, known_filters};
use binsight_storage::value::values_equal;
use binsight_storage::{ObserveExt, Page, PersistenceError, RelationalRepository};

use crate::BACKEND_NAME;

/// Rows of one table, ordered by primary key.
#[derive(Debug)]
pub struct MemoryTable {
    rows: RwLock<BTreeMap<RecordId, FieldMap>>,
    next_id: AtomicI64,
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryTable {
    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns true if the table holds no rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

/// [`RelationalRepository`] over a [`MemoryTable`].
///
/// Enforces `id` assignment, column checks, required columns (through the
/// model's serde definition) and the model's `UNIQUE` columns. Foreign keys
/// are not checked.
pub struct MemoryRelationalRepository<M: Record> {
    table: Arc<MemoryTable>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Record> MemoryRelationalRepository<M> {
    /// Creates a repository over `table`.
    pub fn new(table: Arc<MemoryTable>) -> Self {
        Self {
            table,
            _model: PhantomData,
        }
    }

    /// Decodes a candidate row, classifying serde failures the way a database
    /// would report them.
    fn decode(row: &FieldMap) -> Result<M, PersistenceError> {
        serde_json::from_value(Value::Object(row.clone())).map_err(|e| {
            let message = e.to_string();
            if message.starts_with("missing field") || message.starts_with("invalid type: null") {
                PersistenceError::constraint_violation(M::TABLE, message)
            } else {
                PersistenceError::invalid_record(format!("{}: {message}", M::TABLE))
            }
        })
    }

    /// Serializes a decoded row back, so stored rows carry every default.
    fn normalize(model: &M) -> Result<FieldMap, PersistenceError> {
        Ok(model.to_fields()?)
    }

    fn check_unique(
        rows: &BTreeMap<RecordId, FieldMap>,
        candidate: &FieldMap,
        own_id: RecordId,
    ) -> Result<(), PersistenceError> {
        for column in M::UNIQUE {
            let Some(value) = candidate.get(*column).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = rows.iter().any(|(id, row)| {
                *id != own_id && row.get(*column).is_some_and(|other| values_equal(other, value))
            });
            if taken {
                return Err(PersistenceError::conflict(
                    M::TABLE,
                    format!("duplicate value for unique column '{column}'"),
                ));
            }
        }
        Ok(())
    }

    async fn create_row(&self, fields: FieldMap) -> Result<M, PersistenceError> {
        check_create_fields::<M>(&fields)?;

        let mut rows = self.table.rows.write().await;
        let id = self.table.next_id.load(Ordering::SeqCst);
        let mut candidate = fields;
        candidate.insert("id".to_string(), Value::from(id));

        let model = Self::decode(&candidate)?;
        let row = Self::normalize(&model)?;
        Self::check_unique(&rows, &row, id)?;

        self.table.next_id.fetch_add(1, Ordering::SeqCst);
        rows.insert(id, row);
        Ok(model)
    }

    async fn update_row(&self, id: RecordId, fields: FieldMap) -> Result<Option<M>, PersistenceError> {
        check_update_fields::<M>(&fields)?;

        let mut rows = self.table.rows.write().await;
        let Some(current) = rows.get(&id) else {
            return Ok(None);
        };
        if fields.is_empty() {
            return Self::decode(current).map(Some);
        }

        let mut candidate = current.clone();
        candidate.extend(fields);
        if let Some(column) = M::TOUCH_ON_UPDATE {
            let now = serde_json::to_value(chrono::Utc::now())
                .map_err(|e| PersistenceError::internal(e.to_string()))?;
            candidate.insert(column.to_string(), now);
        }

        let model = Self::decode(&candidate)?;
        let row = Self::normalize(&model)?;
        Self::check_unique(&rows, &row, id)?;
        rows.insert(id, row);
        Ok(Some(model))
    }

    async fn select(&self, page: Page, filters: &FieldMap) -> Result<Vec<M>, PersistenceError> {
        let filters = known_filters::<M>(filters);
        let rows = self.table.rows.read().await;
        let matching = rows.values().filter(|row| {
            filters.iter().all(|(column, expected)| match row.get(column) {
                None | Some(Value::Null) => expected.is_null(),
                Some(actual) => values_equal(actual, expected),
            })
        });
        page.apply(matching).into_iter().map(Self::decode).collect()
    }
}

#[async_trait]
impl<M: Record> RelationalRepository<M> for MemoryRelationalRepository<M> {
    async fn create(&self, fields: FieldMap) -> Result<M, PersistenceError> {
        self.create_row(fields).await.observe(BACKEND_NAME, "create")
    }

    async fn get_by_id(&self, id: RecordId) -> Result<Option<M>, PersistenceError> {
        let rows = self.table.rows.read().await;
        rows.get(&id)
            .map(Self::decode)
            .transpose()
            .observe(BACKEND_NAME, "get_by_id")
    }

    async fn get_many(&self, page: Page, filters: &FieldMap) -> Result<Vec<M>, PersistenceError> {
        self.select(page, filters).await.observe(BACKEND_NAME, "get_many")
    }

    async fn update(&self, id: RecordId, fields: FieldMap) -> Result<Option<M>, PersistenceError> {
        self.update_row(id, fields).await.observe(BACKEND_NAME, "update")
    }

    async fn delete(&self, id: RecordId) -> Result<bool, PersistenceError> {
        Ok(self.table.rows.write().await.remove(&id).is_some())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binsight_core::field_map;
    use binsight_core::models::{Role, User};
    use serde_json::json;

    fn users() -> MemoryRelationalRepository<User> {
        MemoryRelationalRepository::new(Arc::new(MemoryTable::default()))
    }

    fn as_repository(repo: &MemoryRelationalRepository<User>) -> &dyn RelationalRepository<User> {
        repo
    }

    fn user(name: &str) -> FieldMap {
        field_map(json!({
            "username": name,
            "email": format!("{name}@example.com"),
            "password_hash": "hash"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let repo = users();
        let a = repo.create(user("ana")).await.unwrap();
        let b = repo.create(user("bo")).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.role, Role::Operator);
    }

    #[tokio::test]
    async fn test_duplicate_unique_column_is_conflict() {
        let repo = users();
        repo.create(user("ana")).await.unwrap();

        let err = repo.create(user("ana")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(repo.table.len().await, 1);

        // Failed inserts do not consume ids.
        let next = repo.create(user("bo")).await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn test_missing_required_column_is_constraint_violation() {
        let repo = users();
        let err = repo
            .create(field_map(json!({"username": "ana"})).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());
        assert!(repo.table.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_touches_updated_at() {
        let repo = users();
        let created = repo.create(user("ana")).await.unwrap();

        let updated = repo
            .update(created.id, field_map(json!({"role": "admin"})).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.username, "ana");
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_update_rejects_id_and_unknown_columns() {
        let repo = users();
        let created = repo.create(user("ana")).await.unwrap();

        for bad in [json!({"id": 9}), json!({"nickname": "x"})] {
            let err = repo
                .update(created.id, field_map(bad).unwrap())
                .await
                .unwrap_err();
            assert!(err.is_invalid_input());
        }
    }

    #[tokio::test]
    async fn test_update_to_taken_unique_value_is_conflict() {
        let repo = users();
        repo.create(user("ana")).await.unwrap();
        let bo = repo.create(user("bo")).await.unwrap();

        let err = repo
            .update(bo.id, field_map(json!({"email": "ana@example.com"})).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_get_many_null_filter_and_unknown_keys() {
        let repo = users();
        let repo = as_repository(&repo);
        repo.create(user("ana")).await.unwrap();

        let filters = field_map(json!({"is_active": true, "nope": 1})).unwrap();
        assert_eq!(repo.get_many(Page::default(), &filters).await.unwrap().len(), 1);

        let filters = field_map(json!({"is_active": false})).unwrap();
        assert!(repo.get_many(Page::default(), &filters).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_name() {
        let repo = users();
        assert_eq!(as_repository(&repo).backend_name(), "memory");
    }
}
