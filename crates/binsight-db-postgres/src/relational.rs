//! Generic relational repository.
//!
//! Rows travel as JSON: payloads are bound as one `jsonb` parameter and
//! expanded with `jsonb_populate_record`, results come back as `to_jsonb(t)`
//! and are decoded into the model. Table and column names come from
//! [`Record::TABLE`] and [`Record::COLUMNS`].

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use tracing::instrument;

use binsight_core::{FieldMap, Record, RecordId};
use binsight_storage::validate::{check_create_fields, check_update_fields, known_filters};
use binsight_storage::{ObserveExt, Page, PersistenceError, RelationalRepository};

use crate::BACKEND_NAME;
use crate::error::classify;

fn quote(column: &str) -> String {
    format!("\"{column}\"")
}

/// Builds the `INSERT` for the supplied columns.
fn insert_sql(table: &str, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!(r#"INSERT INTO "{table}" AS t DEFAULT VALUES RETURNING to_jsonb(t)"#);
    }
    let list = columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
    format!(
        r#"INSERT INTO "{table}" AS t ({list})
           SELECT {list} FROM jsonb_populate_record(NULL::"{table}", $1)
           RETURNING to_jsonb(t)"#
    )
}

/// Builds the partial `UPDATE` for the supplied columns.
fn update_sql(table: &str, columns: &[&str], touch: Option<&str>) -> String {
    let mut assignments: Vec<String> = columns
        .iter()
        .filter(|c| Some(**c) != touch)
        .map(|c| format!("{col} = r.{col}", col = quote(c)))
        .collect();
    if let Some(touch) = touch {
        assignments.push(format!("{} = NOW()", quote(touch)));
    }
    format!(
        r#"UPDATE "{table}" AS t SET {}
           FROM jsonb_populate_record(NULL::"{table}", $2) AS r
           WHERE t.id = $1
           RETURNING to_jsonb(t)"#,
        assignments.join(", ")
    )
}

/// Builds the filtered, paged `SELECT`.
///
/// The filter payload is always joined so `$1` is referenced even when no
/// column is filtered.
fn select_sql(table: &str, columns: &[&str]) -> String {
    let mut sql = format!(
        r#"SELECT to_jsonb(t) FROM "{table}" t, jsonb_populate_record(NULL::"{table}", $1) r"#
    );
    if !columns.is_empty() {
        let predicates: Vec<String> = columns
            .iter()
            .map(|c| format!("t.{col} IS NOT DISTINCT FROM r.{col}", col = quote(c)))
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }
    sql.push_str(" ORDER BY t.id OFFSET $2 LIMIT $3");
    sql
}

/// [`RelationalRepository`] for any [`Record`] backed by its migrated table.
pub struct PgRelationalRepository<M: Record> {
    pool: PgPool,
    _model: PhantomData<fn() -> M>,
}

impl<M: Record> Clone for PgRelationalRepository<M> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl<M: Record> PgRelationalRepository<M> {
    /// Creates a repository on `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _model: PhantomData,
        }
    }

    fn decode(row: Value) -> Result<M, PersistenceError> {
        serde_json::from_value(row)
            .map_err(|e| PersistenceError::internal(format!("{}: cannot decode row: {e}", M::TABLE)))
    }

    #[instrument(skip(self, fields), fields(table = M::TABLE))]
    async fn insert(&self, fields: FieldMap) -> Result<M, PersistenceError> {
        check_create_fields::<M>(&fields)?;
        let columns: Vec<&str> = fields.keys().map(String::as_str).collect();
        let sql = insert_sql(M::TABLE, &columns);

        let mut tx = self.pool.begin().await.map_err(|e| classify(e, M::TABLE))?;
        let row: Value = query_scalar(&sql)
            .bind(Value::Object(fields.clone()))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(e, M::TABLE))?;
        tx.commit().await.map_err(|e| classify(e, M::TABLE))?;

        Self::decode(row)
    }

    async fn fetch(&self, id: RecordId) -> Result<Option<M>, PersistenceError> {
        let sql = format!(r#"SELECT to_jsonb(t) FROM "{}" t WHERE t.id = $1"#, M::TABLE);
        let row: Option<Value> = query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, M::TABLE))?;
        row.map(Self::decode).transpose()
    }

    #[instrument(skip(self, fields), fields(table = M::TABLE))]
    async fn modify(&self, id: RecordId, fields: FieldMap) -> Result<Option<M>, PersistenceError> {
        check_update_fields::<M>(&fields)?;
        if fields.is_empty() {
            return self.fetch(id).await;
        }
        let columns: Vec<&str> = fields.keys().map(String::as_str).collect();
        let sql = update_sql(M::TABLE, &columns, M::TOUCH_ON_UPDATE);

        let mut tx = self.pool.begin().await.map_err(|e| classify(e, M::TABLE))?;
        let row: Option<Value> = query_scalar(&sql)
            .bind(id)
            .bind(Value::Object(fields.clone()))
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| classify(e, M::TABLE))?;
        tx.commit().await.map_err(|e| classify(e, M::TABLE))?;

        row.map(Self::decode).transpose()
    }

    async fn select(&self, page: Page, filters: &FieldMap) -> Result<Vec<M>, PersistenceError> {
        let filters = known_filters::<M>(filters);
        let columns: Vec<&str> = filters.keys().map(String::as_str).collect();
        let sql = select_sql(M::TABLE, &columns);

        let rows: Vec<Value> = query_scalar(&sql)
            .bind(Value::Object(filters.clone()))
            .bind(page.offset_i64())
            .bind(page.limit_i64())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, M::TABLE))?;
        rows.into_iter().map(Self::decode).collect()
    }

    async fn remove(&self, id: RecordId) -> Result<bool, PersistenceError> {
        let sql = format!(r#"DELETE FROM "{}" WHERE id = $1"#, M::TABLE);
        let result = query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, M::TABLE))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl<M: Record> RelationalRepository<M> for PgRelationalRepository<M> {
    async fn create(&self, fields: FieldMap) -> Result<M, PersistenceError> {
        self.insert(fields).await.observe(BACKEND_NAME, "create")
    }

    async fn get_by_id(&self, id: RecordId) -> Result<Option<M>, PersistenceError> {
        self.fetch(id).await.observe(BACKEND_NAME, "get_by_id")
    }

    async fn get_many(&self, page: Page, filters: &FieldMap) -> Result<Vec<M>, PersistenceError> {
        self.select(page, filters).await.observe(BACKEND_NAME, "get_many")
    }

    async fn update(&self, id: RecordId, fields: FieldMap) -> Result<Option<M>, PersistenceError> {
        self.modify(id, fields).await.observe(BACKEND_NAME, "update")
    }

    async fn delete(&self, id: RecordId) -> Result<bool, PersistenceError> {
        self.remove(id).await.observe(BACKEND_NAME, "delete")
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sql() {
        let sql = insert_sql("users", &["username", "email"]);
        assert!(sql.starts_with(r#"INSERT INTO "users" AS t ("username", "email")"#));
        assert!(sql.contains(r#"SELECT "username", "email" FROM jsonb_populate_record(NULL::"users", $1)"#));
        assert!(sql.ends_with("RETURNING to_jsonb(t)"));

        assert_eq!(
            insert_sql("system_metrics", &[]),
            r#"INSERT INTO "system_metrics" AS t DEFAULT VALUES RETURNING to_jsonb(t)"#
        );
    }

    #[test]
    fn test_update_sql_touches_column_once() {
        let sql = update_sql("users", &["email", "updated_at"], Some("updated_at"));
        assert!(sql.contains(r#"SET "email" = r."email", "updated_at" = NOW()"#));
        assert_eq!(sql.matches(r#""updated_at""#).count(), 1);

        let sql = update_sql("alert_logs", &["acknowledged"], None);
        assert!(sql.contains(r#"SET "acknowledged" = r."acknowledged""#));
        assert!(sql.contains("WHERE t.id = $1"));
    }

    #[test]
    fn test_select_sql() {
        let sql = select_sql("alert_logs", &[]);
        assert!(!sql.contains("WHERE"));
        assert!(sql.ends_with("ORDER BY t.id OFFSET $2 LIMIT $3"));
        let sql = select_sql("alert_logs", &["severity", "acknowledged_by"]);
        assert!(sql.contains(
            r#"t."severity" IS NOT DISTINCT FROM r."severity" AND t."acknowledged_by" IS NOT DISTINCT FROM r."acknowledged_by""#
        ));
    }
}
