//! JSONB-backed document repository.
//!
//! Each collection lives in a `doc_<collection>` table (see
//! [`CollectionManager`](crate::schema::CollectionManager)). The whole
//! document, `_id` included, is stored in `data`; `id` duplicates `_id` as
//! the primary key. Filters and sorts are compiled to SQL by [`sql`];
//! aggregation evaluates a leading `$match` in the database and the remaining
//! stages in process.

pub mod sql;

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use tracing::{debug, instrument};

use binsight_core::{Document, FieldMap};
use binsight_storage::validate::{apply_set, assign_document_id};
use binsight_storage::{
    DocumentFilter, DocumentRepository, ObserveExt, Page, PersistenceError, Pipeline, SortKey,
};

use crate::BACKEND_NAME;
use crate::error::classify;
use crate::schema::CollectionManager;
use sql::{SqlBuilder, SqlParam, bind_scalar};

/// [`DocumentRepository`] over a PostgreSQL JSONB table.
pub struct PgDocumentRepository<M: Document> {
    collections: CollectionManager,
    _model: PhantomData<fn() -> M>,
}

impl<M: Document> Clone for PgDocumentRepository<M> {
    fn clone(&self) -> Self {
        Self::new(self.collections.clone())
    }
}

impl<M: Document> PgDocumentRepository<M> {
    /// Creates a repository; the table is created on first use.
    #[must_use]
    pub fn new(collections: CollectionManager) -> Self {
        Self {
            collections,
            _model: PhantomData,
        }
    }

    fn pool(&self) -> &PgPool {
        self.collections.pool()
    }

    async fn table(&self) -> Result<String, PersistenceError> {
        Ok(self.collections.ensure_collection(M::COLLECTION).await?)
    }

    fn failed(e: sqlx_core::error::Error) -> PersistenceError {
        classify(e, M::COLLECTION)
    }

    /// Decodes a caller-supplied document and returns it with its stored form.
    fn accept(fields: FieldMap) -> Result<(M, Value), PersistenceError> {
        let model = M::from_fields(fields)
            .map_err(|e| PersistenceError::invalid_record(format!("{}: {e}", M::COLLECTION)))?;
        let stored = Value::Object(model.to_fields()?);
        Ok((model, stored))
    }

    fn decode(doc: Value) -> Result<M, PersistenceError> {
        serde_json::from_value(doc)
            .map_err(|e| PersistenceError::internal(format!("{}: {e}", M::COLLECTION)))
    }

    /// Compiles `filter` into a `WHERE` clause.
    fn where_clause(builder: &mut SqlBuilder, filter: Option<&DocumentFilter>) -> String {
        match filter {
            Some(filter) if !filter.is_empty() => format!(" WHERE {}", builder.filter(filter)),
            _ => String::new(),
        }
    }

    #[instrument(skip(self, fields), fields(collection = M::COLLECTION))]
    async fn insert(&self, mut fields: FieldMap) -> Result<M, PersistenceError> {
        let id = assign_document_id(&mut fields)?;
        let (model, stored) = Self::accept(fields)?;
        let table = self.table().await?;

        query(&format!(r#"INSERT INTO "{table}" (id, data) VALUES ($1, $2)"#))
            .bind(&id)
            .bind(stored)
            .execute(self.pool())
            .await
            .map_err(Self::failed)?;

        debug!(id = %id, "Document created");
        Ok(model)
    }

    async fn fetch(&self, id: &str) -> Result<Option<M>, PersistenceError> {
        let table = self.table().await?;
        let doc: Option<Value> = query_scalar(&format!(r#"SELECT data FROM "{table}" WHERE id = $1"#))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(Self::failed)?;
        doc.map(Self::decode).transpose()
    }

    /// Read-modify-write under a row lock.
    #[instrument(skip(self, changes), fields(collection = M::COLLECTION))]
    async fn modify(&self, id: &str, changes: &FieldMap) -> Result<Option<M>, PersistenceError> {
        let table = self.table().await?;
        let mut tx = self.pool().begin().await.map_err(Self::failed)?;

        let current: Option<Value> =
            query_scalar(&format!(r#"SELECT data FROM "{table}" WHERE id = $1 FOR UPDATE"#))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Self::failed)?;
        let Some(Value::Object(mut doc)) = current else {
            return Ok(None);
        };

        apply_set(&mut doc, changes)?;
        let (model, stored) = Self::accept(doc)?;

        query(&format!(
            r#"UPDATE "{table}" SET data = $2, updated_at = NOW() WHERE id = $1"#
        ))
        .bind(id)
        .bind(stored)
        .execute(&mut *tx)
        .await
        .map_err(Self::failed)?;
        tx.commit().await.map_err(Self::failed)?;

        Ok(Some(model))
    }

    async fn remove(&self, id: &str) -> Result<bool, PersistenceError> {
        let table = self.table().await?;
        let result = query(&format!(r#"DELETE FROM "{table}" WHERE id = $1"#))
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(Self::failed)?;
        Ok(result.rows_affected() > 0)
    }

    /// Loads matching documents in the requested order.
    async fn select(
        &self,
        filter: Option<&DocumentFilter>,
        sort: &[SortKey],
        page: Page,
    ) -> Result<Vec<Value>, PersistenceError> {
        let table = self.table().await?;
        let mut builder = SqlBuilder::new();
        let predicate = Self::where_clause(&mut builder, filter);
        let order = builder.order_by(sort);
        let offset = builder.push(SqlParam::Int(page.offset_i64()));
        let limit = builder.push(SqlParam::Int(page.limit_i64()));
        let sql = format!(
            r#"SELECT data FROM "{table}"{predicate} ORDER BY {order} OFFSET {offset} LIMIT {limit}"#
        );

        bind_scalar(query_scalar(&sql), builder.into_params())
            .fetch_all(self.pool())
            .await
            .map_err(Self::failed)
    }

    async fn count_matching(&self, filter: Option<&DocumentFilter>) -> Result<u64, PersistenceError> {
        let table = self.table().await?;
        let mut builder = SqlBuilder::new();
        let predicate = Self::where_clause(&mut builder, filter);
        let sql = format!(r#"SELECT COUNT(*) FROM "{table}"{predicate}"#);

        let count: i64 = bind_scalar(query_scalar(&sql), builder.into_params())
            .fetch_one(self.pool())
            .await
            .map_err(Self::failed)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn run_pipeline(&self, pipeline: &Pipeline) -> Result<Vec<Value>, PersistenceError> {
        let (leading, rest) = pipeline.split_leading_match();
        let docs = self.select(leading, &[], Page::unbounded()).await?;
        rest.run(docs)
    }
}

#[async_trait]
impl<M: Document> DocumentRepository<M> for PgDocumentRepository<M> {
    async fn create(&self, fields: FieldMap) -> Result<M, PersistenceError> {
        self.insert(fields).await.observe(BACKEND_NAME, "create")
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<M>, PersistenceError> {
        self.fetch(id).await.observe(BACKEND_NAME, "get_by_id")
    }

    async fn update(&self, id: &str, fields: FieldMap) -> Result<Option<M>, PersistenceError> {
        self.modify(id, &fields).await.observe(BACKEND_NAME, "update")
    }

    async fn delete(&self, id: &str) -> Result<bool, PersistenceError> {
        self.remove(id).await.observe(BACKEND_NAME, "delete")
    }

    async fn find_one(&self, filter: &DocumentFilter) -> Result<Option<M>, PersistenceError> {
        self.select(Some(filter), &[], Page::new(0, 1))
            .await
            .and_then(|docs| docs.into_iter().next().map(Self::decode).transpose())
            .observe(BACKEND_NAME, "find_one")
    }

    async fn find_many(
        &self,
        filter: &DocumentFilter,
        page: Page,
        sort: &[SortKey],
    ) -> Result<Vec<M>, PersistenceError> {
        self.select(Some(filter), sort, page)
            .await
            .and_then(|docs| docs.into_iter().map(Self::decode).collect())
            .observe(BACKEND_NAME, "find_many")
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Value>, PersistenceError> {
        self.run_pipeline(pipeline)
            .await
            .observe(BACKEND_NAME, "aggregate")
    }

    async fn count(&self, filter: Option<&DocumentFilter>) -> Result<u64, PersistenceError> {
        self.count_matching(filter).await.observe(BACKEND_NAME, "count")
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}
