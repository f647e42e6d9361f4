//! On-demand tables for document collections.
//!
//! Every collection is stored in its own `doc_<collection>` table holding the
//! document body as JSONB next to its `_id`. Tables are created the first
//! time a repository touches the collection.

use std::sync::Arc;

use dashmap::DashSet;
use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument, warn};

use crate::error::{PostgresError, Result};

/// Creates and remembers the tables backing document collections.
#[derive(Debug, Clone)]
pub struct CollectionManager {
    pool: PgPool,
    /// Tables verified to exist in this process.
    ensured: Arc<DashSet<String>>,
}

impl CollectionManager {
    /// Creates a new manager on `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ensured: Arc::new(DashSet::new()),
        }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Maps a collection name to its table name.
    ///
    /// # Errors
    ///
    /// Collection names must be non-empty lowercase ASCII letters, digits or
    /// underscores, starting with a letter.
    pub fn table_name(collection: &str) -> Result<String> {
        let valid = collection
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
            && collection
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            && collection.len() <= 48;
        if !valid {
            return Err(PostgresError::schema(format!(
                "invalid collection name '{collection}'"
            )));
        }
        Ok(format!("doc_{collection}"))
    }

    /// Ensures the table for `collection` exists and returns its name.
    ///
    /// Idempotent; after the first call per process it does not touch the
    /// database.
    #[instrument(skip(self))]
    pub async fn ensure_collection(&self, collection: &str) -> Result<String> {
        let table = Self::table_name(collection)?;

        if self.ensured.contains(&table) {
            return Ok(table);
        }

        if self.table_exists(&table).await? {
            debug!(table = %table, "Collection table exists, adding to cache");
            self.ensured.insert(table.clone());
            return Ok(table);
        }

        info!(table = %table, "Creating collection table");
        if let Err(e) = self.create_collection_table(&table).await {
            // A concurrent creator may have won the race.
            if !self.table_exists(&table).await? {
                return Err(e);
            }
            warn!(table = %table, error = %e, "Collection table created concurrently");
        }

        self.ensured.insert(table.clone());
        Ok(table)
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let row: Option<(bool,)> = sqlx_core::query_as::query_as(
            "SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some_and(|(exists,)| exists))
    }

    async fn create_collection_table(&self, table: &str) -> Result<()> {
        let create = format!(
            r#"CREATE TABLE IF NOT EXISTS "{table}" (
                id TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#
        );
        let index = format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{table}_data" ON "{table}" USING GIN (data jsonb_path_ops)"#
        );

        let mut tx = self.pool.begin().await?;
        sqlx_core::query::query(&create).execute(&mut *tx).await?;
        sqlx_core::query::query(&index).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Clears the cache of ensured tables.
    pub fn clear_cache(&self) {
        self.ensured.clear();
    }

    /// Returns the number of ensured tables.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.ensured.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name() {
        assert_eq!(CollectionManager::table_name("bins").unwrap(), "doc_bins");
        assert_eq!(
            CollectionManager::table_name("sensor_readings").unwrap(),
            "doc_sensor_readings"
        );
    }

    #[test]
    fn test_table_name_rejects_unsafe_names() {
        for name in ["", "Bins", "1bins", "bins;drop", "bins\"x", "bins-1"] {
            assert!(
                CollectionManager::table_name(name).is_err(),
                "accepted '{name}'"
            );
        }
    }
}
