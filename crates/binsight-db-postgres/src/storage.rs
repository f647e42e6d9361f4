//! Entry point tying the pool, migrations and repositories together.

use std::sync::Arc;

use sqlx_postgres::PgPool;
use tracing::info;

use binsight_core::{Document, Record};
use binsight_storage::{DynDocuments, DynRelational};

use crate::config::PostgresConfig;
use crate::documents::PgDocumentRepository;
use crate::error::Result;
use crate::migrations;
use crate::pool;
use crate::relational::PgRelationalRepository;
use crate::schema::CollectionManager;

/// PostgreSQL store serving relational tables and document collections from
/// one pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    collections: CollectionManager,
}

impl PostgresStore {
    /// Connects using `config` and applies migrations when
    /// `config.run_migrations` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or a migration fails.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = pool::create_pool(config).await?;

        if config.run_migrations {
            migrations::run(&pool).await?;
        } else {
            info!("Skipping migrations (run_migrations = false)");
        }

        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool. Migrations are not run.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        let collections = CollectionManager::new(pool.clone());
        Self { pool, collections }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates a relational repository for `M`.
    #[must_use]
    pub fn relational<M: Record>(&self) -> DynRelational<M> {
        Arc::new(PgRelationalRepository::<M>::new(self.pool.clone()))
    }

    /// Creates a document repository for `M`.
    #[must_use]
    pub fn documents<M: Document>(&self) -> DynDocuments<M> {
        Arc::new(PgDocumentRepository::<M>::new(self.collections.clone()))
    }

    /// Checks that the database answers.
    ///
    /// # Errors
    ///
    /// Returns the connection error if the query fails.
    pub async fn ping(&self) -> Result<()> {
        pool::test_connection(&self.pool).await
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
