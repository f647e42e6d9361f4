//! Builds every store client once and hands out repositories.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use binsight_cache::{
    CacheBackend, CacheConfig, CacheService, RateLimitPolicy, create_cache_backend,
};
use binsight_core::models::{
    AlertLog, Bin, BinAnalytics, Collection, CollectionRoute, DetectionRecord, SensorReading,
    SystemMetric, User,
};
use binsight_core::{Document, Record};
use binsight_db_memory::MemoryStore;
use binsight_db_postgres::{PostgresError, PostgresStore};
use binsight_storage::{DynDocuments, DynRelational};

use crate::config::{AppConfig, DocumentBackend};
use crate::status::StatusReader;

/// One storage backend, shared by every repository built from it.
#[derive(Debug, Clone)]
pub enum Store {
    Postgres(PostgresStore),
    Memory(Arc<MemoryStore>),
}

impl Store {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => binsight_db_postgres::BACKEND_NAME,
            Self::Memory(_) => binsight_db_memory::BACKEND_NAME,
        }
    }

    pub fn relational<M: Record>(&self) -> DynRelational<M> {
        match self {
            Self::Postgres(store) => store.relational::<M>(),
            Self::Memory(store) => store.relational::<M>(),
        }
    }

    pub fn documents<M: Document>(&self) -> DynDocuments<M> {
        match self {
            Self::Postgres(store) => store.documents::<M>(),
            Self::Memory(store) => store.documents::<M>(),
        }
    }

    /// Returns an error if the backend does not answer.
    pub async fn ping(&self) -> Result<(), PostgresError> {
        match self {
            Self::Postgres(store) => store.ping().await,
            Self::Memory(_) => Ok(()),
        }
    }
}

/// Reachability of each store, as reported by [`DataLayer::health`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub relational: bool,
    pub documents: bool,
    pub cache_mode: &'static str,
    pub cache_available: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.relational && self.documents
    }
}

/// Relational store, document store, cache overlay and rate-limit policy.
#[derive(Debug, Clone)]
pub struct DataLayer {
    relational: Store,
    documents: Store,
    cache: CacheService,
    rate_limit: RateLimitPolicy,
}

impl DataLayer {
    /// Connects to PostgreSQL (running migrations when configured), picks the
    /// document backend and the cache backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the PostgreSQL pool cannot be created or a
    /// migration fails. An unreachable Redis falls back to the local cache.
    #[instrument(skip_all, fields(documents = ?config.documents.backend))]
    pub async fn connect(config: &AppConfig) -> Result<Self, PostgresError> {
        let postgres = PostgresStore::connect(&config.postgres).await?;
        let relational = Store::Postgres(postgres.clone());
        let documents = match config.documents.backend {
            DocumentBackend::Postgres => Store::Postgres(postgres),
            DocumentBackend::Memory => {
                warn!("Document collections are held in memory and lost on exit");
                Store::Memory(Arc::new(MemoryStore::new()))
            }
        };

        let backend = create_cache_backend(&config.redis).await;
        info!(cache = backend.mode(), "Data layer ready");

        Ok(Self::from_parts(
            relational,
            documents,
            CacheService::new(backend, config.cache.clone()),
            RateLimitPolicy::from_config(&config.rate_limit),
        ))
    }

    /// A data layer held entirely in process memory.
    pub fn in_memory(cache: CacheConfig) -> Self {
        let store = Store::Memory(Arc::new(MemoryStore::new()));
        Self::from_parts(
            store.clone(),
            store,
            CacheService::new(CacheBackend::new_local(), cache),
            RateLimitPolicy::from_config(&Default::default()),
        )
    }

    pub fn from_parts(
        relational: Store,
        documents: Store,
        cache: CacheService,
        rate_limit: RateLimitPolicy,
    ) -> Self {
        Self {
            relational,
            documents,
            cache,
            rate_limit,
        }
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn rate_limit(&self) -> &RateLimitPolicy {
        &self.rate_limit
    }

    pub fn relational<M: Record>(&self) -> DynRelational<M> {
        self.relational.relational::<M>()
    }

    pub fn documents<M: Document>(&self) -> DynDocuments<M> {
        self.documents.documents::<M>()
    }

    pub fn users(&self) -> DynRelational<User> {
        self.relational()
    }

    pub fn bin_analytics(&self) -> DynRelational<BinAnalytics> {
        self.relational()
    }

    pub fn collections(&self) -> DynRelational<Collection> {
        self.relational()
    }

    pub fn collection_routes(&self) -> DynRelational<CollectionRoute> {
        self.relational()
    }

    pub fn system_metrics(&self) -> DynRelational<SystemMetric> {
        self.relational()
    }

    pub fn alert_logs(&self) -> DynRelational<AlertLog> {
        self.relational()
    }

    pub fn bins(&self) -> DynDocuments<Bin> {
        self.documents()
    }

    pub fn detections(&self) -> DynDocuments<DetectionRecord> {
        self.documents()
    }

    pub fn sensor_readings(&self) -> DynDocuments<SensorReading> {
        self.documents()
    }

    pub fn status_reader(&self) -> StatusReader {
        StatusReader::new(self.bins(), self.cache.clone())
    }

    /// Pings every store. Failures are logged, never returned.
    pub async fn health(&self) -> HealthReport {
        let relational = match self.relational.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(backend = self.relational.name(), error = %e, "Relational store unreachable");
                false
            }
        };
        let documents = match self.documents.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(backend = self.documents.name(), error = %e, "Document store unreachable");
                false
            }
        };
        HealthReport {
            relational,
            documents,
            cache_mode: self.cache.backend().mode(),
            cache_available: self.cache.is_backend_available().await,
        }
    }

    /// Closes pooled database connections.
    pub async fn close(&self) {
        if let Store::Postgres(store) = &self.relational {
            store.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binsight_core::field_map;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_layer_is_healthy() {
        let layer = DataLayer::in_memory(CacheConfig::default());
        let health = layer.health().await;
        assert!(health.is_healthy());
        assert_eq!(health.cache_mode, "local");
        assert!(health.cache_available);
    }

    #[tokio::test]
    async fn test_repositories_share_the_store() {
        let layer = DataLayer::in_memory(CacheConfig::default());
        let created = layer
            .users()
            .create(
                field_map(json!({
                    "username": "ops",
                    "email": "ops@example.com",
                    "password_hash": "x",
                    "role": "operator"
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        assert!(layer.users().get_by_id(created.id).await.unwrap().is_some());
        assert_eq!(layer.bins().backend_name(), "memory");
    }
}
