//! In-memory storage backend for Binsight.
//!
//! This crate implements [`RelationalRepository`] and [`DocumentRepository`]
//! from `binsight-storage` on top of process-local maps. It backs the test
//! suites, local development without PostgreSQL, and serves as the reference
//! behaviour of both contracts.
//!
//! Tables and collections live in a shared [`MemoryStore`], so any number of
//! repositories for the same model see the same data.
//!
//! # Example
//!
//! ```ignore
//! use binsight_core::models::{Bin, User};
//! use binsight_db_memory::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let users = store.relational::<User>();
//! let bins = store.documents::<Bin>();
//! ```

mod documents;
mod relational;

use std::sync::Arc;

use dashmap::DashMap;

use binsight_core::{Document, Record};
use binsight_storage::{DynDocuments, DynRelational};

pub use documents::{MemoryCollection, MemoryDocumentRepository};
pub use relational::{MemoryRelationalRepository, MemoryTable};

/// Backend name reported by the in-memory repositories.
pub const BACKEND_NAME: &str = "memory";

/// Process-local tables and collections.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<&'static str, Arc<MemoryTable>>,
    collections: DashMap<&'static str, Arc<MemoryCollection>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table backing `M`, creating it on first use.
    pub fn table<M: Record>(&self) -> Arc<MemoryTable> {
        self.tables.entry(M::TABLE).or_default().value().clone()
    }

    /// Returns the collection backing `M`, creating it on first use.
    pub fn collection<M: Document>(&self) -> Arc<MemoryCollection> {
        self.collections.entry(M::COLLECTION).or_default().value().clone()
    }

    /// Creates a relational repository for `M`.
    pub fn relational<M: Record>(&self) -> DynRelational<M> {
        Arc::new(MemoryRelationalRepository::<M>::new(self.table::<M>()))
    }

    /// Creates a document repository for `M`.
    pub fn documents<M: Document>(&self) -> DynDocuments<M> {
        Arc::new(MemoryDocumentRepository::<M>::new(self.collection::<M>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binsight_core::field_map;
    use binsight_core::models::{Bin, User};
    use serde_json::json;

    #[tokio::test]
    async fn test_repositories_share_tables() {
        let store = MemoryStore::new();
        let writer = store.relational::<User>();
        let reader = store.relational::<User>();

        let created = writer
            .create(
                field_map(json!({
                    "username": "ana",
                    "email": "ana@example.com",
                    "password_hash": "x"
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        assert!(reader.get_by_id(created.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_collections_are_isolated_by_name() {
        let store = MemoryStore::new();
        store
            .documents::<Bin>()
            .create(field_map(json!({"bin_id": "bin-1"})).unwrap())
            .await
            .unwrap();
        assert_eq!(store.collection::<Bin>().len(), 1);
        assert_eq!(store.collections.len(), 1);
        assert_eq!(store.documents::<Bin>().collection(), "bins");
    }
}
