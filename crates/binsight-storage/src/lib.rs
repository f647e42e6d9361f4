//! # binsight-storage
//!
//! Storage abstraction layer for the Binsight data-access layer.
//!
//! This crate defines the repository traits that the relational and document
//! backends implement, the error type they return, and the document query
//! language (filters, sorting, aggregation pipelines). It contains no backend;
//! see `binsight-db-postgres` and `binsight-db-memory`.
//!
//! ## Overview
//!
//! - [`RelationalRepository`]: CRUD over rows of a [`Record`](binsight_core::Record) type.
//! - [`DocumentRepository`]: CRUD, find, aggregate and count over a
//!   [`Document`](binsight_core::Document) collection.
//! - [`DocumentFilter`] and [`Pipeline`]: parsed query values with an
//!   in-process evaluator that backends may use directly or compile from.
//!
//! ## Example
//!
//! ```ignore
//! use binsight_core::models::Bin;
//! use binsight_storage::prelude::*;
//!
//! async fn critical_bins(bins: &dyn DocumentRepository<Bin>) -> StorageResult<Vec<Bin>> {
//!     let filter = DocumentFilter::parse(&serde_json::json!({
//!         "status.fill_level": {"$gt": 80}
//!     }))?;
//!     bins.find_many(&filter, Page::default(), &[SortKey::desc("status.fill_level")])
//!         .await
//! }
//! ```

mod error;
pub mod filter;
pub mod pipeline;
mod traits;
mod types;
pub mod validate;
pub mod value;

pub use error::{ErrorCategory, ObserveExt, PersistenceError, record_failure};
pub use filter::{DocumentFilter, FieldOp};
pub use pipeline::{Pipeline, Stage, sort_documents};
pub use traits::{DocumentRepository, RelationalRepository};
pub use types::{DEFAULT_PAGE_LIMIT, Page, SortDirection, SortKey};

/// Type alias for a repository result.
pub type StorageResult<T> = Result<T, PersistenceError>;

/// Shared handle to a relational repository.
pub type DynRelational<M> = std::sync::Arc<dyn RelationalRepository<M>>;

/// Shared handle to a document repository.
pub type DynDocuments<M> = std::sync::Arc<dyn DocumentRepository<M>>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use binsight_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, PersistenceError};
    pub use crate::filter::DocumentFilter;
    pub use crate::pipeline::Pipeline;
    pub use crate::traits::{DocumentRepository, RelationalRepository};
    pub use crate::types::{Page, SortDirection, SortKey};
    pub use crate::{DynDocuments, DynRelational, StorageResult};
}
