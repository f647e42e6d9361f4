//! Repository traits implemented by every storage backend.

use async_trait::async_trait;
use serde_json::Value;

use binsight_core::{Document, FieldMap, Record, RecordId};

use crate::error::PersistenceError;
use crate::filter::DocumentFilter;
use crate::pipeline::Pipeline;
use crate::types::{Page, SortKey};

/// CRUD over the rows of one relational table.
///
/// Not-found outcomes are `Ok(None)`/`Ok(false)`; an `Err` always means the
/// call was rejected or the backend failed, so "confirmed empty" and
/// "could not tell" stay distinguishable.
///
/// # Example
///
/// ```ignore
/// use binsight_core::{field_map, models::User};
/// use binsight_storage::{Page, RelationalRepository};
///
/// async fn admins(users: &dyn RelationalRepository<User>) -> Result<Vec<User>, PersistenceError> {
///     let filters = field_map(serde_json::json!({"role": "admin"}))?;
///     users.get_many(Page::default(), &filters).await
/// }
/// ```
#[async_trait]
pub trait RelationalRepository<M: Record>: Send + Sync {
    /// Inserts a row and returns it with its generated `id`.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::InvalidRecord` if `fields` contains `id` or
    /// unknown columns, `Conflict` on a duplicate unique column and
    /// `ConstraintViolation` for missing required columns or broken references.
    /// Nothing is written when an error is returned.
    async fn create(&self, fields: FieldMap) -> Result<M, PersistenceError>;

    /// Reads a row by primary key.
    async fn get_by_id(&self, id: RecordId) -> Result<Option<M>, PersistenceError>;

    /// Lists rows ordered by `id`, filtered by exact column matches.
    ///
    /// A `null` filter value matches SQL `NULL`. Keys that are not columns of
    /// `M` are ignored.
    async fn get_many(&self, page: Page, filters: &FieldMap) -> Result<Vec<M>, PersistenceError>;

    /// Updates the supplied columns of a row and returns the updated row.
    ///
    /// Returns `None` if no row has this `id`. An empty `fields` map returns
    /// the current row unchanged.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::InvalidRecord` if `fields` contains `id` or
    /// unknown columns, and constraint errors as for [`create`](Self::create).
    async fn update(&self, id: RecordId, fields: FieldMap) -> Result<Option<M>, PersistenceError>;

    /// Deletes a row. Returns `true` if a row was removed.
    async fn delete(&self, id: RecordId) -> Result<bool, PersistenceError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// CRUD, queries and aggregation over one document collection.
#[async_trait]
pub trait DocumentRepository<M: Document>: Send + Sync {
    /// Inserts a document. `_id` is taken from `fields` or generated.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Conflict` if the `_id` already exists and
    /// `InvalidRecord` for a non-string `_id` or a payload `M` cannot decode.
    async fn create(&self, fields: FieldMap) -> Result<M, PersistenceError>;

    /// Reads a document by `_id`.
    async fn get_by_id(&self, id: &str) -> Result<Option<M>, PersistenceError>;

    /// Applies `$set` changes (dotted paths allowed) and returns the result.
    ///
    /// The read-modify-write is atomic per document. Returns `None` if no
    /// document has this `_id`.
    async fn update(&self, id: &str, fields: FieldMap) -> Result<Option<M>, PersistenceError>;

    /// Deletes a document. Returns `true` if a document was removed.
    async fn delete(&self, id: &str) -> Result<bool, PersistenceError>;

    /// Returns the first matching document in `_id` order.
    async fn find_one(&self, filter: &DocumentFilter) -> Result<Option<M>, PersistenceError>;

    /// Returns matching documents sorted by `sort` (ties by `_id`), then paged.
    async fn find_many(
        &self,
        filter: &DocumentFilter,
        page: Page,
        sort: &[SortKey],
    ) -> Result<Vec<M>, PersistenceError>;

    /// Runs an aggregation pipeline over the collection.
    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Value>, PersistenceError>;

    /// Counts matching documents. `None` counts the whole collection.
    async fn count(&self, filter: Option<&DocumentFilter>) -> Result<u64, PersistenceError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;

    /// Returns the collection this repository is bound to.
    fn collection(&self) -> &'static str {
        M::COLLECTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binsight_core::models::{Bin, User};

    // Compile-time test that RelationalRepository is object-safe
    fn _assert_relational_object_safe(_: &dyn RelationalRepository<User>) {}

    // Compile-time test that DocumentRepository is object-safe
    fn _assert_document_object_safe(_: &dyn DocumentRepository<Bin>) {}
}
