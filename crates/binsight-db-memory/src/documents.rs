//! In-memory document collections.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use binsight_core::{Document, FieldMap};
use binsight_storage::validate::{apply_set, assign_document_id};
use binsight_storage::{
    DocumentFilter, DocumentRepository, ObserveExt, Page, PersistenceError, Pipeline, SortKey,
    sort_documents,
};

use crate::BACKEND_NAME;

/// Documents of one collection keyed by `_id`.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    docs: DashMap<String, FieldMap>,
}

impl MemoryCollection {
    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Returns true if the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Copies every document, ordered by `_id`.
    fn snapshot(&self) -> Vec<Value> {
        let mut docs: Vec<(String, Value)> = self
            .docs
            .iter()
            .map(|e| (e.key().clone(), Value::Object(e.value().clone())))
            .collect();
        docs.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        docs.into_iter().map(|(_, doc)| doc).collect()
    }
}

/// [`DocumentRepository`] over a [`MemoryCollection`].
///
/// Updates hold the document's shard lock for the whole read-modify-write.
pub struct MemoryDocumentRepository<M: Document> {
    collection: Arc<MemoryCollection>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Document> MemoryDocumentRepository<M> {
    /// Creates a repository over `collection`.
    pub fn new(collection: Arc<MemoryCollection>) -> Self {
        Self {
            collection,
            _model: PhantomData,
        }
    }

    /// Decodes a caller-supplied document and returns it with its stored form.
    fn accept(fields: FieldMap) -> Result<(M, FieldMap), PersistenceError> {
        let model = M::from_fields(fields)
            .map_err(|e| PersistenceError::invalid_record(format!("{}: {e}", M::COLLECTION)))?;
        let stored = model.to_fields()?;
        Ok((model, stored))
    }

    fn decode(doc: Value) -> Result<M, PersistenceError> {
        serde_json::from_value(doc)
            .map_err(|e| PersistenceError::internal(format!("{}: {e}", M::COLLECTION)))
    }

    fn insert(&self, mut fields: FieldMap) -> Result<M, PersistenceError> {
        let id = assign_document_id(&mut fields)?;
        let (model, stored) = Self::accept(fields)?;
        match self.collection.docs.entry(id) {
            Entry::Occupied(entry) => Err(PersistenceError::conflict(
                M::COLLECTION,
                format!("duplicate _id '{}'", entry.key()),
            )),
            Entry::Vacant(entry) => {
                entry.insert(stored);
                Ok(model)
            }
        }
    }

    fn modify(&self, id: &str, changes: &FieldMap) -> Result<Option<M>, PersistenceError> {
        let Some(mut entry) = self.collection.docs.get_mut(id) else {
            return Ok(None);
        };
        let mut candidate = entry.value().clone();
        apply_set(&mut candidate, changes)?;
        let (model, stored) = Self::accept(candidate)?;
        *entry.value_mut() = stored;
        Ok(Some(model))
    }

    fn matching(&self, filter: Option<&DocumentFilter>) -> Vec<Value> {
        let docs = self.collection.snapshot();
        match filter {
            Some(filter) if !filter.is_empty() => {
                docs.into_iter().filter(|d| filter.matches(d)).collect()
            }
            _ => docs,
        }
    }
}

#[async_trait]
impl<M: Document> DocumentRepository<M> for MemoryDocumentRepository<M> {
    async fn create(&self, fields: FieldMap) -> Result<M, PersistenceError> {
        self.insert(fields).observe(BACKEND_NAME, "create")
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<M>, PersistenceError> {
        self.collection
            .docs
            .get(id)
            .map(|doc| Self::decode(Value::Object(doc.value().clone())))
            .transpose()
            .observe(BACKEND_NAME, "get_by_id")
    }

    async fn update(&self, id: &str, fields: FieldMap) -> Result<Option<M>, PersistenceError> {
        self.modify(id, &fields).observe(BACKEND_NAME, "update")
    }

    async fn delete(&self, id: &str) -> Result<bool, PersistenceError> {
        Ok(self.collection.docs.remove(id).is_some())
    }

    async fn find_one(&self, filter: &DocumentFilter) -> Result<Option<M>, PersistenceError> {
        self.matching(Some(filter))
            .into_iter()
            .next()
            .map(Self::decode)
            .transpose()
            .observe(BACKEND_NAME, "find_one")
    }

    async fn find_many(
        &self,
        filter: &DocumentFilter,
        page: Page,
        sort: &[SortKey],
    ) -> Result<Vec<M>, PersistenceError> {
        let docs = sort_documents(self.matching(Some(filter)), sort, true);
        page.apply(docs)
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<_>, _>>()
            .observe(BACKEND_NAME, "find_many")
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Value>, PersistenceError> {
        pipeline
            .run(self.collection.snapshot())
            .observe(BACKEND_NAME, "aggregate")
    }

    async fn count(&self, filter: Option<&DocumentFilter>) -> Result<u64, PersistenceError> {
        Ok(self.matching(filter).len() as u64)
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binsight_core::field_map;
    use binsight_core::models::Bin;
    use serde_json::json;

    fn bins() -> MemoryDocumentRepository<Bin> {
        MemoryDocumentRepository::new(Arc::new(MemoryCollection::default()))
    }

    fn bin(id: &str, level: u8) -> FieldMap {
        field_map(json!({
            "_id": id,
            "bin_id": id,
            "location": {"address": "Main St", "coordinates": [4.9, 52.3]},
            "status": {"fill_level": level}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_generates_id_when_absent() {
        let repo = bins();
        let created = repo
            .create(field_map(json!({"bin_id": "bin-7"})).unwrap())
            .await
            .unwrap();
        assert!(!created.id.is_empty());
        let read = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(read.bin_id, "bin-7");
    }

    #[tokio::test]
    async fn test_duplicate_id_is_conflict() {
        let repo = bins();
        repo.create(bin("b1", 10)).await.unwrap();
        let err = repo.create(bin("b1", 20)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_undecodable_document_is_rejected() {
        let repo = bins();
        let err = repo
            .create(field_map(json!({"_id": "x"})).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
        assert!(repo.collection.is_empty());
    }

    #[tokio::test]
    async fn test_update_dotted_path() {
        let repo = bins();
        repo.create(bin("b1", 10)).await.unwrap();

        let updated = repo
            .update("b1", field_map(json!({"status.fill_level": 95})).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status.fill_level, 95);
        assert_eq!(updated.location.address.as_deref(), Some("Main St"));

        let missing = repo
            .update("nope", field_map(json!({"status.fill_level": 1})).unwrap())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_cannot_change_id() {
        let repo = bins();
        repo.create(bin("b1", 10)).await.unwrap();
        let err = repo
            .update("b1", field_map(json!({"_id": "b2"})).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
        assert!(repo.get_by_id("b1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_find_many_sorts_and_pages() {
        let repo = bins();
        for (id, level) in [("b1", 90), ("b2", 40), ("b3", 90), ("b4", 85)] {
            repo.create(bin(id, level)).await.unwrap();
        }

        let filter = DocumentFilter::parse(&json!({"status.fill_level": {"$gte": 80}})).unwrap();
        let sorted = repo
            .find_many(&filter, Page::default(), &[SortKey::desc("status.fill_level")])
            .await
            .unwrap();
        let ids: Vec<_> = sorted.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b3", "b4"]);

        let second = repo
            .find_many(&filter, Page::new(1, 1), &[SortKey::desc("status.fill_level")])
            .await
            .unwrap();
        assert_eq!(second[0].id, "b3");
    }

    #[tokio::test]
    async fn test_find_one_count_and_aggregate() {
        let repo = bins();
        for (id, level) in [("b2", 90), ("b1", 95), ("b3", 10)] {
            repo.create(bin(id, level)).await.unwrap();
        }

        let critical = DocumentFilter::parse(&json!({"status.fill_level": {"$gt": 80}})).unwrap();
        let first = repo.find_one(&critical).await.unwrap().unwrap();
        assert_eq!(first.id, "b1");

        assert_eq!(repo.count(None).await.unwrap(), 3);
        assert_eq!(repo.count(Some(&critical)).await.unwrap(), 2);
        assert_eq!(repo.count(Some(&DocumentFilter::all())).await.unwrap(), 3);

        let pipeline = Pipeline::parse(&json!([
            {"$group": {"_id": "$location.address", "avg": {"$avg": "$status.fill_level"}}}
        ]))
        .unwrap();
        let out = repo.aggregate(&pipeline).await.unwrap();
        assert_eq!(out, vec![json!({"_id": "Main St", "avg": 65.0})]);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = bins();
        repo.create(bin("b1", 10)).await.unwrap();
        assert!(repo.delete("b1").await.unwrap());
        assert!(!repo.delete("b1").await.unwrap());
    }
}
