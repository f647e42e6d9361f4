//! Read-through bin status lookups.

use serde_json::json;
use tracing::debug;

use binsight_cache::CacheService;
use binsight_core::models::{Bin, BinStatusSnapshot};
use binsight_storage::{DocumentFilter, DynDocuments, StorageResult};

/// Serves bin status from the cache, falling back to the `bins` collection.
#[derive(Clone)]
pub struct StatusReader {
    bins: DynDocuments<Bin>,
    cache: CacheService,
}

impl StatusReader {
    pub fn new(bins: DynDocuments<Bin>, cache: CacheService) -> Self {
        Self { bins, cache }
    }

    /// Returns the status of `bin_id`, or `None` if no such bin exists.
    ///
    /// A cache miss loads the bin document and caches its snapshot. Cache
    /// failures only cost the lookup its shortcut.
    ///
    /// # Errors
    ///
    /// Returns the document store's error when the bin cannot be loaded.
    pub async fn bin_status(&self, bin_id: &str) -> StorageResult<Option<BinStatusSnapshot>> {
        if let Some(cached) = self.cache.get_cached_status::<BinStatusSnapshot>(bin_id).await {
            return Ok(Some(cached));
        }

        let filter = DocumentFilter::parse(&json!({ "bin_id": bin_id }))?;
        let Some(bin) = self.bins.find_one(&filter).await? else {
            debug!(bin_id, "Bin not found");
            return Ok(None);
        };

        let snapshot = BinStatusSnapshot::from(&bin);
        self.cache.cache_status(bin_id, &snapshot, None).await;
        Ok(Some(snapshot))
    }

    /// Drops the cached status so the next lookup reloads it.
    pub async fn invalidate(&self, bin_id: &str) {
        self.cache.clear_entity_cache(bin_id).await;
    }

    /// Bins whose cached fill level is above the configured threshold.
    pub async fn critical_bins(&self) -> Vec<String> {
        self.cache.list_critical_entities(None).await
    }
}
