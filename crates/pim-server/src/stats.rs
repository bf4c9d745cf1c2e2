//! Collection statistics cache (C10, §4.10): `{count, size, read}` per
//! collection, prefetched in bulk on start and kept warm by incremental
//! updates from the notification collector (C4) rather than a full
//! recomputation on every change.

use std::collections::HashMap;

use parking_lot::Mutex;
use pim_model::CollectionId;

use crate::error::HandlerError;
use crate::store::{RawCollectionStats, Store};

/// `read` counts items bearing either a "seen" or an "ignored" flag, never
/// double-counted for items that carry both (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionStats {
    pub count: u64,
    pub size: u64,
    pub read: u64,
}

impl From<RawCollectionStats> for CollectionStats {
    fn from(raw: RawCollectionStats) -> Self {
        Self { count: raw.count, size: raw.size, read: raw.read }
    }
}

/// §5 "Statistics cache holds a single lock; updates are small and quick."
/// A missing or `None` entry means "invalidated, recompute on next read."
pub struct StatsCache {
    entries: Mutex<HashMap<CollectionId, Option<CollectionStats>>>,
}

impl Default for StatsCache {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.10 "Maintenance": prefetch on start for every known collection.
    pub async fn prefetch(&self, collections: &[CollectionId], store: &dyn Store) -> Result<(), HandlerError> {
        let mut entries = HashMap::with_capacity(collections.len());
        for &id in collections {
            let raw = store.raw_collection_stats(id).await?;
            entries.insert(id, Some(raw.into()));
        }
        *self.entries.lock() = entries;
        Ok(())
    }

    /// Serves from cache, recomputing through the store on a miss or an
    /// invalidated entry.
    pub async fn get(&self, id: CollectionId, store: &dyn Store) -> Result<CollectionStats, HandlerError> {
        if let Some(Some(cached)) = self.entries.lock().get(&id) {
            return Ok(*cached);
        }
        let raw = store.raw_collection_stats(id).await?;
        let stats: CollectionStats = raw.into();
        self.entries.lock().insert(id, Some(stats));
        Ok(stats)
    }

    /// Incremental update on item add: one more item, plus its size, plus a
    /// read increment if it starts out seen/ignored (§4.10 "the notification
    /// collector updates entries incrementally on item add and flag-change").
    pub fn item_added(&self, collection: CollectionId, size: u64, already_read: bool) {
        let mut entries = self.entries.lock();
        if let Some(Some(stats)) = entries.get_mut(&collection) {
            stats.count += 1;
            stats.size += size;
            if already_read {
                stats.read += 1;
            }
        }
    }

    /// Incremental update on item removal.
    pub fn item_removed(&self, collection: CollectionId, size: u64, was_read: bool) {
        let mut entries = self.entries.lock();
        if let Some(Some(stats)) = entries.get_mut(&collection) {
            stats.count = stats.count.saturating_sub(1);
            stats.size = stats.size.saturating_sub(size);
            if was_read {
                stats.read = stats.read.saturating_sub(1);
            }
        }
    }

    /// Incremental update when an item's seen/ignored status flips without a
    /// size or count change.
    pub fn read_delta(&self, collection: CollectionId, became_read: bool) {
        let mut entries = self.entries.lock();
        if let Some(Some(stats)) = entries.get_mut(&collection) {
            if became_read {
                stats.read += 1;
            } else {
                stats.read = stats.read.saturating_sub(1);
            }
        }
    }

    /// Forces the next read to recompute from the store (§4.10 "all other
    /// changes, including enablement, invalidate the affected entry").
    pub fn invalidate(&self, collection: CollectionId) {
        self.entries.lock().insert(collection, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pim_model::CollectionId;

    #[tokio::test]
    async fn prefetch_then_incremental_add_avoids_recompute() {
        let store = MemoryStore::new();
        let cache = StatsCache::new();
        cache.prefetch(&[CollectionId(1)], &store).await.unwrap();
        cache.item_added(CollectionId(1), 100, false);
        let stats = cache.get(CollectionId(1), &store).await.unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.size, 100);
        assert_eq!(stats.read, 0);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute_on_next_get() {
        let store = MemoryStore::new();
        let cache = StatsCache::new();
        cache.prefetch(&[CollectionId(1)], &store).await.unwrap();
        cache.invalidate(CollectionId(1));
        let stats = cache.get(CollectionId(1), &store).await.unwrap();
        assert_eq!(stats.count, 0);
    }
}
