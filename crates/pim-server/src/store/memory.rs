//! Reference in-memory implementation of [`super::Store`] (§10.6): used by
//! the scenario tests and suitable as a starting point for experimentation,
//! not a stand-in for the production ORM this workspace deliberately leaves
//! out of scope.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use pim_model::{
    Collection, CollectionId, Gid, ItemId, PimItem, Relation, RelationId, RemoteId, ResourceId,
    Tag, TagId,
};

use super::{RawCollectionStats, Store, StoreError};

#[derive(Default)]
struct Inner {
    collections: HashMap<CollectionId, Collection>,
    items: HashMap<ItemId, PimItem>,
    tags: HashMap<TagId, Tag>,
    relations: HashMap<RelationId, Relation>,
    virtual_links: HashMap<CollectionId, BTreeSet<ItemId>>,
    next_collection_id: i64,
    next_item_id: i64,
    next_tag_id: i64,
    next_relation_id: i64,
}

impl Inner {
    fn fresh_collection_id(&mut self) -> CollectionId {
        self.next_collection_id += 1;
        CollectionId(self.next_collection_id)
    }
    fn fresh_item_id(&mut self) -> ItemId {
        self.next_item_id += 1;
        ItemId(self.next_item_id)
    }
    fn fresh_tag_id(&mut self) -> TagId {
        self.next_tag_id += 1;
        TagId(self.next_tag_id)
    }
    fn fresh_relation_id(&mut self) -> RelationId {
        self.next_relation_id += 1;
        RelationId(self.next_relation_id)
    }
}

/// An in-memory [`Store`] guarded by a single lock. Good enough for tests
/// and small deployments; a real deployment swaps this for a SQL-backed
/// implementation behind the same trait (§10.6).
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a collection with a caller-chosen id, used by tests that need
    /// specific ids to reproduce ordering edge cases (§8 scenario 5).
    pub fn seed_collection(&self, collection: Collection) {
        let mut inner = self.inner.lock();
        if collection.id.get() >= inner.next_collection_id {
            inner.next_collection_id = collection.id.get();
        }
        inner.collections.insert(collection.id, collection);
    }

    pub fn seed_item(&self, item: PimItem) {
        let mut inner = self.inner.lock();
        if item.id.get() >= inner.next_item_id {
            inner.next_item_id = item.id.get();
        }
        inner.items.insert(item.id, item);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn collections_ordered_by_id(&self) -> Result<Vec<Collection>, StoreError> {
        let inner = self.inner.lock();
        let mut all: Vec<Collection> = inner.collections.values().cloned().collect();
        all.sort_by_key(|c| c.id.get());
        Ok(all)
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>, StoreError> {
        Ok(self.inner.lock().collections.get(&id).cloned())
    }

    async fn find_collection_by_remote_id(
        &self,
        resource: &ResourceId,
        remote_id: &RemoteId,
    ) -> Result<Option<Collection>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .collections
            .values()
            .find(|c| &c.resource == resource && &c.remote_id == remote_id)
            .cloned())
    }

    async fn insert_collection(&self, mut collection: Collection) -> Result<CollectionId, StoreError> {
        let mut inner = self.inner.lock();
        if collection.id.get() == 0 {
            collection.id = inner.fresh_collection_id();
        } else if collection.id.get() >= inner.next_collection_id {
            inner.next_collection_id = collection.id.get();
        }
        let id = collection.id;
        inner.collections.insert(id, collection);
        Ok(id)
    }

    async fn update_collection(&self, collection: Collection) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.collections.contains_key(&collection.id) {
            return Err(StoreError::NotFound(format!("collection {}", collection.id)));
        }
        inner.collections.insert(collection.id, collection);
        Ok(())
    }

    async fn move_collection(&self, id: CollectionId, new_parent: CollectionId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let col = inner
            .collections
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("collection {id}")))?;
        col.parent_id = Some(new_parent);
        Ok(())
    }

    async fn remove_collection(&self, id: CollectionId) -> Result<Option<Collection>, StoreError> {
        let mut inner = self.inner.lock();
        let removed = inner.collections.remove(&id);
        if removed.is_some() {
            let child_ids: Vec<ItemId> = inner
                .items
                .values()
                .filter(|i| i.parent_collection == id)
                .map(|i| i.id)
                .collect();
            for item_id in child_ids {
                inner.items.remove(&item_id);
            }
            inner.virtual_links.remove(&id);
        }
        Ok(removed)
    }

    async fn children_of(&self, id: CollectionId) -> Result<Vec<CollectionId>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .collections
            .values()
            .filter(|c| c.parent_id == Some(id))
            .map(|c| c.id)
            .collect())
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<PimItem>, StoreError> {
        Ok(self.inner.lock().items.get(&id).cloned())
    }

    async fn items_in_collection(&self, collection: CollectionId) -> Result<Vec<PimItem>, StoreError> {
        let inner = self.inner.lock();
        let mut items: Vec<PimItem> = inner
            .items
            .values()
            .filter(|i| i.parent_collection == collection)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.id.get().cmp(&a.id.get()));
        Ok(items)
    }

    async fn find_item_by_remote_id(
        &self,
        resource: &ResourceId,
        remote_id: &RemoteId,
    ) -> Result<Option<PimItem>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .items
            .values()
            .find(|i| &i.resource == resource && &i.remote_id == remote_id)
            .cloned())
    }

    async fn find_item_by_gid(&self, gid: &Gid) -> Result<Option<PimItem>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.items.values().find(|i| i.gid.as_ref() == Some(gid)).cloned())
    }

    async fn insert_item(&self, mut item: PimItem) -> Result<ItemId, StoreError> {
        let mut inner = self.inner.lock();
        if item.id.get() == 0 {
            item.id = inner.fresh_item_id();
        } else if item.id.get() >= inner.next_item_id {
            inner.next_item_id = item.id.get();
        }
        let id = item.id;
        inner.items.insert(id, item);
        Ok(id)
    }

    async fn update_item(&self, item: PimItem) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.items.contains_key(&item.id) {
            return Err(StoreError::NotFound(format!("item {}", item.id)));
        }
        inner.items.insert(item.id, item);
        Ok(())
    }

    async fn remove_item(&self, id: ItemId) -> Result<Option<PimItem>, StoreError> {
        let mut inner = self.inner.lock();
        let removed = inner.items.remove(&id);
        for links in inner.virtual_links.values_mut() {
            links.remove(&id);
        }
        Ok(removed)
    }

    async fn get_tag(&self, id: TagId) -> Result<Option<Tag>, StoreError> {
        Ok(self.inner.lock().tags.get(&id).cloned())
    }

    async fn find_tag_by_gid(&self, gid: &Gid) -> Result<Option<Tag>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.tags.values().find(|t| &t.gid == gid).cloned())
    }

    async fn tags_all(&self) -> Result<Vec<Tag>, StoreError> {
        let inner = self.inner.lock();
        let mut tags: Vec<Tag> = inner.tags.values().cloned().collect();
        tags.sort_by_key(|t| t.id.get());
        Ok(tags)
    }

    async fn insert_tag(&self, mut tag: Tag) -> Result<TagId, StoreError> {
        let mut inner = self.inner.lock();
        if tag.id.get() == 0 {
            tag.id = inner.fresh_tag_id();
        } else if tag.id.get() >= inner.next_tag_id {
            inner.next_tag_id = tag.id.get();
        }
        let id = tag.id;
        inner.tags.insert(id, tag);
        Ok(id)
    }

    async fn update_tag(&self, tag: Tag) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.tags.contains_key(&tag.id) {
            return Err(StoreError::NotFound(format!("tag {}", tag.id)));
        }
        inner.tags.insert(tag.id, tag);
        Ok(())
    }

    async fn remove_tag(&self, id: TagId) -> Result<Option<Tag>, StoreError> {
        Ok(self.inner.lock().tags.remove(&id))
    }

    async fn insert_relation(&self, mut relation: Relation) -> Result<RelationId, StoreError> {
        let mut inner = self.inner.lock();
        if relation.id.get() == 0 {
            relation.id = inner.fresh_relation_id();
        }
        let id = relation.id;
        inner.relations.insert(id, relation);
        Ok(id)
    }

    async fn remove_relation(&self, id: RelationId) -> Result<Option<Relation>, StoreError> {
        Ok(self.inner.lock().relations.remove(&id))
    }

    async fn relations_for_item(&self, id: ItemId) -> Result<Vec<Relation>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .relations
            .values()
            .filter(|r| r.left == id || r.right == id)
            .cloned()
            .collect())
    }

    async fn link_item(&self, collection: CollectionId, item: ItemId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.virtual_links.entry(collection).or_default().insert(item);
        Ok(())
    }

    async fn unlink_item(&self, collection: CollectionId, item: ItemId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(links) = inner.virtual_links.get_mut(&collection) {
            links.remove(&item);
        }
        Ok(())
    }

    async fn virtual_links_for_collection(&self, collection: CollectionId) -> Result<Vec<ItemId>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .virtual_links
            .get(&collection)
            .map(|links| links.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn raw_collection_stats(&self, collection: CollectionId) -> Result<RawCollectionStats, StoreError> {
        let inner = self.inner.lock();
        let is_virtual = inner
            .collections
            .get(&collection)
            .map(|c| c.virtual_)
            .unwrap_or(false);

        let item_ids: Vec<ItemId> = if is_virtual {
            inner
                .virtual_links
                .get(&collection)
                .map(|links| links.iter().copied().collect())
                .unwrap_or_default()
        } else {
            inner
                .items
                .values()
                .filter(|i| i.parent_collection == collection)
                .map(|i| i.id)
                .collect()
        };

        let mut stats = RawCollectionStats::default();
        for id in item_ids {
            if let Some(item) = inner.items.get(&id) {
                stats.count += 1;
                stats.size += item.size;
                if item.flags.contains("\\Seen") || item.flags.contains("\\Ignored") {
                    stats.read += 1;
                }
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pim_model::{CachePolicy, ViewPreferences};
    use std::time::SystemTime;

    fn sample_collection(id: i64, parent: Option<i64>) -> Collection {
        Collection {
            id: CollectionId(id),
            parent_id: parent.map(CollectionId),
            resource: ResourceId("res0".into()),
            name: format!("col{id}"),
            remote_id: RemoteId::default(),
            remote_revision: None,
            content_mime_types: Default::default(),
            cache_policy: CachePolicy::default(),
            virtual_: false,
            query: None,
            enabled: true,
            view_preferences: ViewPreferences::default(),
            attributes: Default::default(),
        }
    }

    fn sample_item(id: i64, parent: i64, flags: &[&str]) -> PimItem {
        PimItem {
            id: ItemId(id),
            parent_collection: CollectionId(parent),
            resource: ResourceId("res0".into()),
            remote_id: RemoteId(format!("rid{id}")),
            remote_revision: None,
            mime_type: "message/rfc822".into(),
            revision: 0,
            gid: None,
            size: 10,
            mtime: SystemTime::UNIX_EPOCH,
            atime: None,
            flags: flags.iter().map(|s| s.to_string()).collect(),
            tags: Default::default(),
            parts: Vec::new(),
        }
    }

    #[tokio::test]
    async fn raw_stats_counts_read_once_for_items_with_both_flags() {
        let store = MemoryStore::new();
        store.seed_collection(sample_collection(5, None));
        store.seed_item(sample_item(1, 5, &["\\Seen", "\\Ignored"]));
        store.seed_item(sample_item(2, 5, &[]));

        let stats = store.raw_collection_stats(CollectionId(5)).await.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.read, 1);
        assert_eq!(stats.size, 20);
    }

    #[tokio::test]
    async fn insert_item_assigns_fresh_id_when_zero() {
        let store = MemoryStore::new();
        let id = store.insert_item(sample_item(0, 1, &[])).await.unwrap();
        assert_eq!(id, ItemId(1));
        let id2 = store.insert_item(sample_item(0, 1, &[])).await.unwrap();
        assert_eq!(id2, ItemId(2));
    }
}
