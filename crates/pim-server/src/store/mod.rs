//! The store boundary. The SQL schema and ORM live outside this crate;
//! persistence is consumed through this narrow async trait instead,
//! object-safe via `async_trait` the same way the rest of this workspace
//! exposes its dynamic service traits.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use pim_model::{Collection, CollectionId, Gid, ItemId, PimItem, Relation, RelationId, RemoteId, ResourceId, Tag, TagId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Raw per-collection aggregate counts, computed fresh from persisted rows
/// (§4.10 "Maintenance": prefetch query groups by collection id). A
/// `pim_server::stats::StatsCache` caches these and invalidates/recomputes
/// through this method rather than the collector tracking them itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawCollectionStats {
    pub count: u64,
    pub read: u64,
    pub size: u64,
}

/// The persistence surface the core consumes (§3 DATA MODEL, §10.6).
///
/// No method here implies a transaction boundary of its own: the session
/// (C6) groups a sequence of calls into one logical operation and the
/// notification collector (C4) is what batches the resulting changes, not
/// the store. A real SQL-backed implementation would wrap each handler
/// invocation in one DB transaction; `MemoryStore` is internally consistent
/// under a single lock instead.
#[async_trait]
pub trait Store: Send + Sync {
    async fn collections_ordered_by_id(&self) -> Result<Vec<Collection>, StoreError>;
    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>, StoreError>;
    async fn find_collection_by_remote_id(
        &self,
        resource: &ResourceId,
        remote_id: &RemoteId,
    ) -> Result<Option<Collection>, StoreError>;
    async fn insert_collection(&self, collection: Collection) -> Result<CollectionId, StoreError>;
    async fn update_collection(&self, collection: Collection) -> Result<(), StoreError>;
    async fn move_collection(&self, id: CollectionId, new_parent: CollectionId) -> Result<(), StoreError>;
    async fn remove_collection(&self, id: CollectionId) -> Result<Option<Collection>, StoreError>;
    async fn children_of(&self, id: CollectionId) -> Result<Vec<CollectionId>, StoreError>;

    async fn get_item(&self, id: ItemId) -> Result<Option<PimItem>, StoreError>;
    async fn items_in_collection(&self, collection: CollectionId) -> Result<Vec<PimItem>, StoreError>;
    async fn find_item_by_remote_id(
        &self,
        resource: &ResourceId,
        remote_id: &RemoteId,
    ) -> Result<Option<PimItem>, StoreError>;
    async fn find_item_by_gid(&self, gid: &Gid) -> Result<Option<PimItem>, StoreError>;
    async fn insert_item(&self, item: PimItem) -> Result<ItemId, StoreError>;
    async fn update_item(&self, item: PimItem) -> Result<(), StoreError>;
    async fn remove_item(&self, id: ItemId) -> Result<Option<PimItem>, StoreError>;

    async fn get_tag(&self, id: TagId) -> Result<Option<Tag>, StoreError>;
    async fn find_tag_by_gid(&self, gid: &Gid) -> Result<Option<Tag>, StoreError>;
    async fn tags_all(&self) -> Result<Vec<Tag>, StoreError>;
    async fn insert_tag(&self, tag: Tag) -> Result<TagId, StoreError>;
    async fn update_tag(&self, tag: Tag) -> Result<(), StoreError>;
    async fn remove_tag(&self, id: TagId) -> Result<Option<Tag>, StoreError>;

    async fn insert_relation(&self, relation: Relation) -> Result<RelationId, StoreError>;
    async fn remove_relation(&self, id: RelationId) -> Result<Option<Relation>, StoreError>;
    async fn relations_for_item(&self, id: ItemId) -> Result<Vec<Relation>, StoreError>;

    /// Virtual collections link to items owned elsewhere rather than
    /// containing them (§3 Collection invariant).
    async fn link_item(&self, collection: CollectionId, item: ItemId) -> Result<(), StoreError>;
    async fn unlink_item(&self, collection: CollectionId, item: ItemId) -> Result<(), StoreError>;
    async fn virtual_links_for_collection(&self, collection: CollectionId) -> Result<Vec<ItemId>, StoreError>;

    async fn raw_collection_stats(&self, collection: CollectionId) -> Result<RawCollectionStats, StoreError>;
}
