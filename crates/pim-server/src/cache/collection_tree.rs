//! The in-memory collection-tree cache (C2, §4.2): a shadow of the
//! collection forest for fast lookup by id, by (remote-id, resource) and by
//! bounded-depth subtree walk. Nodes lazily cache the full [`Collection`]
//! record; a node may exist with just identity populated until a consumer
//! asks for more.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use pim_model::{AncestorDepth, Collection, CollectionId, RemoteId, ResourceId, ROOT_COLLECTION};
use tracing::warn;

use crate::error::HandlerError;
use crate::store::Store;

#[derive(Debug, Clone, Default)]
struct Node {
    collection: Option<Collection>,
    children: BTreeSet<CollectionId>,
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<CollectionId, Node>,
}

impl Tree {
    fn attach(&mut self, parent: CollectionId, child: CollectionId) {
        self.nodes.entry(parent).or_default().children.insert(child);
    }

    fn detach(&mut self, parent: CollectionId, child: CollectionId) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.remove(&child);
        }
    }
}

/// How far to walk the subtree rooted at a scope collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    One,
    Unbounded,
}

/// Selects the root of a `retrieve` query (§4.2 "Queries").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeScope {
    Id(CollectionId),
    RemoteId { resource: ResourceId, remote_id: RemoteId },
}

/// Single reader-writer lock protecting the forest (§4.2 "Concurrency",
/// §5 "Shared-resource policy"). Hydration upgrades the lock explicitly to
/// commit freshly fetched records.
pub struct CollectionTreeCache {
    tree: RwLock<Tree>,
}

impl Default for CollectionTreeCache {
    fn default() -> Self {
        Self { tree: RwLock::new(Tree::default()) }
    }
}

impl CollectionTreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// On start, reads all collections ordered by id and links children to
    /// parents. Children with an id lower than their parent (reparented
    /// history) are held aside and re-inserted in a fixed-point pass over
    /// decreasing parent ids; unreferenced collections are logged and
    /// discarded (§4.2 "Hydration", §8 scenario 5).
    pub async fn hydrate(&self, store: &dyn Store) -> Result<(), HandlerError> {
        let all = store.collections_ordered_by_id().await?;
        let mut tree = self.tree.write();
        tree.nodes.clear();

        let mut pending: Vec<Collection> = Vec::new();
        for collection in all {
            match collection.parent_id {
                Some(parent) if parent.get() > collection.id.get() => {
                    // Reparented history: the parent comes later in id order.
                    pending.push(collection);
                }
                Some(parent) => {
                    tree.attach(parent, collection.id);
                    tree.nodes.insert(
                        collection.id,
                        Node { collection: Some(collection), children: BTreeSet::new() },
                    );
                }
                None => {
                    tree.attach(ROOT_COLLECTION, collection.id);
                    tree.nodes.insert(
                        collection.id,
                        Node { collection: Some(collection), children: BTreeSet::new() },
                    );
                }
            }
        }

        // Fixed-point pass over decreasing parent ids: repeatedly try to
        // attach pending collections once their declared parent exists.
        let mut progressed = true;
        while progressed && !pending.is_empty() {
            progressed = false;
            let mut still_pending = Vec::new();
            for collection in pending {
                let parent = collection.parent_id.expect("pending entries always have a parent");
                if tree.nodes.contains_key(&parent) {
                    tree.attach(parent, collection.id);
                    tree.nodes.insert(
                        collection.id,
                        Node { collection: Some(collection), children: BTreeSet::new() },
                    );
                    progressed = true;
                } else {
                    still_pending.push(collection);
                }
            }
            pending = still_pending;
        }

        for orphan in &pending {
            warn!(collection_id = orphan.id.get(), parent_id = orphan.parent_id.map(|p| p.get()), "discarding collection with unresolved parent after hydration fixed point");
        }

        Ok(())
    }

    /// §4.2 "Mutations — On `collectionAdded`": attach a new node under the
    /// declared parent; if the parent is absent, log a warning.
    pub fn collection_added(&self, collection: Collection) {
        let mut tree = self.tree.write();
        let parent = collection.parent_id.unwrap_or(ROOT_COLLECTION);
        if parent != ROOT_COLLECTION && !tree.nodes.contains_key(&parent) {
            warn!(collection_id = collection.id.get(), parent_id = parent.get(), "collection added under unknown parent");
        }
        tree.attach(parent, collection.id);
        tree.nodes.insert(collection.id, Node { collection: Some(collection), children: BTreeSet::new() });
    }

    /// On `collectionChanged`, update the node's cached record in place
    /// unless it was never hydrated (§4.2).
    pub fn collection_changed(&self, collection: Collection) {
        let mut tree = self.tree.write();
        if let Some(node) = tree.nodes.get_mut(&collection.id) {
            node.collection = Some(collection);
        }
    }

    /// Re-links from the old parent to the new and updates the cached
    /// record (§4.2 "On `collectionMoved`").
    pub fn collection_moved(&self, id: CollectionId, new_parent: CollectionId) {
        let mut tree = self.tree.write();
        let old_parent = tree
            .nodes
            .iter()
            .find(|(_, node)| node.children.contains(&id))
            .map(|(parent, _)| *parent);
        if let Some(old_parent) = old_parent {
            tree.detach(old_parent, id);
        }
        tree.attach(new_parent, id);
        if let Some(node) = tree.nodes.get_mut(&id) {
            if let Some(collection) = node.collection.as_mut() {
                collection.parent_id = Some(new_parent);
            }
        }
    }

    /// Detaches and destroys the subtree node; stale references see
    /// "missing" on subsequent lookups (§4.2 "On `collectionRemoved`").
    pub fn collection_removed(&self, id: CollectionId) {
        let mut tree = self.tree.write();
        let parent = tree
            .nodes
            .iter()
            .find(|(_, node)| node.children.contains(&id))
            .map(|(parent, _)| *parent);
        if let Some(parent) = parent {
            tree.detach(parent, id);
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = tree.nodes.remove(&next) {
                stack.extend(node.children);
            }
        }
    }

    pub fn contains(&self, id: CollectionId) -> bool {
        self.tree.read().nodes.contains_key(&id)
    }

    /// Walks the parent chain upward from `start`, hydrating any
    /// unhydrated ancestor along the way, up to `ancestor_depth` hops
    /// (§4.2 "Queries": "pulling `ancestorDepth` parents upward").
    /// `AncestorDepth::None` walks zero hops; `AncestorDepth::Parent` walks
    /// one; `AncestorDepth::All` walks to the forest root.
    async fn ancestor_ids(
        &self,
        start: CollectionId,
        ancestor_depth: AncestorDepth,
        store: &dyn Store,
    ) -> Result<Vec<CollectionId>, HandlerError> {
        let limit = match ancestor_depth {
            AncestorDepth::None => 0,
            AncestorDepth::Parent => 1,
            AncestorDepth::All => usize::MAX,
        };

        let mut ancestors = Vec::new();
        let mut current = start;
        let mut hops = 0;
        while hops < limit {
            let cached_parent = self
                .tree
                .read()
                .nodes
                .get(&current)
                .and_then(|n| n.collection.as_ref().map(|c| c.parent_id));
            let parent_id = match cached_parent {
                Some(parent) => parent,
                None => match store.get_collection(current).await? {
                    Some(fetched) => {
                        let parent = fetched.parent_id;
                        self.tree.write().nodes.entry(current).or_default().collection = Some(fetched);
                        parent
                    }
                    None => None,
                },
            };
            match parent_id {
                Some(parent) if parent != current && parent != ROOT_COLLECTION => {
                    ancestors.push(parent);
                    current = parent;
                    hops += 1;
                }
                _ => break,
            }
        }
        Ok(ancestors)
    }

    /// §4.2 "Queries": returns a list of Collections rooted at the scope,
    /// visiting up to `depth` levels downward and pulling `ancestor_depth`
    /// parents upward. Missing hydrations are batched into one store query.
    pub async fn retrieve(
        &self,
        scope: TreeScope,
        depth: Depth,
        ancestor_depth: AncestorDepth,
        resource: Option<&ResourceId>,
        store: &dyn Store,
    ) -> Result<Vec<Collection>, HandlerError> {
        let root_id = match scope {
            TreeScope::Id(id) => id,
            TreeScope::RemoteId { ref resource, ref remote_id } => {
                match store.find_collection_by_remote_id(resource, remote_id).await? {
                    Some(c) => c.id,
                    None => return Ok(Vec::new()),
                }
            }
        };

        let mut ids_in_subtree = {
            let tree = self.tree.read();
            let mut ids = Vec::new();
            let mut stack = vec![root_id];
            while let Some(current) = stack.pop() {
                if current != root_id {
                    ids.push(current);
                }
                if let Some(node) = tree.nodes.get(&current) {
                    if depth == Depth::Unbounded || current == root_id {
                        stack.extend(node.children.iter().copied());
                    }
                }
            }
            if tree.nodes.contains_key(&root_id) {
                ids.push(root_id);
            }
            ids
        };

        for ancestor in self.ancestor_ids(root_id, ancestor_depth, store).await? {
            if !ids_in_subtree.contains(&ancestor) {
                ids_in_subtree.push(ancestor);
            }
        }

        let missing: Vec<CollectionId> = {
            let tree = self.tree.read();
            ids_in_subtree
                .iter()
                .filter(|id| {
                    tree.nodes
                        .get(id)
                        .map(|n| n.collection.is_none())
                        .unwrap_or(true)
                })
                .copied()
                .collect()
        };

        if !missing.is_empty() {
            let mut tree = self.tree.write();
            for id in missing {
                if let Some(fetched) = store.get_collection(id).await? {
                    tree.nodes.entry(id).or_default().collection = Some(fetched);
                }
            }
        }

        let tree = self.tree.read();
        let mut out: Vec<Collection> = ids_in_subtree
            .iter()
            .filter_map(|id| tree.nodes.get(id).and_then(|n| n.collection.clone()))
            .filter(|c| resource.map(|r| &c.resource == r).unwrap_or(true))
            .collect();
        out.sort_by_key(|c| c.id.get());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pim_model::{CachePolicy, ViewPreferences};

    fn col(id: i64, parent: Option<i64>) -> Collection {
        Collection {
            id: CollectionId(id),
            parent_id: parent.map(CollectionId),
            resource: ResourceId("res0".into()),
            name: format!("c{id}"),
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

    #[tokio::test]
    async fn hydration_handles_reparented_history_via_fixed_point() {
        // A1, A2, A3 under A2, A5 moved from A2 to A7 (A5.id < A7.id), A6 with A10, A9.
        let store = MemoryStore::new();
        store.seed_collection(col(1, None)); // A1
        store.seed_collection(col(2, None)); // A2
        store.seed_collection(col(3, Some(2))); // A3 under A2
        store.seed_collection(col(5, Some(7))); // A5 under A7 (A7 not yet seen by id order)
        store.seed_collection(col(6, None)); // A6
        store.seed_collection(col(7, Some(6))); // A7 under A6
        store.seed_collection(col(9, Some(6))); // A9 under A6
        store.seed_collection(col(10, Some(6))); // A10 under A6

        let cache = CollectionTreeCache::new();
        cache.hydrate(&store).await.unwrap();

        let all = cache
            .retrieve(TreeScope::Id(ROOT_COLLECTION), Depth::Unbounded, AncestorDepth::None, None, &store)
            .await
            .unwrap();
        let ids: BTreeSet<i64> = all.iter().map(|c| c.id.get()).collect();
        assert_eq!(ids, BTreeSet::from([1, 2, 3, 5, 6, 7, 9, 10]));
    }

    #[tokio::test]
    async fn unreferenced_collection_is_discarded_not_panicking() {
        let store = MemoryStore::new();
        store.seed_collection(col(1, Some(99))); // parent never exists
        let cache = CollectionTreeCache::new();
        cache.hydrate(&store).await.unwrap();
        assert!(!cache.contains(CollectionId(1)));
    }

    #[tokio::test]
    async fn collection_removed_detaches_whole_subtree() {
        let store = MemoryStore::new();
        store.seed_collection(col(1, None));
        store.seed_collection(col(2, Some(1)));
        let cache = CollectionTreeCache::new();
        cache.hydrate(&store).await.unwrap();
        cache.collection_removed(CollectionId(1));
        assert!(!cache.contains(CollectionId(1)));
        assert!(!cache.contains(CollectionId(2)));
    }

    #[tokio::test]
    async fn retrieve_pulls_ancestors_up_to_the_requested_depth() {
        let store = MemoryStore::new();
        store.seed_collection(col(1, None));
        store.seed_collection(col(2, Some(1)));
        store.seed_collection(col(3, Some(2)));
        let cache = CollectionTreeCache::new();
        cache.hydrate(&store).await.unwrap();

        let none = cache
            .retrieve(TreeScope::Id(CollectionId(3)), Depth::One, AncestorDepth::None, None, &store)
            .await
            .unwrap();
        let none_ids: BTreeSet<i64> = none.iter().map(|c| c.id.get()).collect();
        assert_eq!(none_ids, BTreeSet::from([3]));

        let parent = cache
            .retrieve(TreeScope::Id(CollectionId(3)), Depth::One, AncestorDepth::Parent, None, &store)
            .await
            .unwrap();
        let parent_ids: BTreeSet<i64> = parent.iter().map(|c| c.id.get()).collect();
        assert_eq!(parent_ids, BTreeSet::from([2, 3]));

        let all = cache
            .retrieve(TreeScope::Id(CollectionId(3)), Depth::One, AncestorDepth::All, None, &store)
            .await
            .unwrap();
        let all_ids: BTreeSet<i64> = all.iter().map(|c| c.id.get()).collect();
        assert_eq!(all_ids, BTreeSet::from([1, 2, 3]));
    }
}
