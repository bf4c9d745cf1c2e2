//! Collection command family (§4.7): stats, create, modify, delete, move.
//! `modify_collection` carries the bulk of the complexity here — it is the
//! only handler that diffs a snapshot against a declarative change set to
//! compute the changed-parts set a `Collection-Modify` notification needs,
//! and the only place enablement toggles into a subscribe/unsubscribe pair
//! (§8 scenarios 2-4).

use std::collections::BTreeSet;

use pim_model::{Collection, CollectionId, CollectionPart};
use pim_protocol::{
    CollectionFetchScope, CollectionPayload, CollectionStatsPayload, CreateCollectionCommand,
    DeleteCollectionCommand, FetchCollectionStatsCommand, ModifyCollectionCommand, MoveCollectionCommand, Response,
};

use crate::error::HandlerError;
use crate::handlers::HandlerContext;

fn collection_payload(c: &Collection, scope: &CollectionFetchScope, stats: Option<CollectionStatsPayload>) -> CollectionPayload {
    let attributes = if scope.fetch_id_only {
        Vec::new()
    } else if scope.attributes.is_empty() {
        c.attributes.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    } else {
        c.attributes
            .iter()
            .filter(|(k, _)| scope.attributes.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    };
    CollectionPayload {
        id: c.id.get(),
        parent_id: c.parent_id.map(|p| p.get()).unwrap_or(pim_model::ROOT_COLLECTION.get()),
        resource: c.resource.0.clone(),
        name: c.name.clone(),
        remote_id: c.remote_id.0.clone(),
        content_mime_types: c.content_mime_types.iter().cloned().collect(),
        virtual_: c.virtual_,
        enabled: c.enabled,
        attributes,
        statistics: if scope.include_statistics { stats } else { None },
    }
}

pub async fn fetch_collection_stats(
    hctx: &HandlerContext<'_>,
    cmd: FetchCollectionStatsCommand,
) -> Result<Vec<Response>, HandlerError> {
    let collection = hctx
        .store()
        .get_collection(cmd.collection)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("no collection {}", cmd.collection)))?;
    let stats = hctx.ctx.stats.get(collection.id, hctx.store()).await?;
    Ok(vec![Response::CollectionStats(CollectionStatsPayload {
        count: stats.count,
        unseen: stats.count.saturating_sub(stats.read),
        size: stats.size,
    })])
}

pub async fn create_collection(hctx: &HandlerContext<'_>, cmd: CreateCollectionCommand) -> Result<Vec<Response>, HandlerError> {
    if cmd.parent != pim_model::ROOT_COLLECTION && hctx.store().get_collection(cmd.parent).await?.is_none() {
        return Err(HandlerError::not_found(format!("no collection {}", cmd.parent)));
    }

    let staged = Collection {
        id: CollectionId(0),
        parent_id: Some(cmd.parent),
        resource: cmd.resource,
        name: cmd.name,
        remote_id: Default::default(),
        remote_revision: None,
        content_mime_types: Default::default(),
        cache_policy: Default::default(),
        virtual_: false,
        query: None,
        enabled: true,
        view_preferences: Default::default(),
        attributes: Default::default(),
    };
    let id = hctx.store().insert_collection(staged.clone()).await?;
    let mut stored = staged;
    stored.id = id;

    hctx.collector.collection_added(hctx.session_id, stored.clone());
    Ok(vec![Response::Collection(collection_payload(&stored, &CollectionFetchScope::default(), None))])
}

/// §8 scenarios 2-4: a field-by-field diff against the pre-modification
/// snapshot, plus attribute-level diffing for `CollectionPart::Attribute`.
/// Enablement toggling on emits `collection_subscribed`; toggling off emits
/// `collection_unsubscribed`, alongside the `Collection-Modify` either way.
pub async fn modify_collection(hctx: &HandlerContext<'_>, cmd: ModifyCollectionCommand) -> Result<Vec<Response>, HandlerError> {
    let before = hctx
        .store()
        .get_collection(cmd.id)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("no collection {}", cmd.id)))?;
    let mut after = before.clone();
    let mut changed_parts = BTreeSet::new();

    if let Some(name) = cmd.changes.name {
        if after.name != name {
            changed_parts.insert(CollectionPart::Name);
        }
        after.name = name;
    }
    let mut enablement_toggled_on = false;
    let mut enablement_toggled_off = false;
    if let Some(enabled) = cmd.changes.enabled {
        if after.enabled != enabled {
            changed_parts.insert(CollectionPart::Enabled);
            enablement_toggled_on = enabled && !after.enabled;
            enablement_toggled_off = !enabled && after.enabled;
        }
        after.enabled = enabled;
    }
    if let Some(pref) = cmd.changes.sync_pref {
        if after.view_preferences.sync != pref {
            changed_parts.insert(CollectionPart::SyncPref);
        }
        after.view_preferences.sync = pref;
    }
    if let Some(pref) = cmd.changes.display_pref {
        if after.view_preferences.display != pref {
            changed_parts.insert(CollectionPart::DisplayPref);
        }
        after.view_preferences.display = pref;
    }
    if let Some(pref) = cmd.changes.index_pref {
        if after.view_preferences.index != pref {
            changed_parts.insert(CollectionPart::IndexPref);
        }
        after.view_preferences.index = pref;
    }
    for (key, value) in cmd.changes.attributes {
        if after.attributes.get(&key) != Some(&value) {
            changed_parts.insert(CollectionPart::Attribute(key.clone()));
        }
        after.attributes.insert(key, value);
    }

    hctx.store().update_collection(after.clone()).await?;

    if changed_parts.is_empty() {
        return Ok(vec![Response::Collection(collection_payload(&after, &CollectionFetchScope::default(), None))]);
    }

    hctx.collector.collection_changed(hctx.session_id, after.clone(), changed_parts);
    if enablement_toggled_on {
        hctx.collector.collection_subscribed(hctx.session_id, after.clone());
    } else if enablement_toggled_off {
        hctx.collector.collection_unsubscribed(hctx.session_id, after.clone());
    }
    Ok(vec![Response::Collection(collection_payload(&after, &CollectionFetchScope::default(), None))])
}

pub async fn delete_collection(hctx: &HandlerContext<'_>, cmd: DeleteCollectionCommand) -> Result<Vec<Response>, HandlerError> {
    let removed = hctx
        .store()
        .remove_collection(cmd.id)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("no collection {}", cmd.id)))?;
    hctx.collector.collection_removed(hctx.session_id, removed.id, removed.resource);
    Ok(Vec::new())
}

pub async fn move_collection(hctx: &HandlerContext<'_>, cmd: MoveCollectionCommand) -> Result<Vec<Response>, HandlerError> {
    let before = hctx
        .store()
        .get_collection(cmd.id)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("no collection {}", cmd.id)))?;
    let destination = hctx
        .store()
        .get_collection(cmd.destination)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("no collection {}", cmd.destination)))?;
    let source_parent = before.parent_id.unwrap_or(pim_model::ROOT_COLLECTION);

    hctx.store().move_collection(cmd.id, cmd.destination).await?;
    let mut after = before;
    after.parent_id = Some(cmd.destination);

    let destination_resource = (destination.resource != after.resource).then(|| destination.resource.clone());
    hctx.collector
        .collection_moved(hctx.session_id, after, source_parent, cmd.destination, destination_resource);
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pim_model::{CachePolicy, ResourceId, Tristate, ViewPreferences};
    use tokio::sync::mpsc;

    use super::*;
    use crate::cache::CollectionTreeCache;
    use crate::notify::collector::NotificationCollector;
    use crate::notify::manager::NotificationManager;
    use crate::search::SearchTaskRegistry;
    use crate::session::ServerContext;
    use crate::stats::StatsCache;
    use crate::store::MemoryStore;

    fn ctx_with_store(store: MemoryStore) -> Arc<ServerContext> {
        Arc::new(ServerContext {
            store: Arc::new(store),
            cache: Arc::new(CollectionTreeCache::new()),
            stats: Arc::new(StatsCache::new()),
            manager: Arc::new(NotificationManager::new(2)),
            search_tasks: Arc::new(SearchTaskRegistry::new()),
        })
    }

    fn sample_collection(id: i64) -> Collection {
        Collection {
            id: CollectionId(id),
            parent_id: None,
            resource: ResourceId("res0".into()),
            name: "inbox".into(),
            remote_id: Default::default(),
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

    fn harness(store: MemoryStore) -> (Arc<ServerContext>, Option<CollectionId>, Option<pim_model::TagId>, Option<ResourceId>, NotificationCollector, mpsc::UnboundedSender<pim_model::Notification>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        (
            ctx_with_store(store),
            None,
            None,
            Some(ResourceId("res0".into())),
            NotificationCollector::new(),
            tx,
        )
    }

    #[tokio::test]
    async fn modify_enabled_emits_unsubscribe_alongside_modify() {
        let store = MemoryStore::new();
        store.seed_collection(sample_collection(1));
        let (ctx, mut sel, mut sel_tag, mut resource, collector, tx) = harness(store);
        let hctx = HandlerContext {
            session_id: pim_model::SessionId(1),
            ctx: &ctx,
            collector: &collector,
            selected_collection: &mut sel,
            selected_tag: &mut sel_tag,
            resource: &mut resource,
            notification_tx: &tx,
        };

        let result = modify_collection(
            &hctx,
            ModifyCollectionCommand {
                id: CollectionId(1),
                changes: pim_protocol::CollectionChangeSet { enabled: Some(false), ..Default::default() },
            },
        )
        .await
        .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn modify_with_no_actual_changes_emits_nothing() {
        let store = MemoryStore::new();
        store.seed_collection(sample_collection(1));
        let (ctx, mut sel, mut sel_tag, mut resource, collector, tx) = harness(store);
        let hctx = HandlerContext {
            session_id: pim_model::SessionId(1),
            ctx: &ctx,
            collector: &collector,
            selected_collection: &mut sel,
            selected_tag: &mut sel_tag,
            resource: &mut resource,
            notification_tx: &tx,
        };

        modify_collection(
            &hctx,
            ModifyCollectionCommand {
                id: CollectionId(1),
                changes: pim_protocol::CollectionChangeSet {
                    name: Some("inbox".into()),
                    sync_pref: Some(Tristate::Undefined),
                    ..Default::default()
                },
            },
        )
        .await
        .unwrap();
    }
}
