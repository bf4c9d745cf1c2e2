//! Item command family (§4.7): fetch/create/modify/delete/move/link/unlink.
//! Every mutating handler writes its effect to the store first and then
//! records the corresponding change on the session's collector; completion
//! against the aggregated fetch scopes happens later, at commit (C4).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use pim_model::{CollectionId, ItemId, ItemRef, Part, PimItem, ResourceId};
use pim_protocol::{
    CreateItemCommand, DeleteItemCommand, FetchItemsCommand, ItemFetchScope, ItemPayload,
    LinkItemsCommand, ModifyItemCommand, MoveItemCommand, PartPayload, Response,
    UnlinkItemsCommand,
};

use crate::error::HandlerError;
use crate::handlers::HandlerContext;

fn unix_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn item_payload(item: &PimItem, scope: &ItemFetchScope) -> ItemPayload {
    let parts = if scope.full_payload {
        item.parts.clone()
    } else {
        item.parts
            .iter()
            .filter(|p| scope.requested_parts.contains(p.name.as_bytes()))
            .cloned()
            .collect()
    };
    ItemPayload {
        id: item.id.get(),
        parent_collection: item.parent_collection.get(),
        resource: item.resource.0.clone(),
        remote_id: if scope.fetch_remote_id { item.remote_id.0.clone() } else { String::new() },
        remote_revision: if scope.fetch_remote_revision { item.remote_revision.clone() } else { None },
        mime_type: item.mime_type.clone(),
        revision: item.revision,
        gid: if scope.fetch_gid { item.gid.as_ref().map(|g| g.0.clone()) } else { None },
        size: if scope.fetch_size { item.size } else { 0 },
        mtime_unix_ms: if scope.fetch_mtime { unix_ms(item.mtime) } else { 0 },
        flags: if scope.fetch_flags { item.flags.iter().cloned().collect() } else { Vec::new() },
        tags: if scope.fetch_tags { item.tags.iter().map(|t| t.get()).collect() } else { Vec::new() },
        parts: parts
            .into_iter()
            .map(|p| PartPayload {
                name: p.name,
                version: p.version,
                external: p.external,
                data: p.data,
                exists: p.exists,
                datasize: p.datasize,
            })
            .collect(),
    }
}

fn item_ref(item: &PimItem) -> ItemRef {
    ItemRef {
        id: item.id,
        remote_id: item.remote_id.clone(),
        mime_type: item.mime_type.clone(),
        fetched: Some(item.clone()),
    }
}

/// §4.7 "Fetch-items": a bare (empty) scope means "whatever is currently
/// selected"; a bump to `atime` happens only when the full payload is
/// requested, mirroring a client that actually read the content.
/// `ignoreErrors` turns a missing item from an aborting error into a
/// silently skipped one.
pub async fn fetch_items(hctx: &HandlerContext<'_>, cmd: FetchItemsCommand) -> Result<Vec<Response>, HandlerError> {
    let ids: Vec<ItemId> = if cmd.scope.is_empty() {
        let collection = hctx
            .selected_collection
            .ok_or_else(|| HandlerError::rejected("no collection selected"))?;
        hctx.store()
            .items_in_collection(collection)
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect()
    } else {
        hctx.resolve_item_ids(&cmd.scope).await?
    };

    let mut responses = Vec::with_capacity(ids.len());
    for id in ids {
        match hctx.store().get_item(id).await? {
            Some(mut item) => {
                if cmd.fetch_scope.full_payload {
                    item.atime = Some(SystemTime::now());
                    hctx.store().update_item(item.clone()).await?;
                }
                responses.push(Response::Item(item_payload(&item, &cmd.fetch_scope)));
            }
            None if cmd.fetch_scope.ignore_errors => continue,
            None => return Err(HandlerError::not_found(format!("no item {id}"))),
        }
    }
    Ok(responses)
}

pub async fn create_item(hctx: &HandlerContext<'_>, cmd: CreateItemCommand) -> Result<Vec<Response>, HandlerError> {
    let resource = hctx.require_resource()?;
    let collection = hctx
        .store()
        .get_collection(cmd.parent_collection)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("no collection {}", cmd.parent_collection)))?;
    if !collection.accepts_mime_type(&cmd.mime_type) {
        return Err(HandlerError::rejected(format!("collection does not accept mime type {}", cmd.mime_type)));
    }

    let staged = PimItem {
        id: ItemId(0),
        parent_collection: cmd.parent_collection,
        resource: resource.clone(),
        remote_id: pim_model::RemoteId(cmd.remote_id.clone().unwrap_or_default()),
        remote_revision: None,
        mime_type: cmd.mime_type.clone(),
        revision: 0,
        gid: None,
        size: 0,
        mtime: SystemTime::now(),
        atime: None,
        flags: cmd.flags.clone(),
        tags: Default::default(),
        parts: Vec::new(),
    };
    let id = hctx.store().insert_item(staged.clone()).await?;
    let mut stored = staged;
    stored.id = id;

    hctx.collector
        .item_added(hctx.session_id, cmd.parent_collection, resource, vec![item_ref(&stored)]);
    Ok(vec![Response::Item(item_payload(&stored, &ItemFetchScope::default()))])
}

pub async fn modify_item(hctx: &HandlerContext<'_>, cmd: ModifyItemCommand) -> Result<Vec<Response>, HandlerError> {
    let ids = hctx.resolve_item_ids(&cmd.scope).await?;
    let mut responses = Vec::with_capacity(ids.len());
    for id in ids {
        let before = hctx
            .store()
            .get_item(id)
            .await?
            .ok_or_else(|| HandlerError::not_found(format!("no item {id}")))?;
        let mut after = before.clone();
        for (name, data) in &cmd.parts {
            let version = after.part(name).map(|p| p.version + 1).unwrap_or(0);
            after.set_part(Part {
                name: name.clone(),
                version,
                external: false,
                data: data.clone(),
                exists: true,
                datasize: data.len() as u64,
            });
        }
        after.size = after.parts.iter().map(|p| p.datasize).sum();
        after.revision += 1;
        after.mtime = SystemTime::now();
        hctx.store().update_item(after.clone()).await?;

        let changed_parts = after.changed_part_names(&before);
        hctx.collector.item_changed(
            hctx.session_id,
            after.parent_collection,
            after.resource.clone(),
            vec![item_ref(&after)],
            changed_parts,
        );
        responses.push(Response::Item(item_payload(&after, &ItemFetchScope::default())));
    }
    Ok(responses)
}

pub async fn delete_item(hctx: &HandlerContext<'_>, cmd: DeleteItemCommand) -> Result<Vec<Response>, HandlerError> {
    let ids = hctx.resolve_item_ids(&cmd.scope).await?;
    let mut by_parent: HashMap<CollectionId, (ResourceId, Vec<ItemRef>)> = HashMap::new();
    for id in ids {
        let removed = hctx
            .store()
            .remove_item(id)
            .await?
            .ok_or_else(|| HandlerError::not_found(format!("no item {id}")))?;
        by_parent
            .entry(removed.parent_collection)
            .or_insert_with(|| (removed.resource.clone(), Vec::new()))
            .1
            .push(item_ref(&removed));
    }
    for (parent, (resource, items)) in by_parent {
        hctx.collector.items_removed(hctx.session_id, parent, resource, items);
    }
    Ok(Vec::new())
}

pub async fn move_item(hctx: &HandlerContext<'_>, cmd: MoveItemCommand) -> Result<Vec<Response>, HandlerError> {
    let ids = hctx.resolve_item_ids(&cmd.scope).await?;
    let destination = hctx
        .store()
        .get_collection(cmd.destination)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("no collection {}", cmd.destination)))?;

    let mut by_source: HashMap<CollectionId, (ResourceId, Vec<ItemRef>)> = HashMap::new();
    for id in ids {
        let mut item = hctx
            .store()
            .get_item(id)
            .await?
            .ok_or_else(|| HandlerError::not_found(format!("no item {id}")))?;
        let source_parent = item.parent_collection;
        let source_resource = item.resource.clone();
        item.parent_collection = cmd.destination;
        hctx.store().update_item(item.clone()).await?;
        by_source
            .entry(source_parent)
            .or_insert_with(|| (source_resource, Vec::new()))
            .1
            .push(item_ref(&item));
    }
    for (source_parent, (resource, items)) in by_source {
        let destination_resource = (destination.resource != resource).then(|| destination.resource.clone());
        hctx.collector
            .items_moved(hctx.session_id, source_parent, cmd.destination, resource, destination_resource, items);
    }
    Ok(Vec::new())
}

pub async fn link_items(hctx: &HandlerContext<'_>, cmd: LinkItemsCommand) -> Result<Vec<Response>, HandlerError> {
    let ids = hctx.resolve_item_ids(&cmd.scope).await?;
    let resource = hctx.require_resource()?;
    let mut refs = Vec::with_capacity(ids.len());
    for id in ids {
        let item = hctx
            .store()
            .get_item(id)
            .await?
            .ok_or_else(|| HandlerError::not_found(format!("no item {id}")))?;
        hctx.store().link_item(cmd.destination, id).await?;
        refs.push(item_ref(&item));
    }
    hctx.collector.items_linked(hctx.session_id, cmd.destination, resource, refs);
    Ok(Vec::new())
}

pub async fn unlink_items(hctx: &HandlerContext<'_>, cmd: UnlinkItemsCommand) -> Result<Vec<Response>, HandlerError> {
    let ids = hctx.resolve_item_ids(&cmd.scope).await?;
    let resource = hctx.require_resource()?;
    let mut refs = Vec::with_capacity(ids.len());
    for id in ids {
        let item = hctx
            .store()
            .get_item(id)
            .await?
            .ok_or_else(|| HandlerError::not_found(format!("no item {id}")))?;
        hctx.store().unlink_item(cmd.destination, id).await?;
        refs.push(item_ref(&item));
    }
    hctx.collector.items_unlinked(hctx.session_id, cmd.destination, resource, refs);
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pim_model::{CachePolicy, Collection, CollectionId, ResourceId as Res, Scope, ViewPreferences};
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
            resource: Res("res0".into()),
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

    struct Harness {
        ctx: Arc<ServerContext>,
        selected_collection: Option<CollectionId>,
        selected_tag: Option<pim_model::TagId>,
        resource: Option<Res>,
        collector: NotificationCollector,
        tx: mpsc::UnboundedSender<pim_model::Notification>,
    }

    impl Harness {
        fn new(store: MemoryStore) -> Self {
            let (tx, _rx) = mpsc::unbounded_channel();
            Self {
                ctx: ctx_with_store(store),
                selected_collection: None,
                selected_tag: None,
                resource: Some(Res("res0".into())),
                collector: NotificationCollector::new(),
                tx,
            }
        }

        fn hctx(&mut self) -> HandlerContext<'_> {
            HandlerContext {
                session_id: pim_model::SessionId(1),
                ctx: &self.ctx,
                collector: &self.collector,
                selected_collection: &mut self.selected_collection,
                selected_tag: &mut self.selected_tag,
                resource: &mut self.resource,
                notification_tx: &self.tx,
            }
        }
    }

    #[tokio::test]
    async fn create_then_fetch_round_trips_through_the_store() {
        let store = MemoryStore::new();
        store.seed_collection(sample_collection(1));
        let mut harness = Harness::new(store);

        let created = create_item(
            &harness.hctx(),
            CreateItemCommand {
                parent_collection: CollectionId(1),
                mime_type: "message/rfc822".into(),
                remote_id: Some("rid-1".into()),
                flags: Default::default(),
            },
        )
        .await
        .unwrap();
        let id = match &created[0] {
            Response::Item(p) => p.id,
            _ => panic!("expected item response"),
        };

        let fetched = fetch_items(
            &harness.hctx(),
            FetchItemsCommand { scope: Scope::Uid(vec![id]), fetch_scope: ItemFetchScope::default() },
        )
        .await
        .unwrap();
        assert_eq!(fetched.len(), 1);
    }

    #[tokio::test]
    async fn fetch_items_with_ignore_errors_skips_missing() {
        let mut harness = Harness::new(MemoryStore::new());
        let responses = fetch_items(
            &harness.hctx(),
            FetchItemsCommand {
                scope: Scope::Uid(vec![404]),
                fetch_scope: ItemFetchScope { ignore_errors: true, ..ItemFetchScope::default() },
            },
        )
        .await
        .unwrap();
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn fetch_items_without_ignore_errors_reports_not_found() {
        let mut harness = Harness::new(MemoryStore::new());
        let result = fetch_items(
            &harness.hctx(),
            FetchItemsCommand { scope: Scope::Uid(vec![404]), fetch_scope: ItemFetchScope::default() },
        )
        .await;
        assert!(result.is_err());
    }
}
