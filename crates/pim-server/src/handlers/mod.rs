//! Handler set (C7, §4.7): one module per family of commands. Every handler
//! is a single-shot async function driven by the session (C6); it reads
//! ambient state off [`HandlerContext`] and writes its changes into the
//! session's [`NotificationCollector`] rather than dispatching directly.

pub mod collections;
pub mod items;
pub mod search;
pub mod select;
pub mod subscriptions;
pub mod tags;

use pim_model::{CollectionId, ItemId, ResourceId, Scope, SessionId, TagId, Tag, ROOT_COLLECTION};
use tokio::sync::mpsc;

use crate::error::HandlerError;
use crate::notify::collector::NotificationCollector;
use crate::session::ServerContext;
use crate::store::Store;

/// Ambient state a handler reads/writes (§4.6 "Command context"). Borrowed
/// fresh for each command; `selected_collection`/`selected_tag`/`resource`
/// are `&mut` because `Select` (and, for resource, `Login`) are the only
/// handlers that mutate them.
pub struct HandlerContext<'a> {
    pub session_id: SessionId,
    pub ctx: &'a ServerContext,
    pub collector: &'a NotificationCollector,
    pub selected_collection: &'a mut Option<CollectionId>,
    pub selected_tag: &'a mut Option<TagId>,
    pub resource: &'a mut Option<ResourceId>,
    /// The session's own outbound notification channel, handed to
    /// `CreateSubscription` so the subscriber it registers delivers back
    /// through this connection rather than some other session's (§4.5
    /// "owned by the session layer").
    pub notification_tx: &'a mpsc::UnboundedSender<pim_model::Notification>,
}

impl<'a> HandlerContext<'a> {
    fn store(&self) -> &dyn Store {
        self.ctx.store.as_ref()
    }

    fn require_resource(&self) -> Result<ResourceId, HandlerError> {
        self.resource
            .clone()
            .ok_or_else(|| HandlerError::rejected("no resource selected for this session"))
    }

    /// Resolves a `Scope` naming one or more collections (§6). `Empty` is
    /// rejected here; callers for whom an empty scope is meaningful (e.g.
    /// `Select` deselecting) must special-case it before calling this.
    pub async fn resolve_collection_ids(&self, scope: &Scope) -> Result<Vec<CollectionId>, HandlerError> {
        match scope {
            Scope::Empty => Err(HandlerError::malformed("empty scope")),
            Scope::Uid(ids) => Ok(ids.iter().copied().map(CollectionId).collect()),
            Scope::RemoteId(rids) => {
                let resource = self.require_resource()?;
                let mut ids = Vec::with_capacity(rids.len());
                for rid in rids {
                    let found = self
                        .store()
                        .find_collection_by_remote_id(&resource, rid)
                        .await?
                        .ok_or_else(|| HandlerError::not_found(format!("no collection with remote id {rid:?}")))?;
                    ids.push(found.id);
                }
                Ok(ids)
            }
            Scope::Gid(_) => Err(HandlerError::malformed("gid scope is not valid for collections")),
            Scope::HierarchicalRid(chain) => {
                let resource = self.require_resource()?;
                let mut parent = ROOT_COLLECTION;
                for rid in chain {
                    let children = self.store().children_of(parent).await?;
                    let mut matched = None;
                    for child in children {
                        if let Some(collection) = self.store().get_collection(child).await? {
                            if collection.resource == resource && &collection.remote_id == rid {
                                matched = Some(collection.id);
                                break;
                            }
                        }
                    }
                    parent = matched.ok_or_else(|| HandlerError::not_found(format!("no collection path segment {rid:?}")))?;
                }
                Ok(vec![parent])
            }
        }
    }

    pub async fn resolve_single_collection(&self, scope: &Scope) -> Result<CollectionId, HandlerError> {
        let mut ids = self.resolve_collection_ids(scope).await?;
        if ids.len() != 1 {
            return Err(HandlerError::malformed("scope must resolve to exactly one collection"));
        }
        Ok(ids.pop().unwrap())
    }

    /// Resolves a `Scope` naming one or more items (§6). `HierarchicalRid`
    /// is a collection-only scope kind.
    pub async fn resolve_item_ids(&self, scope: &Scope) -> Result<Vec<ItemId>, HandlerError> {
        match scope {
            Scope::Empty => Err(HandlerError::malformed("empty scope")),
            Scope::Uid(ids) => Ok(ids.iter().copied().map(ItemId).collect()),
            Scope::RemoteId(rids) => {
                let resource = self.require_resource()?;
                let mut ids = Vec::with_capacity(rids.len());
                for rid in rids {
                    let found = self
                        .store()
                        .find_item_by_remote_id(&resource, rid)
                        .await?
                        .ok_or_else(|| HandlerError::not_found(format!("no item with remote id {rid:?}")))?;
                    ids.push(found.id);
                }
                Ok(ids)
            }
            Scope::Gid(gids) => {
                let mut ids = Vec::with_capacity(gids.len());
                for gid in gids {
                    let found = self
                        .store()
                        .find_item_by_gid(gid)
                        .await?
                        .ok_or_else(|| HandlerError::not_found(format!("no item with gid {gid}")))?;
                    ids.push(found.id);
                }
                Ok(ids)
            }
            Scope::HierarchicalRid(_) => Err(HandlerError::malformed("hierarchical-rid scope is not valid for items")),
        }
    }

    /// Resolves a `Scope` naming one or more tags (§6 "Tag operations
    /// accept UID, GID, and RID only").
    pub async fn resolve_tag_ids(&self, scope: &Scope) -> Result<Vec<TagId>, HandlerError> {
        if !pim_model::tag_scope_is_legal(scope) {
            return Err(HandlerError::malformed("scope kind is not legal for tag operations"));
        }
        match scope {
            Scope::Empty => Ok(self.store().tags_all().await?.into_iter().map(|t| t.id).collect()),
            Scope::Uid(ids) => Ok(ids.iter().copied().map(TagId).collect()),
            Scope::Gid(gids) => {
                let mut ids = Vec::with_capacity(gids.len());
                for gid in gids {
                    let found = self
                        .store()
                        .find_tag_by_gid(gid)
                        .await?
                        .ok_or_else(|| HandlerError::not_found(format!("no tag with gid {gid}")))?;
                    ids.push(found.id);
                }
                Ok(ids)
            }
            Scope::RemoteId(rids) => {
                let resource = self.require_resource()?;
                let all = self.store().tags_all().await?;
                let mut ids = Vec::with_capacity(rids.len());
                for rid in rids {
                    let found = all
                        .iter()
                        .find(|t| t.remote_id_for(&resource) == Some(rid))
                        .ok_or_else(|| HandlerError::not_found(format!("no tag with remote id {rid:?}")))?;
                    ids.push(found.id);
                }
                Ok(ids)
            }
            Scope::HierarchicalRid(_) => unreachable!("rejected by tag_scope_is_legal above"),
        }
    }
}

/// Builds a `TagPayload` for the resource currently attached to the
/// session, if any (§4.7 fetch-tags: "remote id visible only to the
/// resource that assigned it").
pub fn tag_payload_for(tag: &Tag, resource: &Option<ResourceId>, fetch_scope: &pim_protocol::TagFetchScope) -> pim_protocol::TagPayload {
    let remote_id = resource
        .as_ref()
        .and_then(|r| tag.remote_id_for(r))
        .filter(|_| fetch_scope.fetch_remote_id)
        .map(|r| r.0.clone());

    let attributes = if fetch_scope.fetch_id_only {
        Vec::new()
    } else {
        tag.attributes
            .iter()
            .filter(|(k, _)| fetch_scope.fetch_all_attributes || fetch_scope.attributes.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    };

    pim_protocol::TagPayload {
        id: tag.id.get(),
        gid: tag.gid.0.clone(),
        parent: tag.parent.map(|p| p.get()),
        tag_type: tag.tag_type.clone(),
        remote_id,
        attributes,
    }
}
