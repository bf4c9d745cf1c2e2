//! Tag command family (§4.7): fetch/create/modify/delete. Tag scopes accept
//! UID, GID, and RID (never hierarchical-rid); `delete_tag` is narrower
//! still and resolves by UID only, per the wire command shape.

use pim_model::{Gid, Tag, TagId};
use pim_protocol::{CreateTagCommand, DeleteTagCommand, FetchTagsCommand, ModifyTagCommand, Response};

use crate::error::HandlerError;
use crate::handlers::{tag_payload_for, HandlerContext};

pub async fn fetch_tags(hctx: &HandlerContext<'_>, cmd: FetchTagsCommand) -> Result<Vec<Response>, HandlerError> {
    let ids = hctx.resolve_tag_ids(&cmd.scope).await?;
    let mut responses = Vec::with_capacity(ids.len());
    for id in ids {
        let tag = hctx
            .store()
            .get_tag(id)
            .await?
            .ok_or_else(|| HandlerError::not_found(format!("no tag {id}")))?;
        responses.push(Response::Tag(tag_payload_for(&tag, hctx.resource, &cmd.fetch_scope)));
    }
    Ok(responses)
}

pub async fn create_tag(hctx: &HandlerContext<'_>, cmd: CreateTagCommand) -> Result<Vec<Response>, HandlerError> {
    if let Some(parent) = cmd.parent {
        hctx.store()
            .get_tag(parent)
            .await?
            .ok_or_else(|| HandlerError::not_found(format!("no parent tag {parent}")))?;
    }
    let gid = Gid(cmd.gid.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()));
    let staged = Tag {
        id: TagId(0),
        gid,
        parent: cmd.parent,
        tag_type: cmd.tag_type,
        attributes: Default::default(),
        remote_ids: Default::default(),
    };
    let id = hctx.store().insert_tag(staged.clone()).await?;
    let mut stored = staged;
    stored.id = id;

    hctx.collector.tag_added(hctx.session_id, stored.clone());
    Ok(vec![Response::Tag(tag_payload_for(&stored, hctx.resource, &pim_protocol::TagFetchScope::default()))])
}

pub async fn modify_tag(hctx: &HandlerContext<'_>, cmd: ModifyTagCommand) -> Result<Vec<Response>, HandlerError> {
    let mut tag = hctx
        .store()
        .get_tag(cmd.id)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("no tag {}", cmd.id)))?;
    for (key, value) in cmd.attributes {
        tag.attributes.insert(key, value);
    }
    hctx.store().update_tag(tag.clone()).await?;

    hctx.collector.tag_changed(hctx.session_id, tag.clone());
    Ok(vec![Response::Tag(tag_payload_for(&tag, hctx.resource, &pim_protocol::TagFetchScope::default()))])
}

pub async fn delete_tag(hctx: &HandlerContext<'_>, cmd: DeleteTagCommand) -> Result<Vec<Response>, HandlerError> {
    let removed = hctx
        .store()
        .remove_tag(cmd.id)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("no tag {}", cmd.id)))?;
    let remote_id = hctx.resource.as_ref().and_then(|r| removed.remote_id_for(r)).cloned();
    hctx.collector.tag_removed(hctx.session_id, removed.id, hctx.resource.clone(), remote_id);
    Ok(Vec::new())
}
