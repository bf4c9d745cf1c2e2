//! Subscription command family (§4.5, §4.7): translates the wire filter
//! shape into [`SubscriberFilter`] and registers/updates/drops a subscriber
//! on the shared [`NotificationManager`]. Unlike every other handler family
//! these run synchronously — registration never touches the store.

use std::collections::BTreeSet;
use std::sync::Arc;

use pim_model::{CollectionId, EntityKind, ItemId, ResourceId, SessionId, TagId};
use pim_protocol::{
    CommandKind, CreateSubscriptionCommand, DeleteSubscriptionCommand, ModifySubscriptionCommand, Response,
    SubscriberFilterWire,
};

use crate::error::HandlerError;
use crate::handlers::HandlerContext;
use crate::notify::subscriber::{ChannelTransport, SubscriberFilter};

fn translate_filter(wire: SubscriberFilterWire) -> SubscriberFilter {
    let monitored_kinds: BTreeSet<EntityKind> = wire
        .monitored_kinds
        .into_iter()
        .filter_map(|byte| pim_protocol::entity_kind_for_command_kind(CommandKind::from_u8(byte)))
        .collect();

    SubscriberFilter {
        all_monitored: wire.all_monitored,
        monitored_collections: wire.monitored_collections.into_iter().map(CollectionId).collect(),
        monitored_items: wire.monitored_items.into_iter().map(ItemId).collect(),
        monitored_tags: wire.monitored_tags.into_iter().map(TagId).collect(),
        monitored_resources: wire.monitored_resources.into_iter().map(ResourceId).collect(),
        monitored_mime_types: wire.monitored_mime_types,
        monitored_kinds,
        ignored_sessions: wire.ignored_sessions.into_iter().map(SessionId).collect(),
        exclusive: wire.exclusive,
    }
}

pub fn create_subscription(hctx: &HandlerContext<'_>, cmd: CreateSubscriptionCommand) -> Result<Vec<Response>, HandlerError> {
    let item_scope = cmd.filter.item_fetch_scope.clone();
    let collection_scope = cmd.filter.collection_fetch_scope.clone();
    let tag_scope = cmd.filter.tag_fetch_scope.clone();
    let filter = translate_filter(cmd.filter);
    let transport = ChannelTransport::new(hctx.notification_tx.clone());

    hctx.ctx.manager.add_subscriber_with_scopes(
        cmd.name,
        filter,
        item_scope,
        collection_scope,
        tag_scope,
        Arc::new(transport),
        false,
    );
    Ok(Vec::new())
}

pub fn modify_subscription(hctx: &HandlerContext<'_>, cmd: ModifySubscriptionCommand) -> Result<Vec<Response>, HandlerError> {
    let item_scope = cmd.filter.item_fetch_scope.clone();
    let collection_scope = cmd.filter.collection_fetch_scope.clone();
    let tag_scope = cmd.filter.tag_fetch_scope.clone();
    let filter = translate_filter(cmd.filter);
    hctx.ctx.manager.modify_subscriber(&cmd.name, filter, item_scope, collection_scope, tag_scope);
    Ok(Vec::new())
}

pub fn delete_subscription(hctx: &HandlerContext<'_>, cmd: DeleteSubscriptionCommand) -> Result<Vec<Response>, HandlerError> {
    hctx.ctx.manager.remove_subscriber(&cmd.name);
    Ok(Vec::new())
}
