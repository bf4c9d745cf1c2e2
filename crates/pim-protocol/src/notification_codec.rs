//! Wire encoding for [`pim_model::Notification`] (§3, §4.4). Distinct from
//! [`crate::response`]: a notification frame is self-contained (no tag to
//! correlate against) and embeds whichever entities the collector managed to
//! complete (§4.4 "Completion") rather than streaming one-entity-per-frame.

use crate::buffer::{Decoder, Encoder};
use crate::error::CodecError;
use pim_model::{
    Collection, CollectionChangeNotification, CollectionId, CollectionPart, CollectionRef,
    DebugNotification, EntityKind, ItemChangeNotification, ItemId, ItemRef, Notification,
    Operation, PimItem, Relation, RelationChangeNotification, RelationId, RemoteId, ResourceId,
    SessionId, SubscriptionChangeNotification, Tag, TagChangeNotification, TagId, TagRef,
};

fn write_operation(enc: &mut Encoder, op: Operation) {
    enc.write_u8(match op {
        Operation::Add => 0,
        Operation::Modify => 1,
        Operation::Move => 2,
        Operation::Remove => 3,
        Operation::Link => 4,
        Operation::Unlink => 5,
        Operation::Subscribe => 6,
        Operation::Unsubscribe => 7,
        Operation::ModifyFlags => 8,
        Operation::ModifyTags => 9,
        Operation::ModifyRelations => 10,
    });
}

fn read_operation(dec: &mut Decoder<'_>) -> Result<Operation, CodecError> {
    Ok(match dec.read_u8()? {
        0 => Operation::Add,
        1 => Operation::Modify,
        2 => Operation::Move,
        3 => Operation::Remove,
        4 => Operation::Link,
        5 => Operation::Unlink,
        6 => Operation::Subscribe,
        7 => Operation::Unsubscribe,
        8 => Operation::ModifyFlags,
        9 => Operation::ModifyTags,
        10 => Operation::ModifyRelations,
        other => {
            return Err(CodecError::UnknownDiscriminant {
                context: "Operation",
                discriminant: other as u32,
            })
        }
    })
}

fn write_session(enc: &mut Encoder, s: SessionId) {
    enc.write_u64(s.0);
}

fn read_session(dec: &mut Decoder<'_>) -> Result<SessionId, CodecError> {
    Ok(SessionId(dec.read_u64()?))
}

fn write_collection_part(enc: &mut Encoder, part: &CollectionPart) {
    match part {
        CollectionPart::Name => enc.write_u8(0),
        CollectionPart::ParentId => enc.write_u8(1),
        CollectionPart::RemoteId => enc.write_u8(2),
        CollectionPart::RemoteRevision => enc.write_u8(3),
        CollectionPart::MimeTypes => enc.write_u8(4),
        CollectionPart::CachePolicy => enc.write_u8(5),
        CollectionPart::Enabled => enc.write_u8(6),
        CollectionPart::SyncPref => enc.write_u8(7),
        CollectionPart::DisplayPref => enc.write_u8(8),
        CollectionPart::IndexPref => enc.write_u8(9),
        CollectionPart::Attribute(name) => {
            enc.write_u8(10);
            enc.write_bytes(name);
        }
    }
}

fn read_collection_part(dec: &mut Decoder<'_>) -> Result<CollectionPart, CodecError> {
    Ok(match dec.read_u8()? {
        0 => CollectionPart::Name,
        1 => CollectionPart::ParentId,
        2 => CollectionPart::RemoteId,
        3 => CollectionPart::RemoteRevision,
        4 => CollectionPart::MimeTypes,
        5 => CollectionPart::CachePolicy,
        6 => CollectionPart::Enabled,
        7 => CollectionPart::SyncPref,
        8 => CollectionPart::DisplayPref,
        9 => CollectionPart::IndexPref,
        10 => CollectionPart::Attribute(dec.read_bytes()?),
        other => {
            return Err(CodecError::UnknownDiscriminant {
                context: "CollectionPart",
                discriminant: other as u32,
            })
        }
    })
}

fn write_collection(enc: &mut Encoder, c: &Collection) {
    enc.write_i64(c.id.get());
    enc.write_option(&c.parent_id, |e, p| e.write_i64(p.get()));
    enc.write_str(&c.resource.0);
    enc.write_str(&c.name);
    enc.write_str(&c.remote_id.0);
    enc.write_list(&c.content_mime_types.iter().cloned().collect::<Vec<_>>(), |e, m| e.write_str(m));
    enc.write_bool(c.virtual_);
    enc.write_bool(c.enabled);
}

fn read_collection(dec: &mut Decoder<'_>) -> Result<Collection, CodecError> {
    use pim_model::{AttributeMap, CachePolicy, ViewPreferences};
    let id = CollectionId(dec.read_i64()?);
    let parent_id = dec.read_option(|d| Ok(CollectionId(d.read_i64()?)))?;
    let resource = ResourceId(dec.read_str()?);
    let name = dec.read_str()?;
    let remote_id = RemoteId(dec.read_str()?);
    let content_mime_types = dec.read_list(|d| d.read_str())?.into_iter().collect();
    let virtual_ = dec.read_bool()?;
    let enabled = dec.read_bool()?;
    Ok(Collection {
        id,
        parent_id,
        resource,
        name,
        remote_id,
        remote_revision: None,
        content_mime_types,
        cache_policy: CachePolicy::default(),
        virtual_,
        query: None,
        enabled,
        view_preferences: ViewPreferences::default(),
        attributes: AttributeMap::default(),
    })
}

fn write_tag(enc: &mut Encoder, t: &Tag) {
    enc.write_i64(t.id.get());
    enc.write_str(&t.gid.0);
    enc.write_option(&t.parent, |e, p| e.write_i64(p.get()));
    enc.write_str(&t.tag_type);
}

fn read_tag(dec: &mut Decoder<'_>) -> Result<Tag, CodecError> {
    use pim_model::{AttributeMap, Gid};
    use std::collections::BTreeMap;
    let id = TagId(dec.read_i64()?);
    let gid = Gid(dec.read_str()?);
    let parent = dec.read_option(|d| Ok(TagId(d.read_i64()?)))?;
    let tag_type = dec.read_str()?;
    Ok(Tag {
        id,
        gid,
        parent,
        tag_type,
        attributes: AttributeMap::default(),
        remote_ids: BTreeMap::new(),
    })
}

fn write_item(enc: &mut Encoder, i: &PimItem) {
    enc.write_i64(i.id.get());
    enc.write_i64(i.parent_collection.get());
    enc.write_str(&i.resource.0);
    enc.write_str(&i.remote_id.0);
    enc.write_str(&i.mime_type);
    enc.write_u64(i.revision);
    enc.write_u64(i.size);
    enc.write_list(&i.flags.iter().cloned().collect::<Vec<_>>(), |e, f| e.write_str(f));
}

fn read_item(dec: &mut Decoder<'_>) -> Result<PimItem, CodecError> {
    use std::time::SystemTime;
    let id = ItemId(dec.read_i64()?);
    let parent_collection = CollectionId(dec.read_i64()?);
    let resource = ResourceId(dec.read_str()?);
    let remote_id = RemoteId(dec.read_str()?);
    let mime_type = dec.read_str()?;
    let revision = dec.read_u64()?;
    let size = dec.read_u64()?;
    let flags = dec.read_list(|d| d.read_str())?.into_iter().collect();
    Ok(PimItem {
        id,
        parent_collection,
        resource,
        remote_id,
        remote_revision: None,
        mime_type,
        revision,
        gid: None,
        size,
        mtime: SystemTime::UNIX_EPOCH,
        atime: None,
        flags,
        tags: Default::default(),
        parts: Vec::new(),
    })
}

fn write_item_ref(enc: &mut Encoder, r: &ItemRef) {
    enc.write_i64(r.id.get());
    enc.write_str(&r.remote_id.0);
    enc.write_str(&r.mime_type);
    enc.write_option(&r.fetched, |e, f| write_item(e, f));
}

fn read_item_ref(dec: &mut Decoder<'_>) -> Result<ItemRef, CodecError> {
    Ok(ItemRef {
        id: ItemId(dec.read_i64()?),
        remote_id: RemoteId(dec.read_str()?),
        mime_type: dec.read_str()?,
        fetched: dec.read_option(read_item)?,
    })
}

fn write_collection_ref(enc: &mut Encoder, r: &CollectionRef) {
    enc.write_i64(r.id.get());
    enc.write_option(&r.fetched, |e, f| write_collection(e, f));
}

fn read_collection_ref(dec: &mut Decoder<'_>) -> Result<CollectionRef, CodecError> {
    Ok(CollectionRef {
        id: CollectionId(dec.read_i64()?),
        fetched: dec.read_option(read_collection)?,
    })
}

fn write_tag_ref(enc: &mut Encoder, r: &TagRef) {
    enc.write_i64(r.id.get());
    enc.write_option(&r.fetched, |e, f| write_tag(e, f));
}

fn read_tag_ref(dec: &mut Decoder<'_>) -> Result<TagRef, CodecError> {
    Ok(TagRef {
        id: TagId(dec.read_i64()?),
        fetched: dec.read_option(read_tag)?,
    })
}

fn write_relation(enc: &mut Encoder, r: &Relation) {
    enc.write_i64(r.id.get());
    enc.write_i64(r.left.get());
    enc.write_i64(r.right.get());
    enc.write_str(&r.relation_type);
    enc.write_option(&r.remote_id, |e, v| e.write_str(&v.0));
}

fn read_relation(dec: &mut Decoder<'_>) -> Result<Relation, CodecError> {
    Ok(Relation {
        id: RelationId(dec.read_i64()?),
        left: ItemId(dec.read_i64()?),
        right: ItemId(dec.read_i64()?),
        relation_type: dec.read_str()?,
        remote_id: dec.read_option(|d| d.read_str().map(RemoteId))?,
    })
}

pub fn encode_notification(enc: &mut Encoder, n: &Notification) {
    match n {
        Notification::Item(inner) => {
            write_operation(enc, inner.operation);
            write_session(enc, inner.session);
            enc.write_option(&inner.metadata, |e, m| e.write_str(m));
            enc.write_i64(inner.parent.get());
            enc.write_option(&inner.destination_parent, |e, p| e.write_i64(p.get()));
            enc.write_str(&inner.resource.0);
            enc.write_option(&inner.destination_resource, |e, r| e.write_str(&r.0));
            enc.write_list(&inner.items, |e, i| write_item_ref(e, i));
            enc.write_bool(inner.must_retrieve);
            enc.write_list(&inner.changed_parts.iter().cloned().collect::<Vec<_>>(), |e, p| e.write_bytes(p));
            enc.write_list(&inner.added_flags.iter().cloned().collect::<Vec<_>>(), |e, f| e.write_str(f));
            enc.write_list(&inner.removed_flags.iter().cloned().collect::<Vec<_>>(), |e, f| e.write_str(f));
            enc.write_list(&inner.added_tags.iter().map(|t| t.get()).collect::<Vec<_>>(), |e, t| e.write_i64(*t));
            enc.write_list(&inner.removed_tags.iter().map(|t| t.get()).collect::<Vec<_>>(), |e, t| e.write_i64(*t));
            enc.write_list(&inner.added_relations, |e, r| write_relation(e, r));
            enc.write_list(&inner.removed_relations, |e, r| write_relation(e, r));
        }
        Notification::Collection(inner) => {
            write_operation(enc, inner.operation);
            write_session(enc, inner.session);
            enc.write_option(&inner.metadata, |e, m| e.write_str(m));
            write_collection_ref(enc, &inner.collection);
            enc.write_option(&inner.source_parent, |e, p| e.write_i64(p.get()));
            enc.write_option(&inner.destination_parent, |e, p| e.write_i64(p.get()));
            enc.write_str(&inner.resource.0);
            enc.write_option(&inner.destination_resource, |e, r| e.write_str(&r.0));
            enc.write_list(&inner.changed_parts.iter().cloned().collect::<Vec<_>>(), |e, p| write_collection_part(e, p));
        }
        Notification::Tag(inner) => {
            write_operation(enc, inner.operation);
            write_session(enc, inner.session);
            enc.write_option(&inner.metadata, |e, m| e.write_str(m));
            write_tag_ref(enc, &inner.tag);
            enc.write_option(&inner.resource, |e, r| e.write_str(&r.0));
            enc.write_option(&inner.remote_id, |e, r| e.write_str(&r.0));
        }
        Notification::Relation(inner) => {
            write_operation(enc, inner.operation);
            write_session(enc, inner.session);
            write_relation(enc, &inner.relation);
        }
        Notification::Subscription(inner) => {
            write_operation(enc, inner.operation);
            write_session(enc, inner.session);
            write_collection_ref(enc, &inner.collection);
            enc.write_str(&inner.resource.0);
        }
        Notification::Debug(inner) => {
            encode_notification(enc, &inner.about);
            enc.write_list(&inner.listeners, |e, l| e.write_str(l));
        }
    }
}

pub fn decode_notification(kind: EntityKind, dec: &mut Decoder<'_>) -> Result<Notification, CodecError> {
    Ok(match kind {
        EntityKind::Item => Notification::Item(ItemChangeNotification {
            operation: read_operation(dec)?,
            session: read_session(dec)?,
            metadata: dec.read_option(|d| d.read_str())?,
            parent: CollectionId(dec.read_i64()?),
            destination_parent: dec.read_option(|d| Ok(CollectionId(d.read_i64()?)))?,
            resource: ResourceId(dec.read_str()?),
            destination_resource: dec.read_option(|d| d.read_str().map(ResourceId))?,
            items: dec.read_list(read_item_ref)?,
            must_retrieve: dec.read_bool()?,
            changed_parts: dec.read_list(|d| d.read_bytes())?.into_iter().collect(),
            added_flags: dec.read_list(|d| d.read_str())?.into_iter().collect(),
            removed_flags: dec.read_list(|d| d.read_str())?.into_iter().collect(),
            added_tags: dec.read_list(|d| Ok(TagId(d.read_i64()?)))?.into_iter().collect(),
            removed_tags: dec.read_list(|d| Ok(TagId(d.read_i64()?)))?.into_iter().collect(),
            added_relations: dec.read_list(read_relation)?,
            removed_relations: dec.read_list(read_relation)?,
        }),
        EntityKind::Collection => Notification::Collection(CollectionChangeNotification {
            operation: read_operation(dec)?,
            session: read_session(dec)?,
            metadata: dec.read_option(|d| d.read_str())?,
            collection: read_collection_ref(dec)?,
            source_parent: dec.read_option(|d| Ok(CollectionId(d.read_i64()?)))?,
            destination_parent: dec.read_option(|d| Ok(CollectionId(d.read_i64()?)))?,
            resource: ResourceId(dec.read_str()?),
            destination_resource: dec.read_option(|d| d.read_str().map(ResourceId))?,
            changed_parts: dec.read_list(read_collection_part)?.into_iter().collect(),
        }),
        EntityKind::Tag => Notification::Tag(TagChangeNotification {
            operation: read_operation(dec)?,
            session: read_session(dec)?,
            metadata: dec.read_option(|d| d.read_str())?,
            tag: read_tag_ref(dec)?,
            resource: dec.read_option(|d| d.read_str().map(ResourceId))?,
            remote_id: dec.read_option(|d| d.read_str().map(RemoteId))?,
        }),
        EntityKind::Relation => Notification::Relation(RelationChangeNotification {
            operation: read_operation(dec)?,
            session: read_session(dec)?,
            relation: read_relation(dec)?,
        }),
        EntityKind::Subscription => Notification::Subscription(SubscriptionChangeNotification {
            operation: read_operation(dec)?,
            session: read_session(dec)?,
            collection: read_collection_ref(dec)?,
            resource: ResourceId(dec.read_str()?),
        }),
    })
}

/// The `Debug` wrapper (§10.7) is not itself an [`EntityKind`]; callers that
/// know the frame is a debug notification decode the wrapped kind first and
/// then the listener list.
pub fn decode_debug_notification(inner_kind: EntityKind, dec: &mut Decoder<'_>) -> Result<Notification, CodecError> {
    let about = decode_notification(inner_kind, dec)?;
    let listeners = dec.read_list(|d| d.read_str())?;
    Ok(Notification::Debug(DebugNotification {
        about: Box::new(about),
        listeners,
    }))
}
