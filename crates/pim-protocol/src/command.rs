//! Command payloads (§4.1, §6). Each variant is encoded/decoded through the
//! shared [`Encoder`]/[`Decoder`] primitives; nothing here can fail to
//! encode, and decoding only fails on a genuinely truncated or malformed
//! frame (§4.1 contract).

use crate::buffer::{Decoder, Encoder};
use crate::error::CodecError;
use crate::fetch_scope::{CollectionFetchScope, ItemFetchScope, TagFetchScope};
use crate::scope_wire::{read_scope, write_scope};
use pim_model::{CollectionId, ResourceId, Scope, TagId, Tristate};
use std::collections::BTreeSet;

fn read_tristate(dec: &mut Decoder<'_>) -> Result<Tristate, CodecError> {
    Ok(match dec.read_u8()? {
        0 => Tristate::True,
        1 => Tristate::False,
        _ => Tristate::Undefined,
    })
}

fn write_tristate(enc: &mut Encoder, t: Tristate) {
    enc.write_u8(match t {
        Tristate::True => 0,
        Tristate::False => 1,
        Tristate::Undefined => 2,
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCommand {
    pub resource: Option<ResourceId>,
    pub protocol_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectCommand {
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchItemsCommand {
    pub scope: Scope,
    pub fetch_scope: ItemFetchScope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTagsCommand {
    pub scope: Scope,
    pub fetch_scope: TagFetchScope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCollectionStatsCommand {
    pub collection: CollectionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItemCommand {
    pub parent_collection: CollectionId,
    pub mime_type: String,
    pub remote_id: Option<String>,
    pub flags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyItemCommand {
    pub scope: Scope,
    pub parts: Vec<(String, Vec<u8>)>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteItemCommand {
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveItemCommand {
    pub scope: Scope,
    pub destination: CollectionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkItemsCommand {
    pub scope: Scope,
    pub destination: CollectionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlinkItemsCommand {
    pub scope: Scope,
    pub destination: CollectionId,
}

/// A declarative change set for `ModifyCollection` (§4.7).
///
/// Each field is `None` when the client left it untouched; only present
/// fields contribute to the handler's changed-parts computation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionChangeSet {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub sync_pref: Option<Tristate>,
    pub display_pref: Option<Tristate>,
    pub index_pref: Option<Tristate>,
    pub attributes: Vec<(Vec<u8>, Vec<u8>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCollectionCommand {
    pub parent: CollectionId,
    pub name: String,
    pub resource: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyCollectionCommand {
    pub id: CollectionId,
    pub changes: CollectionChangeSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCollectionCommand {
    pub id: CollectionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCollectionCommand {
    pub id: CollectionId,
    pub destination: CollectionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTagCommand {
    pub tag_type: String,
    pub parent: Option<TagId>,
    pub gid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyTagCommand {
    pub id: TagId,
    pub attributes: Vec<(Vec<u8>, Vec<u8>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTagCommand {
    /// §4.7: delete-tag resolves by UID only.
    pub id: TagId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFilterWire {
    pub all_monitored: bool,
    pub monitored_collections: BTreeSet<i64>,
    pub monitored_items: BTreeSet<i64>,
    pub monitored_tags: BTreeSet<i64>,
    pub monitored_resources: BTreeSet<String>,
    pub monitored_mime_types: BTreeSet<String>,
    pub monitored_kinds: BTreeSet<u8>,
    pub ignored_sessions: BTreeSet<u64>,
    pub exclusive: bool,
    pub item_fetch_scope: ItemFetchScope,
    pub collection_fetch_scope: CollectionFetchScope,
    pub tag_fetch_scope: TagFetchScope,
}

impl Default for SubscriberFilterWire {
    fn default() -> Self {
        Self {
            all_monitored: false,
            monitored_collections: BTreeSet::new(),
            monitored_items: BTreeSet::new(),
            monitored_tags: BTreeSet::new(),
            monitored_resources: BTreeSet::new(),
            monitored_mime_types: BTreeSet::new(),
            monitored_kinds: BTreeSet::new(),
            ignored_sessions: BTreeSet::new(),
            exclusive: false,
            item_fetch_scope: ItemFetchScope::default(),
            collection_fetch_scope: CollectionFetchScope::default(),
            tag_fetch_scope: TagFetchScope::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSubscriptionCommand {
    pub name: String,
    pub filter: SubscriberFilterWire,
    pub protocol_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifySubscriptionCommand {
    pub name: String,
    pub filter: SubscriberFilterWire,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteSubscriptionCommand {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultCommand {
    pub search_id: String,
    pub resource: ResourceId,
    pub remote_ids: Vec<String>,
}

/// The closed set of client-issued commands (§4.1). `Invalid` is the
/// fallback constructed by the factory for an unrecognized type byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(LoginCommand),
    Logout,
    Capability,
    Select(SelectCommand),
    FetchItems(FetchItemsCommand),
    FetchTags(FetchTagsCommand),
    FetchCollectionStats(FetchCollectionStatsCommand),
    CreateItem(CreateItemCommand),
    ModifyItem(ModifyItemCommand),
    DeleteItem(DeleteItemCommand),
    MoveItem(MoveItemCommand),
    LinkItems(LinkItemsCommand),
    UnlinkItems(UnlinkItemsCommand),
    CreateCollection(CreateCollectionCommand),
    ModifyCollection(ModifyCollectionCommand),
    DeleteCollection(DeleteCollectionCommand),
    MoveCollection(MoveCollectionCommand),
    CreateTag(CreateTagCommand),
    ModifyTag(ModifyTagCommand),
    DeleteTag(DeleteTagCommand),
    CreateSubscription(CreateSubscriptionCommand),
    ModifySubscription(ModifySubscriptionCommand),
    DeleteSubscription(DeleteSubscriptionCommand),
    SearchResult(SearchResultCommand),
    Invalid,
}

impl Command {
    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Command::Login(c) => {
                enc.write_option(&c.resource, |e, r| e.write_str(&r.0));
                enc.write_u32(c.protocol_version);
            }
            Command::Logout | Command::Capability | Command::Invalid => {}
            Command::Select(c) => write_scope(enc, &c.scope),
            Command::FetchItems(c) => {
                write_scope(enc, &c.scope);
                c.fetch_scope.encode(enc);
            }
            Command::FetchTags(c) => {
                write_scope(enc, &c.scope);
                c.fetch_scope.encode(enc);
            }
            Command::FetchCollectionStats(c) => enc.write_i64(c.collection.get()),
            Command::CreateItem(c) => {
                enc.write_i64(c.parent_collection.get());
                enc.write_str(&c.mime_type);
                enc.write_option(&c.remote_id, |e, v| e.write_str(v));
                enc.write_list(&c.flags.iter().cloned().collect::<Vec<_>>(), |e, f| {
                    e.write_str(f)
                });
            }
            Command::ModifyItem(c) => {
                write_scope(enc, &c.scope);
                enc.write_list(&c.parts, |e, (name, data)| {
                    e.write_str(name);
                    e.write_bytes(data);
                });
                enc.write_bool(c.dirty);
            }
            Command::DeleteItem(c) => write_scope(enc, &c.scope),
            Command::MoveItem(c) => {
                write_scope(enc, &c.scope);
                enc.write_i64(c.destination.get());
            }
            Command::LinkItems(c) => {
                write_scope(enc, &c.scope);
                enc.write_i64(c.destination.get());
            }
            Command::UnlinkItems(c) => {
                write_scope(enc, &c.scope);
                enc.write_i64(c.destination.get());
            }
            Command::CreateCollection(c) => {
                enc.write_i64(c.parent.get());
                enc.write_str(&c.name);
                enc.write_str(&c.resource.0);
            }
            Command::ModifyCollection(c) => {
                enc.write_i64(c.id.get());
                encode_collection_change_set(enc, &c.changes);
            }
            Command::DeleteCollection(c) => enc.write_i64(c.id.get()),
            Command::MoveCollection(c) => {
                enc.write_i64(c.id.get());
                enc.write_i64(c.destination.get());
            }
            Command::CreateTag(c) => {
                enc.write_str(&c.tag_type);
                enc.write_option(&c.parent, |e, p| e.write_i64(p.get()));
                enc.write_option(&c.gid, |e, g| e.write_str(g));
            }
            Command::ModifyTag(c) => {
                enc.write_i64(c.id.get());
                enc.write_list(&c.attributes, |e, (k, v)| {
                    e.write_bytes(k);
                    e.write_bytes(v);
                });
            }
            Command::DeleteTag(c) => enc.write_i64(c.id.get()),
            Command::CreateSubscription(c) => {
                enc.write_str(&c.name);
                encode_subscriber_filter(enc, &c.filter);
                enc.write_u32(c.protocol_version);
            }
            Command::ModifySubscription(c) => {
                enc.write_str(&c.name);
                encode_subscriber_filter(enc, &c.filter);
            }
            Command::DeleteSubscription(c) => enc.write_str(&c.name),
            Command::SearchResult(c) => {
                enc.write_str(&c.search_id);
                enc.write_str(&c.resource.0);
                enc.write_list(&c.remote_ids, |e, r| e.write_str(r));
            }
        }
    }

    pub fn decode(kind: super::frame::CommandKind, dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        use super::frame::CommandKind as K;
        Ok(match kind {
            K::Login => Command::Login(LoginCommand {
                resource: dec.read_option(|d| d.read_str().map(ResourceId))?,
                protocol_version: dec.read_u32()?,
            }),
            K::Logout => Command::Logout,
            K::Capability => Command::Capability,
            K::Select => Command::Select(SelectCommand { scope: read_scope(dec)? }),
            K::FetchItems => Command::FetchItems(FetchItemsCommand {
                scope: read_scope(dec)?,
                fetch_scope: ItemFetchScope::decode(dec)?,
            }),
            K::FetchTags => Command::FetchTags(FetchTagsCommand {
                scope: read_scope(dec)?,
                fetch_scope: TagFetchScope::decode(dec)?,
            }),
            K::FetchCollectionStats => Command::FetchCollectionStats(FetchCollectionStatsCommand {
                collection: CollectionId(dec.read_i64()?),
            }),
            K::CreateItem => Command::CreateItem(CreateItemCommand {
                parent_collection: CollectionId(dec.read_i64()?),
                mime_type: dec.read_str()?,
                remote_id: dec.read_option(|d| d.read_str())?,
                flags: dec.read_list(|d| d.read_str())?.into_iter().collect(),
            }),
            K::ModifyItem => Command::ModifyItem(ModifyItemCommand {
                scope: read_scope(dec)?,
                parts: dec.read_list(|d| Ok((d.read_str()?, d.read_bytes()?)))?,
                dirty: dec.read_bool()?,
            }),
            K::DeleteItem => Command::DeleteItem(DeleteItemCommand { scope: read_scope(dec)? }),
            K::MoveItem => Command::MoveItem(MoveItemCommand {
                scope: read_scope(dec)?,
                destination: CollectionId(dec.read_i64()?),
            }),
            K::LinkItems => Command::LinkItems(LinkItemsCommand {
                scope: read_scope(dec)?,
                destination: CollectionId(dec.read_i64()?),
            }),
            K::UnlinkItems => Command::UnlinkItems(UnlinkItemsCommand {
                scope: read_scope(dec)?,
                destination: CollectionId(dec.read_i64()?),
            }),
            K::CreateCollection => Command::CreateCollection(CreateCollectionCommand {
                parent: CollectionId(dec.read_i64()?),
                name: dec.read_str()?,
                resource: ResourceId(dec.read_str()?),
            }),
            K::ModifyCollection => Command::ModifyCollection(ModifyCollectionCommand {
                id: CollectionId(dec.read_i64()?),
                changes: decode_collection_change_set(dec)?,
            }),
            K::DeleteCollection => Command::DeleteCollection(DeleteCollectionCommand {
                id: CollectionId(dec.read_i64()?),
            }),
            K::MoveCollection => Command::MoveCollection(MoveCollectionCommand {
                id: CollectionId(dec.read_i64()?),
                destination: CollectionId(dec.read_i64()?),
            }),
            K::CreateTag => Command::CreateTag(CreateTagCommand {
                tag_type: dec.read_str()?,
                parent: dec.read_option(|d| Ok(TagId(d.read_i64()?)))?,
                gid: dec.read_option(|d| d.read_str())?,
            }),
            K::ModifyTag => Command::ModifyTag(ModifyTagCommand {
                id: TagId(dec.read_i64()?),
                attributes: dec.read_list(|d| Ok((d.read_bytes()?, d.read_bytes()?)))?,
            }),
            K::DeleteTag => Command::DeleteTag(DeleteTagCommand { id: TagId(dec.read_i64()?) }),
            K::CreateSubscription => Command::CreateSubscription(CreateSubscriptionCommand {
                name: dec.read_str()?,
                filter: decode_subscriber_filter(dec)?,
                protocol_version: dec.read_u32()?,
            }),
            K::ModifySubscription => Command::ModifySubscription(ModifySubscriptionCommand {
                name: dec.read_str()?,
                filter: decode_subscriber_filter(dec)?,
            }),
            K::DeleteSubscription => Command::DeleteSubscription(DeleteSubscriptionCommand {
                name: dec.read_str()?,
            }),
            K::SearchResult => Command::SearchResult(SearchResultCommand {
                search_id: dec.read_str()?,
                resource: ResourceId(dec.read_str()?),
                remote_ids: dec.read_list(|d| d.read_str())?,
            }),
            K::Invalid
            | K::Hello
            | K::ItemChangeNotification
            | K::CollectionChangeNotification
            | K::TagChangeNotification
            | K::RelationChangeNotification
            | K::SubscriptionChangeNotification
            | K::DebugChangeNotification => Command::Invalid,
        })
    }
}

fn encode_collection_change_set(enc: &mut Encoder, c: &CollectionChangeSet) {
    enc.write_option(&c.name, |e, v| e.write_str(v));
    enc.write_option(&c.enabled, |e, v| e.write_bool(*v));
    enc.write_option(&c.sync_pref, |e, v| write_tristate(e, *v));
    enc.write_option(&c.display_pref, |e, v| write_tristate(e, *v));
    enc.write_option(&c.index_pref, |e, v| write_tristate(e, *v));
    enc.write_list(&c.attributes, |e, (k, v)| {
        e.write_bytes(k);
        e.write_bytes(v);
    });
}

fn decode_collection_change_set(dec: &mut Decoder<'_>) -> Result<CollectionChangeSet, CodecError> {
    Ok(CollectionChangeSet {
        name: dec.read_option(|d| d.read_str())?,
        enabled: dec.read_option(|d| d.read_bool())?,
        sync_pref: dec.read_option(read_tristate)?,
        display_pref: dec.read_option(read_tristate)?,
        index_pref: dec.read_option(read_tristate)?,
        attributes: dec.read_list(|d| Ok((d.read_bytes()?, d.read_bytes()?)))?,
    })
}

fn encode_subscriber_filter(enc: &mut Encoder, f: &SubscriberFilterWire) {
    enc.write_bool(f.all_monitored);
    enc.write_list(&f.monitored_collections.iter().copied().collect::<Vec<_>>(), |e, v| e.write_i64(*v));
    enc.write_list(&f.monitored_items.iter().copied().collect::<Vec<_>>(), |e, v| e.write_i64(*v));
    enc.write_list(&f.monitored_tags.iter().copied().collect::<Vec<_>>(), |e, v| e.write_i64(*v));
    enc.write_list(&f.monitored_resources.iter().cloned().collect::<Vec<_>>(), |e, v| e.write_str(v));
    enc.write_list(&f.monitored_mime_types.iter().cloned().collect::<Vec<_>>(), |e, v| e.write_str(v));
    enc.write_list(&f.monitored_kinds.iter().copied().collect::<Vec<_>>(), |e, v| e.write_u8(*v));
    enc.write_list(&f.ignored_sessions.iter().copied().collect::<Vec<_>>(), |e, v| e.write_u64(*v));
    enc.write_bool(f.exclusive);
    f.item_fetch_scope.encode(enc);
    f.collection_fetch_scope.encode(enc);
    f.tag_fetch_scope.encode(enc);
}

fn decode_subscriber_filter(dec: &mut Decoder<'_>) -> Result<SubscriberFilterWire, CodecError> {
    Ok(SubscriberFilterWire {
        all_monitored: dec.read_bool()?,
        monitored_collections: dec.read_list(|d| d.read_i64())?.into_iter().collect(),
        monitored_items: dec.read_list(|d| d.read_i64())?.into_iter().collect(),
        monitored_tags: dec.read_list(|d| d.read_i64())?.into_iter().collect(),
        monitored_resources: dec.read_list(|d| d.read_str())?.into_iter().collect(),
        monitored_mime_types: dec.read_list(|d| d.read_str())?.into_iter().collect(),
        monitored_kinds: dec.read_list(|d| d.read_u8())?.into_iter().collect(),
        ignored_sessions: dec.read_list(|d| d.read_u64())?.into_iter().collect(),
        exclusive: dec.read_bool()?,
        item_fetch_scope: ItemFetchScope::decode(dec)?,
        collection_fetch_scope: CollectionFetchScope::decode(dec)?,
        tag_fetch_scope: TagFetchScope::decode(dec)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CommandKind;

    #[test]
    fn modify_collection_round_trips() {
        let cmd = Command::ModifyCollection(ModifyCollectionCommand {
            id: CollectionId(5),
            changes: CollectionChangeSet {
                name: Some("New Name".into()),
                enabled: None,
                sync_pref: None,
                display_pref: None,
                index_pref: None,
                attributes: vec![],
            },
        });
        let mut enc = Encoder::new();
        cmd.encode(&mut enc);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(Command::decode(CommandKind::ModifyCollection, &mut dec).unwrap(), cmd);
    }

    #[test]
    fn delete_tag_resolves_by_uid_only() {
        let cmd = Command::DeleteTag(DeleteTagCommand { id: TagId(42) });
        let mut enc = Encoder::new();
        cmd.encode(&mut enc);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(Command::decode(CommandKind::DeleteTag, &mut dec).unwrap(), cmd);
    }
}
