use crate::collection::{Collection, CollectionPart};
use crate::ids::{CollectionId, ItemId, ResourceId, SessionId, TagId};
use crate::item::{Flag, PimItem, Relation};
use crate::tag::Tag;
use std::collections::BTreeSet;

/// The change operation carried by every notification variant (§3
/// Notification). `ModifyFlags` and `ModifyTags` are disjoint at the
/// protocol level: a single item batch never reports both in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Add,
    Modify,
    Move,
    Remove,
    Link,
    Unlink,
    Subscribe,
    Unsubscribe,
    ModifyFlags,
    ModifyTags,
    ModifyRelations,
}

/// The kind of entity a notification or subscriber filter concerns (§4.5
/// "entity kinds").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Item,
    Collection,
    Tag,
    Relation,
    Subscription,
}

/// A reference to an item within a batch notification: identity plus the
/// minimum `id`/`remote-id`/`mime-type` triple that every subscriber can
/// filter on, optionally completed with the full record once an aggregated
/// fetch scope has been honored (§4.4 "Completion").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub id: ItemId,
    pub remote_id: crate::ids::RemoteId,
    pub mime_type: String,
    pub fetched: Option<PimItem>,
}

impl ItemRef {
    pub fn identity_only(id: ItemId, mime_type: impl Into<String>) -> Self {
        Self {
            id,
            remote_id: Default::default(),
            mime_type: mime_type.into(),
            fetched: None,
        }
    }
}

/// A reference to a collection within a notification, optionally completed
/// with the full record subject to the aggregated collection fetch scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef {
    pub id: CollectionId,
    pub fetched: Option<Collection>,
}

/// A reference to a tag within a notification, analogous to `CollectionRef`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub id: TagId,
    pub fetched: Option<Tag>,
}

/// Everything subscribers need to decide whether, and how much of, an item
/// batch change is relevant to them (§3 Notification: Item-change).
///
/// Invariant: `Operation::Add` implies every referenced item is observable
/// through the store at dispatch time. `Operation::Move` always carries both
/// `parent` (source) and `destination_parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChangeNotification {
    pub operation: Operation,
    pub session: SessionId,
    pub metadata: Option<String>,
    pub parent: CollectionId,
    pub destination_parent: Option<CollectionId>,
    pub resource: ResourceId,
    pub destination_resource: Option<ResourceId>,
    pub items: Vec<ItemRef>,
    /// Set when the collector could not resolve remote-ids to complete the
    /// fetch at dispatch time (§4.4): downstream observers must request the
    /// item on demand instead of trusting `items[..].fetched`.
    pub must_retrieve: bool,
    pub changed_parts: BTreeSet<Vec<u8>>,
    pub added_flags: BTreeSet<Flag>,
    pub removed_flags: BTreeSet<Flag>,
    pub added_tags: BTreeSet<TagId>,
    pub removed_tags: BTreeSet<TagId>,
    pub added_relations: Vec<Relation>,
    pub removed_relations: Vec<Relation>,
}

impl ItemChangeNotification {
    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.mime_type.as_str())
    }

    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.iter().map(|i| i.id)
    }
}

/// §3 Notification: Collection-change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionChangeNotification {
    pub operation: Operation,
    pub session: SessionId,
    pub metadata: Option<String>,
    pub collection: CollectionRef,
    pub source_parent: Option<CollectionId>,
    pub destination_parent: Option<CollectionId>,
    pub resource: ResourceId,
    pub destination_resource: Option<ResourceId>,
    pub changed_parts: BTreeSet<CollectionPart>,
}

/// §3 Notification: Tag-change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChangeNotification {
    pub operation: Operation,
    pub session: SessionId,
    pub metadata: Option<String>,
    pub tag: TagRef,
    /// Populated only for `Remove`, carrying the resource-specific remote id
    /// so agents can purge their own state (§10.7, `tagdeletehandler.cpp`).
    pub resource: Option<ResourceId>,
    pub remote_id: Option<crate::ids::RemoteId>,
}

/// §3 Notification: Relation-change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationChangeNotification {
    pub operation: Operation,
    pub session: SessionId,
    pub relation: Relation,
}

/// §3 Notification: Subscription-change (emitted alongside a
/// Collection-Modify when enablement toggles, §8 scenario 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChangeNotification {
    pub operation: Operation,
    pub session: SessionId,
    pub collection: CollectionRef,
    pub resource: ResourceId,
}

/// §3 Notification: Debug — enumerates which subscribers actually received
/// the wrapped notification (§4.5 "debug tracing", §10.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugNotification {
    pub about: Box<Notification>,
    pub listeners: Vec<String>,
}

/// The closed sum type dispatched at the session boundary and at the
/// coalescer/dispatcher entry (§9: "expressed as a closed sum type with one
/// visitor-style dispatcher", not deep inheritance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Item(ItemChangeNotification),
    Collection(CollectionChangeNotification),
    Tag(TagChangeNotification),
    Relation(RelationChangeNotification),
    Subscription(SubscriptionChangeNotification),
    Debug(DebugNotification),
}

impl Notification {
    pub fn kind(&self) -> EntityKind {
        match self {
            Notification::Item(_) => EntityKind::Item,
            Notification::Collection(_) => EntityKind::Collection,
            Notification::Tag(_) => EntityKind::Tag,
            Notification::Relation(_) => EntityKind::Relation,
            Notification::Subscription(_) => EntityKind::Subscription,
            Notification::Debug(inner) => inner.about.kind(),
        }
    }

    pub fn session(&self) -> SessionId {
        match self {
            Notification::Item(n) => n.session,
            Notification::Collection(n) => n.session,
            Notification::Tag(n) => n.session,
            Notification::Relation(n) => n.session,
            Notification::Subscription(n) => n.session,
            Notification::Debug(inner) => inner.about.session(),
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Notification::Item(n) => n.operation,
            Notification::Collection(n) => n.operation,
            Notification::Tag(n) => n.operation,
            Notification::Relation(n) => n.operation,
            Notification::Subscription(n) => n.operation,
            Notification::Debug(inner) => inner.about.operation(),
        }
    }

    /// Whether the notification carries no entities at all (§4.5 filtering
    /// step 2: such notifications are dropped outright).
    pub fn is_empty_of_entities(&self) -> bool {
        match self {
            Notification::Item(n) => n.items.is_empty(),
            Notification::Collection(_) | Notification::Tag(_) | Notification::Relation(_) => false,
            Notification::Subscription(_) => false,
            Notification::Debug(inner) => inner.about.is_empty_of_entities(),
        }
    }

    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            Notification::Item(n) => Some(&n.resource),
            Notification::Collection(n) => Some(&n.resource),
            Notification::Subscription(n) => Some(&n.resource),
            Notification::Tag(n) => n.resource.as_ref(),
            Notification::Relation(_) => None,
            Notification::Debug(inner) => inner.about.resource(),
        }
    }

    pub fn destination_resource(&self) -> Option<&ResourceId> {
        match self {
            Notification::Item(n) => n.destination_resource.as_ref(),
            Notification::Collection(n) => n.destination_resource.as_ref(),
            _ => None,
        }
    }
}
