//! Subscriber model (C5, §4.5 "Subscription model"): what a single
//! `CreateSubscription` registers, and the transport abstraction dispatch
//! delivers notifications through.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use pim_model::{CollectionId, EntityKind, ItemId, Notification, ResourceId, SessionId, TagId};
use pim_protocol::{CollectionFetchScope, ItemFetchScope, TagFetchScope};

/// A live transport a subscriber's notifications are pushed through. Owned
/// by the session layer; the manager only ever sees the trait object so it
/// does not need to know whether the other end is a socket, a channel, or a
/// test double.
#[async_trait]
pub trait SubscriberTransport: Send + Sync {
    /// Delivers one batch. Returning `Err` marks the transport dead and the
    /// subscriber is dropped by the dispatcher (§4.5 "Dispatch").
    async fn deliver(&self, notifications: &[Notification]) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("subscriber transport closed")]
pub struct TransportError;

/// A transport that re-delivers notifications through a session's own
/// outbound channel (§4.5 "owned by the session layer"). The daemon drains
/// the matching receiver and frames each notification onto the socket.
pub struct ChannelTransport {
    tx: tokio::sync::mpsc::UnboundedSender<Notification>,
}

impl ChannelTransport {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl SubscriberTransport for ChannelTransport {
    async fn deliver(&self, notifications: &[Notification]) -> Result<(), TransportError> {
        for n in notifications {
            self.tx.send(n.clone()).map_err(|_| TransportError)?;
        }
        Ok(())
    }
}

/// §4.5 "Subscription model". A coarse "all-monitored" flag bypasses the
/// fine-grained filters entirely; otherwise a notification must match one
/// of the explicit monitored sets.
#[derive(Debug, Clone)]
pub struct SubscriberFilter {
    pub all_monitored: bool,
    pub monitored_collections: BTreeSet<CollectionId>,
    pub monitored_items: BTreeSet<ItemId>,
    pub monitored_tags: BTreeSet<TagId>,
    pub monitored_resources: BTreeSet<ResourceId>,
    pub monitored_mime_types: BTreeSet<String>,
    pub monitored_kinds: BTreeSet<EntityKind>,
    pub ignored_sessions: BTreeSet<SessionId>,
    /// When set, a notification about a "referenced" (actively held open)
    /// collection reaches this subscriber only if it also explicitly
    /// monitors that collection (§4.5 filtering step 3).
    pub exclusive: bool,
}

impl Default for SubscriberFilter {
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
        }
    }
}

/// A registered subscriber: a name-addressed filter plus the fetch scopes
/// it contributes to the aggregated scopes (C3) while it is active.
pub struct Subscriber {
    pub name: String,
    pub filter: SubscriberFilter,
    pub item_scope: ItemFetchScope,
    pub collection_scope: CollectionFetchScope,
    pub tag_scope: TagFetchScope,
    /// §10.7 "Storage debugger": opt-in per-subscriber flag gating whether a
    /// `Debug` notification is synthesized for events it receives.
    pub notification_debugging: bool,
    pub transport: Arc<dyn SubscriberTransport>,
}

impl Subscriber {
    /// §4.5 filtering algorithm, applied to one notification. Step 3's
    /// "referenced collections" rule is approximated here by `referenced`:
    /// the caller tells us whether the collection the notification concerns
    /// is currently held open by some session.
    pub fn accepts(&self, notification: &Notification, referenced: bool) -> bool {
        if self.filter.ignored_sessions.contains(&notification.session()) {
            return false;
        }
        if notification.is_empty_of_entities() {
            return false;
        }
        if referenced && !self.filter.exclusive && !self.monitors_collection_of(notification) {
            return false;
        }
        let kind = notification.kind();
        if self.filter.all_monitored {
            return self.filter.monitored_kinds.is_empty() || self.filter.monitored_kinds.contains(&kind);
        }
        if !self.filter.monitored_kinds.is_empty() && !self.filter.monitored_kinds.contains(&kind) {
            return false;
        }
        self.matches_resource(notification)
            || self.matches_mime_type(notification)
            || self.matches_id(notification)
            || self.matches_parent(notification)
            || self.matches_move_destination(notification)
    }

    fn monitors_collection_of(&self, notification: &Notification) -> bool {
        match notification {
            Notification::Item(n) => self.filter.monitored_collections.contains(&n.parent),
            Notification::Collection(n) => self.filter.monitored_collections.contains(&n.collection.id),
            Notification::Subscription(n) => self.filter.monitored_collections.contains(&n.collection.id),
            _ => false,
        }
    }

    fn matches_resource(&self, notification: &Notification) -> bool {
        notification
            .resource()
            .map(|r| self.filter.monitored_resources.contains(r))
            .unwrap_or(false)
    }

    fn matches_mime_type(&self, notification: &Notification) -> bool {
        match notification {
            Notification::Item(n) => n.mime_types().any(|m| self.filter.monitored_mime_types.contains(m)),
            _ => false,
        }
    }

    fn matches_id(&self, notification: &Notification) -> bool {
        match notification {
            Notification::Item(n) => n.item_ids().any(|id| self.filter.monitored_items.contains(&id)),
            Notification::Collection(n) => self.filter.monitored_collections.contains(&n.collection.id),
            Notification::Tag(n) => self.filter.monitored_tags.contains(&n.tag.id),
            _ => false,
        }
    }

    fn matches_parent(&self, notification: &Notification) -> bool {
        self.monitors_collection_of(notification)
    }

    fn matches_move_destination(&self, notification: &Notification) -> bool {
        match notification {
            Notification::Item(n) => {
                n.destination_parent.map(|p| self.filter.monitored_collections.contains(&p)).unwrap_or(false)
                    || n.destination_resource.as_ref().map(|r| self.filter.monitored_resources.contains(r)).unwrap_or(false)
            }
            Notification::Collection(n) => {
                n.destination_parent.map(|p| self.filter.monitored_collections.contains(&p)).unwrap_or(false)
                    || n.destination_resource.as_ref().map(|r| self.filter.monitored_resources.contains(r)).unwrap_or(false)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pim_model::{CollectionId, ItemChangeNotification, ItemId, ItemRef, Operation, ResourceId, SessionId};
    use std::collections::BTreeSet as Set;

    struct NoopTransport;

    #[async_trait]
    impl SubscriberTransport for NoopTransport {
        async fn deliver(&self, _notifications: &[Notification]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn item_notification(session: SessionId, parent: CollectionId) -> Notification {
        Notification::Item(ItemChangeNotification {
            operation: Operation::Add,
            session,
            metadata: None,
            parent,
            destination_parent: None,
            resource: ResourceId("res".into()),
            destination_resource: None,
            items: vec![ItemRef::identity_only(ItemId(1), "text/plain")],
            must_retrieve: false,
            changed_parts: Set::new(),
            added_flags: Set::new(),
            removed_flags: Set::new(),
            added_tags: Set::new(),
            removed_tags: Set::new(),
            added_relations: Vec::new(),
            removed_relations: Vec::new(),
        })
    }

    fn subscriber(filter: SubscriberFilter) -> Subscriber {
        Subscriber {
            name: "s1".into(),
            filter,
            item_scope: ItemFetchScope::default(),
            collection_scope: CollectionFetchScope::default(),
            tag_scope: TagFetchScope::default(),
            notification_debugging: false,
            transport: Arc::new(NoopTransport),
        }
    }

    #[test]
    fn ignored_session_is_dropped() {
        let mut filter = SubscriberFilter::default();
        filter.all_monitored = true;
        filter.ignored_sessions.insert(SessionId(1));
        let sub = subscriber(filter);
        assert!(!sub.accepts(&item_notification(SessionId(1), CollectionId(1)), false));
    }

    #[test]
    fn all_monitored_accepts_any_kind_when_kinds_unrestricted() {
        let mut filter = SubscriberFilter::default();
        filter.all_monitored = true;
        let sub = subscriber(filter);
        assert!(sub.accepts(&item_notification(SessionId(2), CollectionId(1)), false));
    }

    #[test]
    fn specific_monitoring_requires_a_match() {
        let mut filter = SubscriberFilter::default();
        filter.monitored_collections.insert(CollectionId(9));
        let sub = subscriber(filter);
        assert!(!sub.accepts(&item_notification(SessionId(2), CollectionId(1)), false));

        let mut filter = SubscriberFilter::default();
        filter.monitored_collections.insert(CollectionId(1));
        let sub = subscriber(filter);
        assert!(sub.accepts(&item_notification(SessionId(2), CollectionId(1)), false));
    }

    #[test]
    fn referenced_collection_requires_exclusivity_or_explicit_monitoring() {
        let mut filter = SubscriberFilter::default();
        filter.all_monitored = true;
        let sub = subscriber(filter);
        assert!(!sub.accepts(&item_notification(SessionId(2), CollectionId(1)), true));

        let mut filter = SubscriberFilter::default();
        filter.all_monitored = true;
        filter.exclusive = true;
        let sub = subscriber(filter);
        assert!(sub.accepts(&item_notification(SessionId(2), CollectionId(1)), true));
    }
}
