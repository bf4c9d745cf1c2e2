//! Notification manager (C5, §4.5): owns the subscriber set, maintains the
//! aggregated scopes (C3) as subscriptions come and go, and dispatches
//! coalesced batches with bounded concurrency.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use pim_model::{CollectionId, DebugNotification, Notification, SessionId};
use pim_protocol::{CollectionFetchScope, ItemFetchScope, TagFetchScope};
use parking_lot::Mutex;
use tracing::warn;

use crate::notify::aggregated::{AggregatedCollectionScope, AggregatedItemScope, AggregatedTagScope};
use crate::notify::capability::CapabilityAggregator;
use crate::notify::subscriber::{Subscriber, SubscriberFilter, SubscriberTransport};

/// Tells the manager which collections are currently "referenced" (held
/// open by some session's Select), needed for the exclusivity rule in
/// §4.5 filtering step 3. The session layer (C6) is the source of truth;
/// the manager only needs a read-only view of it.
pub trait ReferencedCollections: Send + Sync {
    fn is_referenced(&self, collection: CollectionId) -> bool;
}

pub struct AlwaysUnreferenced;

impl ReferencedCollections for AlwaysUnreferenced {
    fn is_referenced(&self, _collection: CollectionId) -> bool {
        false
    }
}

pub struct NotificationManager {
    subscribers: DashMap<String, Subscriber>,
    item_scope: AggregatedItemScope,
    collection_scope: AggregatedCollectionScope,
    tag_scope: AggregatedTagScope,
    capability: CapabilityAggregator,
    pending: Mutex<Vec<Notification>>,
    /// Bound on how many subscriber deliveries run concurrently per
    /// dispatched notification (§4.5 "bounded worker pool").
    dispatch_workers: usize,
    referenced: Arc<dyn ReferencedCollections>,
}

impl NotificationManager {
    pub fn new(dispatch_workers: usize) -> Self {
        Self::with_referenced(dispatch_workers, Arc::new(AlwaysUnreferenced))
    }

    pub fn with_referenced(dispatch_workers: usize, referenced: Arc<dyn ReferencedCollections>) -> Self {
        Self {
            subscribers: DashMap::new(),
            item_scope: AggregatedItemScope::new(),
            collection_scope: AggregatedCollectionScope::new(),
            tag_scope: AggregatedTagScope::new(),
            capability: CapabilityAggregator::new(),
            pending: Mutex::new(Vec::new()),
            dispatch_workers: dispatch_workers.max(1),
            referenced,
        }
    }

    pub fn capability(&self) -> &CapabilityAggregator {
        &self.capability
    }

    pub fn item_scope(&self) -> &AggregatedItemScope {
        &self.item_scope
    }

    pub fn collection_scope(&self) -> &AggregatedCollectionScope {
        &self.collection_scope
    }

    pub fn tag_scope(&self) -> &AggregatedTagScope {
        &self.tag_scope
    }

    /// Registers a new subscriber by its server-assigned name and folds its
    /// per-kind fetch scopes into the aggregated scopes (§4.5 "maintain the
    /// aggregated scopes as a side effect of subscription modifications").
    pub fn add_subscriber(&self, name: impl Into<String>, filter: SubscriberFilter, transport: Arc<dyn SubscriberTransport>, notification_debugging: bool) {
        let name = name.into();
        let item_scope = ItemFetchScope::default();
        let collection_scope = CollectionFetchScope::default();
        let tag_scope = TagFetchScope::default();
        self.item_scope.add_subscriber(&item_scope);
        self.collection_scope.add_subscriber(&collection_scope);
        self.tag_scope.add_subscriber(&tag_scope);
        self.subscribers.insert(
            name.clone(),
            Subscriber { name, filter, item_scope, collection_scope, tag_scope, notification_debugging, transport },
        );
    }

    /// Same as [`Self::add_subscriber`] but with explicit initial fetch
    /// scopes, used by `CreateSubscription` handlers that parse scopes off
    /// the wire.
    pub fn add_subscriber_with_scopes(
        &self,
        name: impl Into<String>,
        filter: SubscriberFilter,
        item_scope: ItemFetchScope,
        collection_scope: CollectionFetchScope,
        tag_scope: TagFetchScope,
        transport: Arc<dyn SubscriberTransport>,
        notification_debugging: bool,
    ) {
        let name = name.into();
        self.item_scope.add_subscriber(&item_scope);
        self.collection_scope.add_subscriber(&collection_scope);
        self.tag_scope.add_subscriber(&tag_scope);
        self.subscribers.insert(
            name.clone(),
            Subscriber { name, filter, item_scope, collection_scope, tag_scope, notification_debugging, transport },
        );
    }

    /// `ModifySubscription`: updates an existing subscriber's filter
    /// (monitored collections/items/tags/resources/mime-types/kinds,
    /// ignored sessions, exclusivity) and fetch scopes in place, applying
    /// the fetch-scope delta to the aggregated scopes rather than a
    /// remove-then-add (§4.3 "Updates", §4.5 "Subscription model").
    pub fn modify_subscriber(
        &self,
        name: &str,
        filter: SubscriberFilter,
        item_scope: ItemFetchScope,
        collection_scope: CollectionFetchScope,
        tag_scope: TagFetchScope,
    ) {
        if let Some(mut sub) = self.subscribers.get_mut(name) {
            self.item_scope.apply(&sub.item_scope, &item_scope);
            self.collection_scope.apply(&sub.collection_scope, &collection_scope);
            self.tag_scope.apply(&sub.tag_scope, &tag_scope);
            sub.filter = filter;
            sub.item_scope = item_scope;
            sub.collection_scope = collection_scope;
            sub.tag_scope = tag_scope;
        }
    }

    /// §5 "A session closing its transport is detected by the manager
    /// within one dispatch cycle and its subscribers are dropped."
    pub fn remove_subscriber(&self, name: &str) {
        if let Some((_, sub)) = self.subscribers.remove(name) {
            self.item_scope.remove_subscriber(&sub.item_scope);
            self.collection_scope.remove_subscriber(&sub.collection_scope);
            self.tag_scope.remove_subscriber(&sub.tag_scope);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// §4.5 "Timing": collectors enqueue here; a coalescing timer elsewhere
    /// calls [`Self::dispatch_pending`].
    pub fn enqueue(&self, notifications: Vec<Notification>) {
        self.pending.lock().extend(notifications);
    }

    /// Runs forever, draining the pending queue on a fixed interval. The
    /// daemon spawns this once at startup (§4.5 "≈ 50 ms").
    pub async fn run_coalescing_loop(self: &Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.dispatch_pending().await;
        }
    }

    /// Drains whatever is pending and dispatches it now; used directly by
    /// tests and by the timer loop above.
    pub async fn dispatch_pending(&self) {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return;
        }
        self.dispatch_batch(batch).await;
    }

    async fn dispatch_batch(&self, notifications: Vec<Notification>) {
        let debugging_active = self.subscribers.iter().any(|s| s.notification_debugging);
        if debugging_active {
            self.dispatch_serial_with_debug(notifications).await;
        } else {
            self.dispatch_concurrent(notifications).await;
        }
    }

    /// §4.5 "Dispatch": a bounded worker pool delivers each accepted
    /// notification to a subscriber's transport concurrently, dead
    /// transports are collected and the owning subscriber dropped.
    async fn dispatch_concurrent(&self, notifications: Vec<Notification>) {
        let mut dead = Vec::new();
        for notification in &notifications {
            let is_referenced = collection_id_of(notification).map(|c| self.referenced.is_referenced(c)).unwrap_or(false);
            let targets: Vec<(String, Arc<dyn SubscriberTransport>)> = self
                .subscribers
                .iter()
                .filter(|entry| entry.accepts(notification, is_referenced))
                .map(|entry| (entry.key().clone(), entry.transport.clone()))
                .collect();

            let failed: Vec<String> = stream::iter(targets)
                .map(|(name, transport)| {
                    let notification = notification.clone();
                    async move {
                        match transport.deliver(std::slice::from_ref(&notification)).await {
                            Ok(()) => None,
                            Err(_) => Some(name),
                        }
                    }
                })
                .buffer_unordered(self.dispatch_workers)
                .filter_map(|outcome| async move { outcome })
                .collect()
                .await;
            for name in failed {
                warn!(subscriber = %name, "dropping subscriber with dead transport");
                dead.push(name);
            }
        }
        for name in dead {
            self.remove_subscriber(&name);
        }
    }

    /// §4.5 "Dispatch ... When notification debugging is enabled by any
    /// subscriber, dispatch is serialized so that a Debug notification
    /// enumerating the listeners that received each event can be emitted."
    async fn dispatch_serial_with_debug(&self, notifications: Vec<Notification>) {
        let mut dead = Vec::new();
        for notification in &notifications {
            let names: Vec<String> = self.subscribers.iter().map(|e| e.key().clone()).collect();
            let mut listeners = Vec::new();
            for name in &names {
                let is_referenced = collection_id_of(notification).map(|c| self.referenced.is_referenced(c)).unwrap_or(false);
                let accepts = self.subscribers.get(name).map(|s| s.accepts(notification, is_referenced)).unwrap_or(false);
                if !accepts {
                    continue;
                }
                let delivered = if let Some(sub) = self.subscribers.get(name) {
                    sub.transport.deliver(std::slice::from_ref(notification)).await
                } else {
                    continue;
                };
                match delivered {
                    Ok(()) => listeners.push(name.clone()),
                    Err(_) => {
                        warn!(subscriber = %name, "dropping subscriber with dead transport");
                        dead.push(name.clone());
                    }
                }
            }
            let debug = Notification::Debug(DebugNotification { about: Box::new(notification.clone()), listeners });
            for name in &names {
                if let Some(sub) = self.subscribers.get(name) {
                    if sub.notification_debugging {
                        let _ = sub.transport.deliver(std::slice::from_ref(&debug)).await;
                    }
                }
            }
        }
        for name in dead {
            self.remove_subscriber(&name);
        }
    }

    pub fn session_connected(&self, session: SessionId, protocol_version: u32) {
        self.capability.session_connected(session, protocol_version);
    }

    pub fn session_disconnected(&self, session: SessionId) {
        self.capability.session_disconnected(session);
    }
}

fn collection_id_of(notification: &Notification) -> Option<CollectionId> {
    match notification {
        Notification::Item(n) => Some(n.parent),
        Notification::Collection(n) => Some(n.collection.id),
        Notification::Subscription(n) => Some(n.collection.id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pim_model::{ItemChangeNotification, ItemId, ItemRef, Operation, ResourceId};
    use std::collections::BTreeSet as Set;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SubscriberTransport for CountingTransport {
        async fn deliver(&self, notifications: &[Notification]) -> Result<(), crate::notify::subscriber::TransportError> {
            self.count.fetch_add(notifications.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn item_notification() -> Notification {
        Notification::Item(ItemChangeNotification {
            operation: Operation::Add,
            session: SessionId(9),
            metadata: None,
            parent: CollectionId(1),
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

    #[tokio::test]
    async fn all_monitored_subscriber_receives_enqueued_notification() {
        let manager = NotificationManager::new(2);
        let count = Arc::new(AtomicUsize::new(0));
        let mut filter = SubscriberFilter::default();
        filter.all_monitored = true;
        manager.add_subscriber("s1", filter, Arc::new(CountingTransport { count: count.clone() }), false);

        manager.enqueue(vec![item_notification()]);
        manager.dispatch_pending().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unrelated_subscriber_receives_nothing() {
        let manager = NotificationManager::new(2);
        let count = Arc::new(AtomicUsize::new(0));
        let mut filter = SubscriberFilter::default();
        filter.monitored_collections.insert(CollectionId(42));
        manager.add_subscriber("s1", filter, Arc::new(CountingTransport { count: count.clone() }), false);

        manager.enqueue(vec![item_notification()]);
        manager.dispatch_pending().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn modify_subscriber_replaces_the_filter_not_just_fetch_scopes() {
        let manager = NotificationManager::new(2);
        let count = Arc::new(AtomicUsize::new(0));
        let mut filter = SubscriberFilter::default();
        filter.monitored_collections.insert(CollectionId(42));
        manager.add_subscriber("s1", filter, Arc::new(CountingTransport { count: count.clone() }), false);

        manager.enqueue(vec![item_notification()]);
        manager.dispatch_pending().await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "parent collection 1 isn't monitored yet");

        let mut widened = SubscriberFilter::default();
        widened.monitored_collections.insert(CollectionId(1));
        manager.modify_subscriber(
            "s1",
            widened,
            ItemFetchScope::default(),
            CollectionFetchScope::default(),
            TagFetchScope::default(),
        );

        manager.enqueue(vec![item_notification()]);
        manager.dispatch_pending().await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "modify_subscriber must have replaced the monitored set");
    }

    #[tokio::test]
    async fn removing_subscriber_also_releases_aggregated_scope() {
        let manager = NotificationManager::new(2);
        let count = Arc::new(AtomicUsize::new(0));
        let mut filter = SubscriberFilter::default();
        filter.all_monitored = true;
        manager.add_subscriber("s1", filter, Arc::new(CountingTransport { count }), false);
        assert_eq!(manager.subscriber_count(), 1);
        manager.remove_subscriber("s1");
        assert_eq!(manager.subscriber_count(), 0);
    }
}
