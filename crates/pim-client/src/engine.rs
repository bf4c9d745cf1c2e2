//! The undoable change engine (C8, §4.8): two stacks of reversible
//! [`UndoEntry`] records, driven against a [`ChangeBackend`], with identity
//! remapping across a creation's redo and atomic-group rollback semantics.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pim_model::{AtomicOperationId, ItemId, PimItem, ResultCode, UndoEntry, UndoKind};
use tracing::{instrument, warn};

use crate::backend::ChangeBackend;
use crate::error::BackendError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One entity whose id the store reassigned mid-operation, paired (old,
/// new). Threaded back up through `apply_undo`/`apply_redo` so a sibling
/// within the same `Multi` entry — and, once the whole entry completes,
/// every other entry still on a stack — sees the right id (§4.8 "Identity
/// remapping").
type Remaps = Vec<(ItemId, ItemId)>;

/// Injected completion signal (§4.8 "surfaces per-entry result codes via its
/// completion signal"; §5 "suspends the caller's progress only via explicit
/// signal/callback"). Default is silent.
pub trait UndoObserver: Send + Sync {
    fn on_completed(&self, description: &str, result: ResultCode, error: Option<&str>) {
        let _ = (description, result, error);
    }
}

pub struct SilentObserver;
impl UndoObserver for SilentObserver {}

/// Outcome handed back to the caller of [`ChangeEngine::undo`] /
/// [`ChangeEngine::redo`].
#[derive(Debug, Clone)]
pub struct UndoCompletion {
    pub description: String,
    pub result: ResultCode,
}

enum Stack {
    Undo,
    Redo,
}

struct EngineState {
    undo: Vec<UndoEntry>,
    redo: Vec<UndoEntry>,
    /// §4.8 "Concurrency": new recorded changes while an operation is in
    /// progress are diverted here and drained onto the undo stack once the
    /// operation finishes.
    queued: Vec<UndoEntry>,
    running: bool,
    open_group: Option<(AtomicOperationId, String, Vec<UndoEntry>)>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self { undo: Vec::new(), redo: Vec::new(), queued: Vec::new(), running: false, open_group: None }
    }
}

/// §4.8: "Runs on the client side of the protocol, coordinating multiple
/// asynchronous change requests against the store and presenting a uniform
/// undo/redo API to an application."
pub struct ChangeEngine {
    backend: Arc<dyn ChangeBackend>,
    observer: Arc<dyn UndoObserver>,
    state: Mutex<EngineState>,
    enabled: AtomicBool,
    next_atomic_op: AtomicU64,
}

impl ChangeEngine {
    pub fn new(backend: Arc<dyn ChangeBackend>) -> Self {
        Self::with_observer(backend, Arc::new(SilentObserver))
    }

    pub fn with_observer(backend: Arc<dyn ChangeBackend>, observer: Arc<dyn UndoObserver>) -> Self {
        Self {
            backend,
            observer,
            state: Mutex::new(EngineState::default()),
            enabled: AtomicBool::new(true),
            next_atomic_op: AtomicU64::new(1),
        }
    }

    /// §4.8 "An `enabled` flag disables recording without affecting
    /// in-flight operations." Does not touch entries already on a stack.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn undo_count(&self) -> usize {
        self.state.lock().undo.len()
    }

    pub fn redo_count(&self) -> usize {
        self.state.lock().redo.len()
    }

    /// Starts an atomic operation group (§4.8 Multi entries, §8 scenario 6):
    /// subsequent `record_*` calls buffer into this group instead of
    /// pushing individually, until [`Self::end_atomic_operation`].
    pub fn start_atomic_operation(&self, description: impl Into<String>) -> AtomicOperationId {
        let id = AtomicOperationId(self.next_atomic_op.fetch_add(1, Ordering::Relaxed));
        self.state.lock().open_group = Some((id, description.into(), Vec::new()));
        id
    }

    /// Closes the currently open atomic group, wrapping its buffered
    /// children into one `Multi` entry and pushing it like any other
    /// recorded change. A no-op if no group is open or it collected no
    /// children.
    pub fn end_atomic_operation(&self) {
        let group = {
            let mut state = self.state.lock();
            state.open_group.take()
        };
        if let Some((id, description, children)) = group {
            if !children.is_empty() {
                self.push_entry(UndoEntry::multi(description, id, children));
            }
        }
    }

    pub fn record_creation(&self, description: impl Into<String>, item: PimItem) {
        self.push_entry(UndoEntry::creation(description, item));
    }

    pub fn record_deletion(&self, description: impl Into<String>, items: Vec<PimItem>) {
        self.push_entry(UndoEntry::deletion(description, items));
    }

    pub fn record_modification(&self, description: impl Into<String>, item_id: ItemId, before: PimItem, after: PimItem) {
        self.push_entry(UndoEntry::modification(description, item_id, before, after));
    }

    fn push_entry(&self, entry: UndoEntry) {
        if !self.is_enabled() {
            return;
        }
        let mut state = self.state.lock();
        if let Some((_, _, children)) = state.open_group.as_mut() {
            children.push(entry);
            return;
        }
        if state.running {
            state.queued.push(entry);
        } else {
            state.undo.push(entry);
            state.redo.clear();
        }
    }

    /// Pops the top of the undo stack and executes its inverse. Returns
    /// `None` if the stack is empty or an undo/redo is already in flight
    /// (§4.8 "at most one undo/redo runs at a time").
    #[instrument(skip(self))]
    pub async fn undo(&self) -> Option<UndoCompletion> {
        let mut entry = {
            let mut state = self.state.lock();
            if state.running {
                warn!("undo requested while another operation is in flight; ignored");
                return None;
            }
            let entry = state.undo.pop()?;
            state.running = true;
            entry
        };
        let (result, remaps) = self.apply_undo(&mut entry).await;
        Some(self.finish_entry(entry, result, Stack::Undo, Stack::Redo, remaps))
    }

    /// Pops the top of the redo stack and re-executes the forward change.
    #[instrument(skip(self))]
    pub async fn redo(&self) -> Option<UndoCompletion> {
        let mut entry = {
            let mut state = self.state.lock();
            if state.running {
                warn!("redo requested while another operation is in flight; ignored");
                return None;
            }
            let entry = state.redo.pop()?;
            state.running = true;
            entry
        };
        let (result, remaps) = self.apply_redo(&mut entry).await;
        Some(self.finish_entry(entry, result, Stack::Redo, Stack::Undo, remaps))
    }

    /// §4.8 "An explicit `undoAll` drains the Undo stack by repeatedly
    /// invoking undo." New recordings during the drain are queued by the
    /// same mechanism as a single undo and get their turn once they land
    /// back on the undo stack.
    pub async fn undo_all(&self) -> Vec<UndoCompletion> {
        let mut completions = Vec::new();
        while let Some(completion) = self.undo().await {
            completions.push(completion);
        }
        completions
    }

    /// `origin` is the stack `entry` was popped from; `destination` is where
    /// a successful operation lands (the opposite stack, ready to be
    /// reversed again). A *failed* single-entry operation never happened as
    /// far as the store is concerned, so it goes back onto `origin` instead,
    /// so the caller can retry it — mirroring a
    /// `success ? destinationStack().push(...) : stack().push(...)` branch.
    fn finish_entry(&self, mut entry: UndoEntry, result: ResultCode, origin: Stack, destination: Stack, remaps: Remaps) -> UndoCompletion {
        entry.completed = true;
        entry.result = Some(result);
        if let ResultCode::Failed(category) = result {
            entry.error = Some(category.to_string());
        }
        let completion = UndoCompletion { description: entry.description.clone(), result };
        let error = entry.error.clone();

        let mut state = self.state.lock();
        let target = if result.is_success() { destination } else { origin };
        match target {
            Stack::Redo => state.redo.push(entry),
            Stack::Undo => state.undo.push(entry),
        }
        for (old, new) in remaps {
            for other in state.undo.iter_mut().chain(state.redo.iter_mut()).chain(state.queued.iter_mut()) {
                Self::remap_kind(&mut other.kind, old, new);
            }
            if let Some((_, _, children)) = state.open_group.as_mut() {
                for child in children.iter_mut() {
                    Self::remap_kind(&mut child.kind, old, new);
                }
            }
        }
        state.running = false;
        if !state.queued.is_empty() {
            let queued = std::mem::take(&mut state.queued);
            state.undo.extend(queued);
            state.redo.clear();
        }
        drop(state);

        self.observer.on_completed(&completion.description, completion.result, error.as_deref());
        completion
    }

    fn remap_kind(kind: &mut UndoKind, old: ItemId, new: ItemId) {
        match kind {
            UndoKind::Creation(rec) => {
                if rec.item.id == old {
                    rec.item.id = new;
                }
            }
            UndoKind::Deletion(rec) => {
                for item in rec.items.iter_mut() {
                    if item.id == old {
                        item.id = new;
                    }
                }
            }
            UndoKind::Modification(rec) => {
                if rec.item_id == old {
                    rec.item_id = new;
                }
                if rec.before.id == old {
                    rec.before.id = new;
                }
                if rec.after.id == old {
                    rec.after.id = new;
                }
            }
            UndoKind::Multi(rec) => {
                for child in rec.entries.iter_mut() {
                    Self::remap_kind(&mut child.kind, old, new);
                }
            }
        }
    }

    /// Executes the inverse of `entry`, returning its result plus every
    /// identity remap the store assigned along the way. For a `Multi`,
    /// children run in reverse insertion order (§3 Undo entry invariant)
    /// and each already-processed sibling's remaps are applied to the
    /// remaining ones before they run (§4.8 "to every entry in both stacks
    /// and to the entry currently executing").
    fn apply_undo<'a>(&'a self, entry: &'a mut UndoEntry) -> BoxFuture<'a, (ResultCode, Remaps)> {
        Box::pin(async move {
            match &mut entry.kind {
                UndoKind::Creation(rec) => (map_result(self.backend.delete_item(rec.item.id).await), Vec::new()),
                UndoKind::Deletion(rec) => {
                    let mut first_failure = None;
                    let mut remaps = Vec::new();
                    for item in rec.items.iter_mut() {
                        match self.backend.create_item(item.parent_collection, item.clone()).await {
                            Ok(recreated) => {
                                let old = item.id;
                                if old != recreated.id {
                                    remaps.push((old, recreated.id));
                                }
                                *item = recreated;
                            }
                            Err(err) => {
                                first_failure.get_or_insert(err.category);
                            }
                        }
                    }
                    (first_failure.map(ResultCode::Failed).unwrap_or(ResultCode::Success), remaps)
                }
                UndoKind::Modification(rec) => (map_result(self.backend.modify_item(rec.before.clone()).await), Vec::new()),
                UndoKind::Multi(rec) => {
                    if let Err(err) = self.backend.begin_atomic(rec.atomic_op).await {
                        return (ResultCode::Failed(err.category), Vec::new());
                    }
                    let mut any_failed = false;
                    let mut first_failure = None;
                    let mut all_remaps: Remaps = Vec::new();
                    let len = rec.entries.len();
                    for idx in (0..len).rev() {
                        for &(old, new) in &all_remaps {
                            Self::remap_kind(&mut rec.entries[idx].kind, old, new);
                        }
                        let (result, remaps) = self.apply_undo(&mut rec.entries[idx]).await;
                        rec.entries[idx].completed = true;
                        rec.entries[idx].result = Some(result);
                        if !result.is_success() {
                            any_failed = true;
                            first_failure.get_or_insert(result);
                        }
                        all_remaps.extend(remaps);
                    }
                    let outcome = if any_failed {
                        let _ = self.backend.rollback_atomic(rec.atomic_op).await;
                        for child in rec.entries.iter_mut() {
                            if matches!(child.result, Some(ResultCode::Success)) {
                                child.result = Some(ResultCode::RolledBack);
                            }
                        }
                        first_failure.unwrap_or(ResultCode::RolledBack)
                    } else {
                        map_result(self.backend.commit_atomic(rec.atomic_op).await)
                    };
                    if any_failed {
                        entry.group_rollback = true;
                    }
                    (outcome, all_remaps)
                }
            }
        })
    }

    /// Executes the forward direction of `entry` again; a `Multi` redoes
    /// its children in original insertion order (§3 Undo entry invariant).
    fn apply_redo<'a>(&'a self, entry: &'a mut UndoEntry) -> BoxFuture<'a, (ResultCode, Remaps)> {
        Box::pin(async move {
            match &mut entry.kind {
                UndoKind::Creation(rec) => match self.backend.create_item(rec.item.parent_collection, rec.item.clone()).await {
                    Ok(recreated) => {
                        let old = rec.item.id;
                        let remaps = if old != recreated.id { vec![(old, recreated.id)] } else { Vec::new() };
                        rec.item = recreated;
                        (ResultCode::Success, remaps)
                    }
                    Err(err) => (ResultCode::Failed(err.category), Vec::new()),
                },
                UndoKind::Deletion(rec) => {
                    let mut first_failure = None;
                    for item in rec.items.iter() {
                        if let Err(err) = self.backend.delete_item(item.id).await {
                            first_failure.get_or_insert(err.category);
                        }
                    }
                    (first_failure.map(ResultCode::Failed).unwrap_or(ResultCode::Success), Vec::new())
                }
                UndoKind::Modification(rec) => (map_result(self.backend.modify_item(rec.after.clone()).await), Vec::new()),
                UndoKind::Multi(rec) => {
                    if let Err(err) = self.backend.begin_atomic(rec.atomic_op).await {
                        return (ResultCode::Failed(err.category), Vec::new());
                    }
                    let mut any_failed = false;
                    let mut first_failure = None;
                    let mut all_remaps: Remaps = Vec::new();
                    let len = rec.entries.len();
                    for idx in 0..len {
                        for &(old, new) in &all_remaps {
                            Self::remap_kind(&mut rec.entries[idx].kind, old, new);
                        }
                        let (result, remaps) = self.apply_redo(&mut rec.entries[idx]).await;
                        rec.entries[idx].completed = true;
                        rec.entries[idx].result = Some(result);
                        if !result.is_success() {
                            any_failed = true;
                            first_failure.get_or_insert(result);
                        }
                        all_remaps.extend(remaps);
                    }
                    let outcome = if any_failed {
                        let _ = self.backend.rollback_atomic(rec.atomic_op).await;
                        entry.group_rollback = true;
                        if let UndoKind::Multi(rec) = &mut entry.kind {
                            for child in rec.entries.iter_mut() {
                                if matches!(child.result, Some(ResultCode::Success)) {
                                    child.result = Some(ResultCode::RolledBack);
                                }
                            }
                        }
                        first_failure.unwrap_or(ResultCode::RolledBack)
                    } else {
                        map_result(self.backend.commit_atomic(rec.atomic_op).await)
                    };
                    (outcome, all_remaps)
                }
            }
        })
    }
}

fn map_result(result: Result<impl Sized, BackendError>) -> ResultCode {
    match result {
        Ok(_) => ResultCode::Success,
        Err(err) => ResultCode::Failed(err.category),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::AtomicI64;
    use std::time::SystemTime;

    use async_trait::async_trait;
    use pim_model::{CollectionId, RemoteId, ResourceId};
    use proptest::prelude::*;

    /// Assigns a fresh id to every `create_item`, mimicking a store that
    /// never reuses an id after a delete (§4.8 "Identity remapping").
    struct FakeStore {
        items: Mutex<StdHashMap<ItemId, PimItem>>,
        next_id: AtomicI64,
        fail_creates_matching: Mutex<Option<ItemId>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self { items: Mutex::new(StdHashMap::new()), next_id: AtomicI64::new(100), fail_creates_matching: Mutex::new(None) }
        }

        fn blank_item(&self, collection: CollectionId, id: ItemId) -> PimItem {
            PimItem {
                id,
                parent_collection: collection,
                resource: ResourceId::from("test-resource"),
                remote_id: RemoteId::default(),
                remote_revision: None,
                mime_type: "application/x-test".into(),
                revision: 0,
                gid: None,
                size: 0,
                mtime: SystemTime::UNIX_EPOCH,
                atime: None,
                flags: Default::default(),
                tags: Default::default(),
                parts: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ChangeBackend for FakeStore {
        async fn create_item(&self, collection: CollectionId, mut draft: PimItem) -> Result<PimItem, BackendError> {
            if let Some(blocked) = *self.fail_creates_matching.lock() {
                if draft.id == blocked {
                    return Err(BackendError::transient("forced failure"));
                }
            }
            let new_id = ItemId(self.next_id.fetch_add(1, Ordering::Relaxed));
            draft.id = new_id;
            draft.parent_collection = collection;
            self.items.lock().insert(new_id, draft.clone());
            Ok(draft)
        }

        async fn modify_item(&self, item: PimItem) -> Result<PimItem, BackendError> {
            let mut items = self.items.lock();
            if !items.contains_key(&item.id) {
                return Err(BackendError::already_deleted("no such item"));
            }
            items.insert(item.id, item.clone());
            Ok(item)
        }

        async fn delete_item(&self, id: ItemId) -> Result<(), BackendError> {
            if self.items.lock().remove(&id).is_none() {
                return Err(BackendError::already_deleted("no such item"));
            }
            Ok(())
        }
    }

    fn item(id: i64, collection: i64) -> PimItem {
        let store = FakeStore::new();
        store.blank_item(CollectionId(collection), ItemId(id))
    }

    #[tokio::test]
    async fn creation_undo_deletes_then_redo_recreates_with_new_id() {
        let backend = Arc::new(FakeStore::new());
        let engine = ChangeEngine::new(backend.clone());

        let created = backend.create_item(CollectionId(1), item(1, 1)).await.unwrap();
        engine.record_creation("create note", created.clone());
        assert_eq!(engine.undo_count(), 1);

        let completion = engine.undo().await.unwrap();
        assert!(completion.result.is_success());
        assert!(backend.items.lock().is_empty());
        assert_eq!(engine.redo_count(), 1);

        let completion = engine.redo().await.unwrap();
        assert!(completion.result.is_success());
        assert_eq!(backend.items.lock().len(), 1);
    }

    #[tokio::test]
    async fn deletion_undo_recreates_and_remaps_id_on_later_references() {
        let backend = Arc::new(FakeStore::new());
        let engine = ChangeEngine::new(backend.clone());

        let created = backend.create_item(CollectionId(1), item(1, 1)).await.unwrap();
        let original_id = created.id;
        backend.delete_item(original_id).await.unwrap();
        engine.record_deletion("delete note", vec![created]);

        let completion = engine.undo().await.unwrap();
        assert!(completion.result.is_success());
        assert_eq!(backend.items.lock().len(), 1);
        // the recreated item must have a fresh id, not the deleted one
        assert!(!backend.items.lock().contains_key(&original_id));
    }

    #[tokio::test]
    async fn modification_undo_restores_before_and_redo_restores_after() {
        let backend = Arc::new(FakeStore::new());
        let engine = ChangeEngine::new(backend.clone());

        let created = backend.create_item(CollectionId(1), item(1, 1)).await.unwrap();
        let mut after = created.clone();
        after.revision = 1;
        backend.modify_item(after.clone()).await.unwrap();
        engine.record_modification("bump revision", created.id, created.clone(), after.clone());

        engine.undo().await.unwrap();
        assert_eq!(backend.items.lock().get(&created.id).unwrap().revision, 0);

        engine.redo().await.unwrap();
        assert_eq!(backend.items.lock().get(&created.id).unwrap().revision, 1);
    }

    /// §8 scenario 6: create X, modify X, delete X recorded as one atomic
    /// group; undoing it recreates X (new id), then modifies, and the
    /// modify step must see the new id even though it was recorded against
    /// the old one. Redo must restore the post-batch state.
    #[tokio::test]
    async fn atomic_group_undo_remaps_identity_across_sibling_entries() {
        let backend = Arc::new(FakeStore::new());
        let engine = ChangeEngine::new(backend.clone());

        let op = engine.start_atomic_operation("batch");
        let created = backend.create_item(CollectionId(1), item(1, 1)).await.unwrap();
        let original_id = created.id;
        engine.record_creation("create", created.clone());

        let mut modified = created.clone();
        modified.revision = 5;
        backend.modify_item(modified.clone()).await.unwrap();
        engine.record_modification("modify", original_id, created.clone(), modified.clone());

        backend.delete_item(original_id).await.unwrap();
        engine.record_deletion("delete", vec![modified.clone()]);
        engine.end_atomic_operation();

        assert_eq!(engine.undo_count(), 1);
        // The batch's net effect was "item created then deleted", so
        // undoing the whole group returns the store to having no item at
        // all. Success here depends on the modify-undo step seeing the
        // *new* id the delete-undo's recreate assigned, not `original_id`
        // (§4.8 "Identity remapping") — if remapping failed, modify_item
        // would target a dead id and the whole group would report failure.
        let completion = engine.undo().await.unwrap();
        assert!(completion.result.is_success());
        assert!(backend.items.lock().is_empty());

        let completion = engine.redo().await.unwrap();
        assert!(completion.result.is_success());
        assert!(backend.items.lock().is_empty());
        let _ = original_id;
    }

    #[tokio::test]
    async fn failed_single_entry_undo_goes_back_onto_its_origin_stack() {
        let backend = Arc::new(FakeStore::new());
        let engine = ChangeEngine::new(backend.clone());

        let created = backend.create_item(CollectionId(1), item(1, 1)).await.unwrap();
        let mut after = created.clone();
        after.revision = 1;
        backend.modify_item(after.clone()).await.unwrap();
        engine.record_modification("bump revision", created.id, created.clone(), after.clone());

        // remove the item out from under the engine so the undo's
        // `modify_item(before)` call 404s instead of succeeding.
        backend.items.lock().remove(&created.id);

        let completion = engine.undo().await.unwrap();
        assert!(!completion.result.is_success());
        // a failed undo never happened: it must be retryable from the undo
        // stack, not land on redo as if it had.
        assert_eq!(engine.undo_count(), 1);
        assert_eq!(engine.redo_count(), 0);
    }

    #[tokio::test]
    async fn atomic_group_rollback_on_child_failure_marks_siblings_rolled_back() {
        let backend = Arc::new(FakeStore::new());
        let engine = ChangeEngine::new(backend.clone());

        let op = engine.start_atomic_operation("batch");
        let a = backend.create_item(CollectionId(1), item(1, 1)).await.unwrap();
        engine.record_creation("create a", a.clone());
        let b = backend.create_item(CollectionId(1), item(2, 1)).await.unwrap();
        engine.record_creation("create b", b.clone());
        engine.end_atomic_operation();

        // force the undo (delete) of `a` to fail by making a subsequent
        // create (used internally by nothing here, but exercised via direct
        // backend call) collide; instead we simulate failure by removing
        // the item out from under the engine so its delete-undo 404s.
        backend.items.lock().remove(&a.id);

        let completion = engine.undo().await.unwrap();
        assert!(!completion.result.is_success());

        let _ = op;
    }

    #[tokio::test]
    async fn undo_on_empty_stack_returns_none() {
        let backend = Arc::new(FakeStore::new());
        let engine = ChangeEngine::new(backend);
        assert!(engine.undo().await.is_none());
        assert!(engine.redo().await.is_none());
    }

    #[tokio::test]
    async fn disabling_the_engine_drops_new_recordings() {
        let backend = Arc::new(FakeStore::new());
        let engine = ChangeEngine::new(backend.clone());
        engine.set_enabled(false);

        let created = backend.create_item(CollectionId(1), item(1, 1)).await.unwrap();
        engine.record_creation("create note", created);
        assert_eq!(engine.undo_count(), 0);
    }

    #[tokio::test]
    async fn a_new_recording_clears_the_redo_stack() {
        let backend = Arc::new(FakeStore::new());
        let engine = ChangeEngine::new(backend.clone());

        let created = backend.create_item(CollectionId(1), item(1, 1)).await.unwrap();
        engine.record_creation("create note", created);
        engine.undo().await.unwrap();
        assert_eq!(engine.redo_count(), 1);

        let created2 = backend.create_item(CollectionId(1), item(2, 1)).await.unwrap();
        engine.record_creation("create another", created2);
        assert_eq!(engine.redo_count(), 0);
    }

    proptest! {
        /// §8 "Undo/redo round-trip: after `record(op); undo(); redo()`, the
        /// store state equals the state after `record(op)` alone." Modeled
        /// with a `Modification` entry, whose undo/redo never reassigns an
        /// id, so the store snapshot after the round trip can be compared
        /// for exact equality against the snapshot taken right after the
        /// original record — unlike `Creation`, where redo always asks the
        /// backend for a fresh id.
        #[test]
        fn modification_round_trip_restores_post_record_state(
            id in 1i64..1_000,
            collection_id in 1i64..50,
            before_revision in 0i64..100,
            after_revision in 0i64..100,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async move {
                let backend = Arc::new(FakeStore::new());
                let engine = ChangeEngine::new(backend.clone());

                let mut before = backend.create_item(CollectionId(collection_id), item(id, collection_id)).await.unwrap();
                before.revision = before_revision;
                backend.modify_item(before.clone()).await.unwrap();

                let mut after = before.clone();
                after.revision = after_revision;
                backend.modify_item(after.clone()).await.unwrap();
                engine.record_modification("bump revision", before.id, before.clone(), after.clone());

                let post_record = backend.items.lock().clone();

                engine.undo().await.unwrap();
                engine.redo().await.unwrap();

                let post_round_trip = backend.items.lock().clone();
                prop_assert_eq!(post_record, post_round_trip);
                Ok(())
            })?;
        }
    }
}
