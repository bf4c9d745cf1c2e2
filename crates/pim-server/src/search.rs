//! In-flight search correlation registry backing the `Search-result` handler
//! (§4.7): an external search producer (e.g. a resource agent walking a
//! remote server-side search) reports result identifiers asynchronously,
//! keyed by a client-chosen correlation id; whatever issued the search waits
//! on the same id for the resolved UID set.

use std::collections::HashMap;

use parking_lot::Mutex;
use pim_model::ItemId;
use tokio::sync::oneshot;

/// One outstanding search, identified by its correlation id. `push` may be
/// called at most meaningfully once per id; a second call on an id with no
/// waiter left is silently dropped (the waiter already gave up).
#[derive(Default)]
pub struct SearchTaskRegistry {
    waiters: Mutex<HashMap<String, oneshot::Sender<Vec<ItemId>>>>,
}

impl SearchTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `search_id` and returns the receiving half.
    /// Called by whatever issued the search before the agent can possibly
    /// reply.
    pub fn register(&self, search_id: impl Into<String>) -> oneshot::Receiver<Vec<ItemId>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(search_id.into(), tx);
        rx
    }

    /// §4.7 "Search-result": pushes the resolved id set to the waiter keyed
    /// by `search_id`. Returns whether a waiter was actually found.
    pub fn push(&self, search_id: &str, ids: Vec<ItemId>) -> bool {
        if let Some(tx) = self.waiters.lock().remove(search_id) {
            tx.send(ids).is_ok()
        } else {
            false
        }
    }

    /// §4.7 "On failure, pushes an empty set so that waiters terminate."
    pub fn fail(&self, search_id: &str) -> bool {
        self.push(search_id, Vec::new())
    }

    pub fn cancel(&self, search_id: &str) {
        self.waiters.lock().remove(search_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_resolves_the_registered_waiter() {
        let registry = SearchTaskRegistry::new();
        let rx = registry.register("s1");
        assert!(registry.push("s1", vec![ItemId(7)]));
        assert_eq!(rx.await.unwrap(), vec![ItemId(7)]);
    }

    #[tokio::test]
    async fn failure_pushes_empty_set_so_waiter_terminates() {
        let registry = SearchTaskRegistry::new();
        let rx = registry.register("s2");
        assert!(registry.fail("s2"));
        assert_eq!(rx.await.unwrap(), Vec::new());
    }

    #[test]
    fn push_with_no_waiter_is_a_noop() {
        let registry = SearchTaskRegistry::new();
        assert!(!registry.push("missing", vec![]));
    }
}
