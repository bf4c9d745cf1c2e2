//! `Select` (§4.7): "Resets the session's selected-collection slot, then
//! resolves the target; both success and failure reset the slot (so a
//! failed Select behaves as a deselect)."

use pim_protocol::SelectCommand;

use crate::error::HandlerError;
use crate::handlers::HandlerContext;

pub async fn select(hctx: &mut HandlerContext<'_>, cmd: SelectCommand) -> Result<(), HandlerError> {
    *hctx.selected_collection = None;

    if cmd.scope.is_empty() {
        return Ok(());
    }

    let id = hctx.resolve_single_collection(&cmd.scope).await?;
    hctx.store()
        .get_collection(id)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("no collection {id}")))?;

    *hctx.selected_collection = Some(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pim_model::{CachePolicy, Collection, CollectionId, ResourceId, Scope, ViewPreferences};
    use tokio::sync::mpsc;

    use super::*;
    use crate::cache::CollectionTreeCache;
    use crate::notify::collector::NotificationCollector;
    use crate::notify::manager::NotificationManager;
    use crate::search::SearchTaskRegistry;
    use crate::session::ServerContext;
    use crate::stats::StatsCache;
    use crate::store::MemoryStore;

    fn ctx_with_store(store: MemoryStore) -> Arc<ServerContext> {
        Arc::new(ServerContext {
            store: Arc::new(store),
            cache: Arc::new(CollectionTreeCache::new()),
            stats: Arc::new(StatsCache::new()),
            manager: Arc::new(NotificationManager::new(2)),
            search_tasks: Arc::new(SearchTaskRegistry::new()),
        })
    }

    fn sample_collection(id: i64) -> Collection {
        Collection {
            id: CollectionId(id),
            parent_id: None,
            resource: ResourceId("res0".into()),
            name: "inbox".into(),
            remote_id: Default::default(),
            remote_revision: None,
            content_mime_types: Default::default(),
            cache_policy: CachePolicy::default(),
            virtual_: false,
            query: None,
            enabled: true,
            view_preferences: ViewPreferences::default(),
            attributes: Default::default(),
        }
    }

    #[tokio::test]
    async fn successful_select_sets_the_slot() {
        let store = MemoryStore::new();
        store.seed_collection(sample_collection(7));
        let server_ctx = ctx_with_store(store);

        let mut selected = None;
        let mut selected_tag = None;
        let mut resource = None;
        let (tx, _rx) = mpsc::unbounded_channel();
        let collector = NotificationCollector::new();
        let mut hctx = HandlerContext {
            session_id: pim_model::SessionId(1),
            ctx: &server_ctx,
            collector: &collector,
            selected_collection: &mut selected,
            selected_tag: &mut selected_tag,
            resource: &mut resource,
            notification_tx: &tx,
        };
        select(&mut hctx, SelectCommand { scope: Scope::Uid(vec![7]) }).await.unwrap();
        assert_eq!(selected, Some(CollectionId(7)));
    }

    #[tokio::test]
    async fn failed_select_still_clears_a_previous_selection() {
        let server_ctx = ctx_with_store(MemoryStore::new());
        let mut selected = Some(CollectionId(1));
        let mut selected_tag = None;
        let mut resource = None;
        let (tx, _rx) = mpsc::unbounded_channel();
        let collector = NotificationCollector::new();
        let mut hctx = HandlerContext {
            session_id: pim_model::SessionId(1),
            ctx: &server_ctx,
            collector: &collector,
            selected_collection: &mut selected,
            selected_tag: &mut selected_tag,
            resource: &mut resource,
            notification_tx: &tx,
        };
        let result = select(&mut hctx, SelectCommand { scope: Scope::Uid(vec![999]) }).await;
        assert!(result.is_err());
        assert_eq!(selected, None);
    }
}
