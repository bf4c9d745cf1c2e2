//! Per-connection command context and session state machine (C6, §4.6).
//!
//! A `Session` owns the ambient state a command handler reads implicitly
//! (selected collection/tag, resource, negotiated capabilities) plus its own
//! [`NotificationCollector`] — not shared with any other session (§5). The
//! state machine gates which [`Command`] variants are legal to dispatch.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use pim_model::{CollectionId, Notification, ResourceId, SessionId, TagId};
use pim_protocol::{Command, CommandKind, Response};
use tokio::sync::mpsc;
use tracing::{error, instrument, warn};

use crate::cache::collection_tree::CollectionTreeCache;
use crate::error::{to_failure_response, HandlerError};
use crate::handlers::{self, HandlerContext};
use crate::notify::collector::NotificationCollector;
use crate::notify::manager::NotificationManager;
use crate::search::SearchTaskRegistry;
use crate::stats::StatsCache;
use crate::store::Store;

/// §4.6 "State": the connection's lifecycle stage. Gates which commands the
/// session will dispatch at all, independent of whether the handler itself
/// later rejects the command on semantic grounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NonAuthenticated,
    Authenticated,
    Selected,
    LoggingOut,
}

/// Negotiated client capabilities (§4.6 "client capabilities"), set once at
/// `Login` and read by handlers that branch on protocol version or transfer
/// mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientCapabilities {
    pub protocol_version: u32,
    pub payload_path_capable: bool,
    pub streaming_capable: bool,
}

/// Everything a `Session` needs from the rest of the server core, bundled so
/// constructing a session is a single cheap clone of `Arc`s (§9 "a per-server
/// context object threaded through handlers").
pub struct ServerContext {
    pub store: Arc<dyn Store>,
    pub cache: Arc<CollectionTreeCache>,
    pub stats: Arc<StatsCache>,
    pub manager: Arc<NotificationManager>,
    pub search_tasks: Arc<SearchTaskRegistry>,
}

static NEXT_SESSION_ID: AtomicI64 = AtomicI64::new(1);

/// Allocates a process-unique session id (§3 `SessionId`, §4.5 "ignored
/// sessions").
pub fn next_session_id() -> SessionId {
    SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed) as u64)
}

/// Per-connection ambient state and dispatch loop (C6).
pub struct Session {
    pub id: SessionId,
    pub ctx: Arc<ServerContext>,
    pub state: SessionState,
    pub selected_collection: Option<CollectionId>,
    pub selected_tag: Option<TagId>,
    pub resource: Option<ResourceId>,
    pub capabilities: ClientCapabilities,
    pub collector: NotificationCollector,
    notification_tx: mpsc::UnboundedSender<Notification>,
    notification_rx: Option<mpsc::UnboundedReceiver<Notification>>,
}

impl Session {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        let id = next_session_id();
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        Self {
            id,
            ctx,
            state: SessionState::NonAuthenticated,
            selected_collection: None,
            selected_tag: None,
            resource: None,
            capabilities: ClientCapabilities::default(),
            collector: NotificationCollector::new(),
            notification_tx,
            notification_rx: Some(notification_rx),
        }
    }

    /// Hands the daemon the receiving half of this session's own
    /// notification channel, so it can be drained into wire frames
    /// alongside command responses. Callable once; returns `None`
    /// afterwards.
    pub fn take_notification_rx(&mut self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        self.notification_rx.take()
    }

    /// §4.6 "Protocol: Commands are permitted per state". `Capability` and
    /// `Logout` are universal; everything else depends on the state.
    fn permitted(&self, kind: CommandKind) -> bool {
        match kind {
            CommandKind::Capability | CommandKind::Logout => true,
            CommandKind::Login => self.state == SessionState::NonAuthenticated,
            _ => match self.state {
                SessionState::NonAuthenticated => false,
                SessionState::LoggingOut => false,
                SessionState::Authenticated | SessionState::Selected => true,
            },
        }
    }

    /// Dispatches one command to completion, returning the full response
    /// stream (intermediate fetch responses, if any, followed by the
    /// terminating `Success`/`Failure`). §4.6 "Error discipline": a handler
    /// error becomes a tagged failure and the session stays usable; any
    /// other panic-worthy condition is not expected to occur because
    /// handlers return `Result`, not panic.
    #[instrument(skip(self, command), fields(session = %self.id))]
    pub async fn dispatch(&mut self, command: Command) -> Vec<Response> {
        let kind = pim_protocol::command_kind(&command);

        if matches!(command, Command::Invalid) {
            return vec![Response::Failure {
                message: "Unrecognized command".into(),
                category: pim_model::ErrorCategory::Rejected,
            }];
        }

        if !self.permitted(kind) {
            warn!(?kind, state = ?self.state, "command not permitted in current session state");
            return vec![Response::Failure {
                message: format!("command {kind:?} not permitted in state {:?}", self.state),
                category: pim_model::ErrorCategory::Rejected,
            }];
        }

        match self.run(command).await {
            Ok(mut responses) => {
                match self
                    .collector
                    .dispatch_notifications(
                        self.ctx.store.as_ref(),
                        self.ctx.manager.item_scope(),
                        self.ctx.manager.collection_scope(),
                        self.ctx.manager.tag_scope(),
                        &self.ctx.stats,
                    )
                    .await
                {
                    Ok(batch) if !batch.is_empty() => self.ctx.manager.enqueue(batch),
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "notification completion failed; continuing without it"),
                }
                responses.push(Response::Success);
                responses
            }
            Err(err) => vec![to_failure_response(&err)],
        }
    }

    async fn run(&mut self, command: Command) -> Result<Vec<Response>, HandlerError> {
        let mut hctx = HandlerContext {
            session_id: self.id,
            ctx: &self.ctx,
            collector: &self.collector,
            selected_collection: &mut self.selected_collection,
            selected_tag: &mut self.selected_tag,
            resource: &mut self.resource,
            notification_tx: &self.notification_tx,
        };

        match command {
            Command::Login(cmd) => {
                self.resource = cmd.resource.clone();
                self.capabilities.protocol_version = cmd.protocol_version;
                self.ctx.manager.session_connected(self.id, cmd.protocol_version);
                self.state = SessionState::Authenticated;
                Ok(Vec::new())
            }
            Command::Logout => {
                self.state = SessionState::LoggingOut;
                self.ctx.manager.session_disconnected(self.id);
                Ok(Vec::new())
            }
            Command::Capability => Ok(vec![Response::Capability {
                supports_tristate_prefs: true,
                protocol_revision: 3,
            }]),
            Command::Select(cmd) => {
                let result = handlers::select::select(&mut hctx, cmd).await;
                if result.is_ok() {
                    self.state = SessionState::Selected;
                }
                result.map(|_| Vec::new())
            }
            Command::FetchItems(cmd) => handlers::items::fetch_items(&hctx, cmd).await,
            Command::FetchTags(cmd) => handlers::tags::fetch_tags(&hctx, cmd).await,
            Command::FetchCollectionStats(cmd) => {
                handlers::collections::fetch_collection_stats(&hctx, cmd).await
            }
            Command::CreateItem(cmd) => handlers::items::create_item(&hctx, cmd).await,
            Command::ModifyItem(cmd) => handlers::items::modify_item(&hctx, cmd).await,
            Command::DeleteItem(cmd) => handlers::items::delete_item(&hctx, cmd).await,
            Command::MoveItem(cmd) => handlers::items::move_item(&hctx, cmd).await,
            Command::LinkItems(cmd) => handlers::items::link_items(&hctx, cmd).await,
            Command::UnlinkItems(cmd) => handlers::items::unlink_items(&hctx, cmd).await,
            Command::CreateCollection(cmd) => handlers::collections::create_collection(&hctx, cmd).await,
            Command::ModifyCollection(cmd) => handlers::collections::modify_collection(&hctx, cmd).await,
            Command::DeleteCollection(cmd) => handlers::collections::delete_collection(&hctx, cmd).await,
            Command::MoveCollection(cmd) => handlers::collections::move_collection(&hctx, cmd).await,
            Command::CreateTag(cmd) => handlers::tags::create_tag(&hctx, cmd).await,
            Command::ModifyTag(cmd) => handlers::tags::modify_tag(&hctx, cmd).await,
            Command::DeleteTag(cmd) => handlers::tags::delete_tag(&hctx, cmd).await,
            Command::CreateSubscription(cmd) => handlers::subscriptions::create_subscription(&hctx, cmd),
            Command::ModifySubscription(cmd) => handlers::subscriptions::modify_subscription(&hctx, cmd),
            Command::DeleteSubscription(cmd) => handlers::subscriptions::delete_subscription(&hctx, cmd),
            Command::SearchResult(cmd) => handlers::search::search_result(&hctx, cmd).await,
            Command::Invalid => unreachable!("handled above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn test_ctx() -> Arc<ServerContext> {
        Arc::new(ServerContext {
            store: Arc::new(MemoryStore::new()),
            cache: Arc::new(CollectionTreeCache::new()),
            stats: Arc::new(StatsCache::new()),
            manager: Arc::new(NotificationManager::new(2)),
            search_tasks: Arc::new(SearchTaskRegistry::new()),
        })
    }

    #[tokio::test]
    async fn non_authenticated_session_rejects_data_plane_commands() {
        let mut session = Session::new(test_ctx());
        let responses = session.dispatch(Command::Logout).await;
        assert!(matches!(responses[0], Response::Success) || responses.is_empty());

        let mut session = Session::new(test_ctx());
        let responses = session.dispatch(Command::FetchTags(pim_protocol::FetchTagsCommand {
            scope: pim_model::Scope::Empty,
            fetch_scope: Default::default(),
        })).await;
        assert!(matches!(&responses[0], Response::Failure { category: pim_model::ErrorCategory::Rejected, .. }));
    }

    #[tokio::test]
    async fn login_then_logout_transitions_state() {
        let mut session = Session::new(test_ctx());
        session.dispatch(Command::Login(pim_protocol::LoginCommand {
            resource: None,
            protocol_version: 3,
        })).await;
        assert_eq!(session.state, SessionState::Authenticated);
        session.dispatch(Command::Logout).await;
        assert_eq!(session.state, SessionState::LoggingOut);
    }

    #[tokio::test]
    async fn unrecognized_command_is_a_tagged_failure_session_stays_usable() {
        let mut session = Session::new(test_ctx());
        let responses = session.dispatch(Command::Invalid).await;
        assert!(matches!(&responses[0], Response::Failure { message, .. } if message == "Unrecognized command"));
        // session remains usable: a later Login still works.
        let responses = session.dispatch(Command::Login(pim_protocol::LoginCommand {
            resource: None,
            protocol_version: 3,
        })).await;
        assert!(matches!(responses.last(), Some(Response::Success)));
    }
}
