//! Invitation side-effect policy (C9, §4.9): decides whether a change to a
//! groupware-capable incidence (an event/todo with attendees) should
//! trigger an outgoing ITIP message, and hands that message to an injected
//! [`OutgoingMailer`] rather than formatting or transmitting it itself
//! (§10.7, grounded on `mailclient_p.h`'s split between "decide" and
//! "transmit").

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use pim_model::{AtomicOperationId, ItemId};

use crate::error::MailerError;

/// §4.9 "Policy": the three modes an application can configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationMode {
    Send,
    DoNotSend,
    Ask,
}

/// What kind of change is being decided on (§4.9 "taken twice per change").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

/// The groupware-relevant facts about an incidence a caller supplies
/// alongside the change; the policy never parses the item payload itself.
#[derive(Debug, Clone)]
pub struct IncidenceContext {
    pub item_id: ItemId,
    pub actor_is_organizer: bool,
    pub supports_groupware: bool,
    pub attendees: Vec<String>,
    /// Whether the local user had previously accepted this incidence,
    /// needed to pick Reply/Declined on a non-organizer delete (§4.9).
    pub user_previously_accepted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItipMessageKind {
    /// Create, or modify by the organizer.
    Request,
    /// Delete by the organizer.
    Cancel,
    /// Delete by a non-organizer who had accepted; declines on their behalf.
    ReplyDeclined,
}

#[derive(Debug, Clone)]
pub struct OutgoingItipMessage {
    pub kind: ItipMessageKind,
    pub item_id: ItemId,
    pub attendees: Vec<String>,
}

/// Transmits a fully-formed outgoing message; the policy never sends mail
/// itself (§10.7, `mailclient_p.h`). Real SMTP/transport wiring is out of
/// scope (§1).
#[async_trait]
pub trait OutgoingMailer: Send + Sync {
    async fn send(&self, message: OutgoingItipMessage) -> Result<(), MailerError>;
}

pub struct NoopMailer;

#[async_trait]
impl OutgoingMailer for NoopMailer {
    async fn send(&self, _message: OutgoingItipMessage) -> Result<(), MailerError> {
        Ok(())
    }
}

/// `Ask` delegates to this; unit tests stub it with a fixed answer to avoid
/// a UI dialog (§4.9, §9 "injected decision interface").
#[async_trait]
pub trait InvitationDecider: Send + Sync {
    async fn ask(&self, ctx: &IncidenceContext, change: ChangeKind) -> bool;
}

/// Short-circuits `Ask` to a fixed answer (§4.9 "in unit-test mode `Ask`
/// short-circuits to a fixed answer").
pub struct FixedAnswerDecider(pub bool);

#[async_trait]
impl InvitationDecider for FixedAnswerDecider {
    async fn ask(&self, _ctx: &IncidenceContext, _change: ChangeKind) -> bool {
        self.0
    }
}

/// §4.9: pre- and post-change ITIP decisions for incidences with attendees.
pub struct InvitationPolicy {
    mode: InvitationMode,
    decider: Box<dyn InvitationDecider>,
    mailer: Box<dyn OutgoingMailer>,
    /// §4.9 "State tracking": within an atomic operation the engine
    /// remembers the first decision so later entries in the same group
    /// inherit it without re-prompting.
    group_decisions: Mutex<HashMap<AtomicOperationId, bool>>,
}

impl InvitationPolicy {
    pub fn new(mode: InvitationMode, decider: Box<dyn InvitationDecider>, mailer: Box<dyn OutgoingMailer>) -> Self {
        Self { mode, decider, mailer, group_decisions: Mutex::new(HashMap::new()) }
    }

    pub fn with_noop_mailer(mode: InvitationMode, decider: Box<dyn InvitationDecider>) -> Self {
        Self::new(mode, decider, Box::new(NoopMailer))
    }

    async fn decide(&self, ctx: &IncidenceContext, change: ChangeKind, atomic_op: Option<AtomicOperationId>) -> bool {
        match self.mode {
            InvitationMode::Send => true,
            InvitationMode::DoNotSend => false,
            InvitationMode::Ask => {
                if let Some(op) = atomic_op {
                    if let Some(&decision) = self.group_decisions.lock().get(&op) {
                        return decision;
                    }
                }
                let decision = self.decider.ask(ctx, change).await;
                if let Some(op) = atomic_op {
                    self.group_decisions.lock().insert(op, decision);
                }
                decision
            }
        }
    }

    /// §4.9 "Pre-change (can veto the change): for modifications where the
    /// actor is not the organizer, a negative answer reverts the in-memory
    /// payload to the original." Returns `true` to proceed, `false` to
    /// veto; only consulted for `ChangeKind::Modify` by a non-organizer —
    /// callers for other change kinds can skip this step entirely.
    pub async fn pre_change_modification(&self, ctx: &IncidenceContext, atomic_op: Option<AtomicOperationId>) -> bool {
        if !ctx.supports_groupware || ctx.actor_is_organizer {
            return true;
        }
        self.decide(ctx, ChangeKind::Modify, atomic_op).await
    }

    /// §4.9 "Post-change (cannot veto): emits the appropriate ITIP message".
    /// Returns `None` when no message is warranted (no attendees, the mode
    /// suppressed it via a negative `Ask` answer outside the veto path, or
    /// the change kind has no corresponding message).
    pub async fn post_change(
        &self,
        ctx: &IncidenceContext,
        change: ChangeKind,
        atomic_op: Option<AtomicOperationId>,
    ) -> Result<Option<ItipMessageKind>, MailerError> {
        if !ctx.supports_groupware || ctx.attendees.is_empty() {
            return Ok(None);
        }

        let kind = match change {
            ChangeKind::Create if ctx.actor_is_organizer => Some(ItipMessageKind::Request),
            ChangeKind::Modify if ctx.actor_is_organizer => Some(ItipMessageKind::Request),
            ChangeKind::Delete if ctx.actor_is_organizer => Some(ItipMessageKind::Cancel),
            ChangeKind::Delete if !ctx.actor_is_organizer && ctx.user_previously_accepted => Some(ItipMessageKind::ReplyDeclined),
            _ => None,
        };

        let Some(kind) = kind else {
            return Ok(None);
        };

        if !self.decide(ctx, change, atomic_op).await {
            return Ok(None);
        }

        let message = OutgoingItipMessage { kind, item_id: ctx.item_id, attendees: ctx.attendees.clone() };
        self.mailer.send(message).await?;
        Ok(Some(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(organizer: bool, accepted: bool) -> IncidenceContext {
        IncidenceContext {
            item_id: ItemId(1),
            actor_is_organizer: organizer,
            supports_groupware: true,
            attendees: vec!["a@example.com".into()],
            user_previously_accepted: accepted,
        }
    }

    #[tokio::test]
    async fn organizer_create_sends_request() {
        let policy = InvitationPolicy::with_noop_mailer(InvitationMode::Send, Box::new(FixedAnswerDecider(true)));
        let kind = policy.post_change(&ctx(true, false), ChangeKind::Create, None).await.unwrap();
        assert_eq!(kind, Some(ItipMessageKind::Request));
    }

    #[tokio::test]
    async fn organizer_delete_sends_cancel() {
        let policy = InvitationPolicy::with_noop_mailer(InvitationMode::Send, Box::new(FixedAnswerDecider(true)));
        let kind = policy.post_change(&ctx(true, false), ChangeKind::Delete, None).await.unwrap();
        assert_eq!(kind, Some(ItipMessageKind::Cancel));
    }

    #[tokio::test]
    async fn non_organizer_delete_after_accept_sends_reply_declined() {
        let policy = InvitationPolicy::with_noop_mailer(InvitationMode::Send, Box::new(FixedAnswerDecider(true)));
        let kind = policy.post_change(&ctx(false, true), ChangeKind::Delete, None).await.unwrap();
        assert_eq!(kind, Some(ItipMessageKind::ReplyDeclined));
    }

    #[tokio::test]
    async fn non_organizer_delete_without_prior_accept_sends_nothing() {
        let policy = InvitationPolicy::with_noop_mailer(InvitationMode::Send, Box::new(FixedAnswerDecider(true)));
        let kind = policy.post_change(&ctx(false, false), ChangeKind::Delete, None).await.unwrap();
        assert_eq!(kind, None);
    }

    #[tokio::test]
    async fn do_not_send_mode_suppresses_every_message() {
        let policy = InvitationPolicy::with_noop_mailer(InvitationMode::DoNotSend, Box::new(FixedAnswerDecider(true)));
        let kind = policy.post_change(&ctx(true, false), ChangeKind::Create, None).await.unwrap();
        assert_eq!(kind, None);
    }

    #[tokio::test]
    async fn non_organizer_modification_can_be_vetoed() {
        let policy = InvitationPolicy::with_noop_mailer(InvitationMode::Ask, Box::new(FixedAnswerDecider(false)));
        let proceed = policy.pre_change_modification(&ctx(false, false), None).await;
        assert!(!proceed);
    }

    #[tokio::test]
    async fn organizer_modification_is_never_vetoed_pre_change() {
        let policy = InvitationPolicy::with_noop_mailer(InvitationMode::Ask, Box::new(FixedAnswerDecider(false)));
        let proceed = policy.pre_change_modification(&ctx(true, false), None).await;
        assert!(proceed);
    }

    #[tokio::test]
    async fn ask_mode_remembers_first_decision_within_an_atomic_group() {
        let policy = InvitationPolicy::with_noop_mailer(InvitationMode::Ask, Box::new(FixedAnswerDecider(true)));
        let op = AtomicOperationId(42);
        let first = policy.post_change(&ctx(true, false), ChangeKind::Create, Some(op)).await.unwrap();
        assert_eq!(first, Some(ItipMessageKind::Request));

        // A decider that would now answer "no" is irrelevant: the group
        // already decided "yes" on the first call.
        let policy2 = InvitationPolicy::with_noop_mailer(InvitationMode::Ask, Box::new(FixedAnswerDecider(false)));
        {
            let mut decisions = policy2.group_decisions.lock();
            decisions.insert(op, true);
        }
        let second = policy2.post_change(&ctx(true, false), ChangeKind::Modify, Some(op)).await.unwrap();
        assert_eq!(second, Some(ItipMessageKind::Request));
    }
}
