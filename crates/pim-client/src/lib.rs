//! Client-side core of the PIM broker (§1 THE CORE): the undoable change
//! engine (C8, §4.8) and the invitation side-effect policy (C9, §4.9).
//!
//! Both modules are store-agnostic: they drive an injected [`backend::ChangeBackend`]
//! rather than talking to `pim-protocol` directly, so an application can plug
//! in whatever transport it uses to reach the broker.

pub mod backend;
pub mod engine;
pub mod error;
pub mod invitation;

pub use backend::ChangeBackend;
pub use engine::{ChangeEngine, SilentObserver, UndoCompletion, UndoObserver};
pub use error::{BackendError, MailerError};
pub use invitation::{
    ChangeKind, FixedAnswerDecider, IncidenceContext, InvitationDecider, InvitationMode, InvitationPolicy,
    ItipMessageKind, NoopMailer, OutgoingItipMessage, OutgoingMailer,
};
