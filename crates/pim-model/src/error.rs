/// The stable error taxonomy shared by the server, the undo engine and the
/// wire protocol (§7). Every `HandlerError`/`UndoError` carries one of these
/// so telemetry and clients can branch on category without parsing message
/// text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Protocol framing or enum decode failure; fatal for the current
    /// command only, the session stays open.
    Malformed,
    /// Well-formed command not permitted in the current state or scope.
    Rejected,
    /// A referenced entity does not exist.
    NotFound,
    /// ACL check on the target collection failed.
    PermissionDenied,
    /// Optimistic-concurrency revision mismatch.
    Conflict,
    /// Store unavailable or transaction rolled back; retryable.
    Transient,
    /// One entry in an atomic group failed; siblings report this instead of
    /// success.
    Rolledback,
    /// Invitation policy vetoed the change.
    UserCanceled,
    /// The entity was deleted concurrently; handled specially by the undo
    /// engine to preserve stack consistency (§10.7).
    AlreadyDeleted,
}

impl ErrorCategory {
    /// Whether a client may reasonably retry the operation unmodified.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Malformed => "malformed",
            ErrorCategory::Rejected => "rejected",
            ErrorCategory::NotFound => "not-found",
            ErrorCategory::PermissionDenied => "permission-denied",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Transient => "transient",
            ErrorCategory::Rolledback => "rolled-back",
            ErrorCategory::UserCanceled => "user-canceled",
            ErrorCategory::AlreadyDeleted => "already-deleted",
        };
        f.write_str(s)
    }
}
