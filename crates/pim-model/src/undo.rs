use crate::error::ErrorCategory;
use crate::ids::{AtomicOperationId, ItemId};
use crate::item::PimItem;
use std::collections::BTreeSet;

/// The inverse of a creation: delete of the created item (§3 Undo entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationRecord {
    pub item: PimItem,
}

/// The inverse of a deletion: recreate with the recorded payloads, using the
/// item's original storage collection (§3; §10.7 `AlreadyDeleted`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRecord {
    pub items: Vec<PimItem>,
}

/// The inverse of a modification: modify back to the recorded payload.
///
/// Both the pre- and post-modification payloads are kept: `before` is what
/// undo restores, `after` is what redo restores (§8 scenario 6 "`redo()`
/// restores the post-batch state").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationRecord {
    pub item_id: ItemId,
    pub before: PimItem,
    pub after: PimItem,
}

/// A group of co-created entries sharing one atomic-operation id (§4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiRecord {
    pub atomic_op: AtomicOperationId,
    pub entries: Vec<UndoEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoKind {
    Creation(CreationRecord),
    Deletion(DeletionRecord),
    Modification(ModificationRecord),
    Multi(MultiRecord),
}

/// Outcome of the most recently completed (un)do/redo of this entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    /// One sibling in an atomic group failed; this entry's own operation
    /// succeeded but was rolled back by the store alongside it (§4.8, §7).
    RolledBack,
    Failed(ErrorCategory),
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

/// A reversible record in the undo/redo stacks (§3 Undo entry).
///
/// Invariant: a `Multi` entry undoes its children in reverse insertion order
/// and redoes them in insertion order; an entry persists until both its
/// local operation completes and any emitted side effects (invitations) are
/// acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    pub description: String,
    pub in_flight_change_ids: BTreeSet<u64>,
    pub completed: bool,
    pub result: Option<ResultCode>,
    pub error: Option<String>,
    /// Set once any child of a `Multi` has failed; signals the remaining
    /// siblings should be reclassified as rolled back rather than succeeded.
    pub group_rollback: bool,
    pub kind: UndoKind,
}

impl UndoEntry {
    pub fn new(description: impl Into<String>, kind: UndoKind) -> Self {
        Self {
            description: description.into(),
            in_flight_change_ids: BTreeSet::new(),
            completed: false,
            result: None,
            error: None,
            group_rollback: false,
            kind,
        }
    }

    pub fn creation(description: impl Into<String>, item: PimItem) -> Self {
        Self::new(description, UndoKind::Creation(CreationRecord { item }))
    }

    pub fn deletion(description: impl Into<String>, items: Vec<PimItem>) -> Self {
        Self::new(description, UndoKind::Deletion(DeletionRecord { items }))
    }

    pub fn modification(description: impl Into<String>, item_id: ItemId, before: PimItem, after: PimItem) -> Self {
        Self::new(
            description,
            UndoKind::Modification(ModificationRecord { item_id, before, after }),
        )
    }

    pub fn multi(description: impl Into<String>, atomic_op: AtomicOperationId, entries: Vec<UndoEntry>) -> Self {
        Self::new(description, UndoKind::Multi(MultiRecord { atomic_op, entries }))
    }
}
