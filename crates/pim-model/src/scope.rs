use crate::ids::{Gid, RemoteId};

/// A `Scope` on the wire selects one of five ways to name a set of entities
/// (§6). `requires_resource()` tells a handler whether a resource must be
/// selected on the session before the scope can be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Empty,
    Uid(Vec<i64>),
    RemoteId(Vec<RemoteId>),
    Gid(Vec<Gid>),
    /// A path of remote-ids identifying a collection by its ancestry,
    /// innermost-last.
    HierarchicalRid(Vec<RemoteId>),
}

impl Scope {
    pub fn requires_resource(&self) -> bool {
        matches!(self, Scope::RemoteId(_) | Scope::HierarchicalRid(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Scope::Empty)
            || matches!(self, Scope::Uid(v) if v.is_empty())
            || matches!(self, Scope::RemoteId(v) if v.is_empty())
            || matches!(self, Scope::Gid(v) if v.is_empty())
            || matches!(self, Scope::HierarchicalRid(v) if v.is_empty())
    }
}

/// Scope kinds legal for tag operations are restricted to UID/GID/RID
/// (§6 "Tag operations accept UID, GID, and RID only").
pub fn tag_scope_is_legal(scope: &Scope) -> bool {
    matches!(
        scope,
        Scope::Empty | Scope::Uid(_) | Scope::Gid(_) | Scope::RemoteId(_)
    )
}

/// Item-change notification ancestor-inclusion request. The union of many
/// observers' requests is computed by taking the maximum (§4.3): `None` <
/// `Parent` < `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AncestorDepth {
    #[default]
    None,
    Parent,
    All,
}
