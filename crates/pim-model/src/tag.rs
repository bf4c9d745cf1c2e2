use crate::attribute::AttributeMap;
use crate::ids::{Gid, RemoteId, ResourceId, TagId};
use std::collections::BTreeMap;

/// A classifier, optionally hierarchical (§3 Tag).
///
/// Invariant: `gid` is unique across all tags; if `parent` is set it must
/// reference another `Tag`. On the wire, an absent parent is encoded as the
/// sentinel id `-1` (§9 open question) rather than a missing field — decoders
/// must treat `-1` as "no parent" and never round-trip it as a real id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: TagId,
    pub gid: Gid,
    pub parent: Option<TagId>,
    pub tag_type: String,
    pub attributes: AttributeMap,
    /// A tag may be known to several resources under different remote ids
    /// (supplemented from `tagqueryhelper.cpp`; §10.7 of SPEC_FULL.md).
    pub remote_ids: BTreeMap<ResourceId, RemoteId>,
}

impl Tag {
    pub fn remote_id_for(&self, resource: &ResourceId) -> Option<&RemoteId> {
        self.remote_ids.get(resource)
    }
}

/// Wire sentinel for "no parent tag" (§9 open question: `setContextId(type,
/// -1)` is ambiguous between "clear" and "set to -1"; here it is always
/// "clear" and is never itself a valid id).
pub const NO_PARENT_TAG: i64 = -1;
