use crate::attribute::AttributeName;
use crate::ids::{CollectionId, Gid, ItemId, RelationId, RemoteId, ResourceId, TagId};
use std::collections::BTreeSet;
use std::time::SystemTime;

/// A named boolean marker on an item (e.g. `\Seen`, `\Flagged`). Modelled as
/// an interned string rather than a bitset because resources may invent
/// arbitrary flag names the server does not know in advance.
pub type Flag = String;

/// A single versioned, possibly-external blob attached to an item (§3 Item:
/// "ordered set of payload parts").
///
/// Invariant: `data` may be empty while `exists == true`, meaning "known to
/// exist upstream, not cached locally" — callers must check `exists`, not
/// `data.is_empty()`, to distinguish a zero-length payload from an
/// uncached one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub version: u32,
    pub external: bool,
    pub data: Vec<u8>,
    pub exists: bool,
    pub datasize: u64,
}

impl Part {
    pub fn known_absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            external: false,
            data: Vec::new(),
            exists: false,
            datasize: 0,
        }
    }
}

/// A typed directed edge between two items (§3 Relation).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Relation {
    pub id: RelationId,
    pub left: ItemId,
    pub right: ItemId,
    pub relation_type: String,
    pub remote_id: Option<RemoteId>,
}

/// A leaf PIM entity: mail, event, contact (§3 PimItem).
///
/// Invariant: `(resource, remote_id)` is unique whenever `remote_id` is
/// non-empty; `revision` is monotonic non-decreasing across modifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PimItem {
    pub id: ItemId,
    pub parent_collection: CollectionId,
    pub resource: ResourceId,
    pub remote_id: RemoteId,
    pub remote_revision: Option<String>,
    pub mime_type: String,
    pub revision: u64,
    pub gid: Option<Gid>,
    pub size: u64,
    pub mtime: SystemTime,
    pub atime: Option<SystemTime>,
    pub flags: BTreeSet<Flag>,
    pub tags: BTreeSet<TagId>,
    pub parts: Vec<Part>,
}

impl PimItem {
    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn part_mut(&mut self, name: &str) -> Option<&mut Part> {
        self.parts.iter_mut().find(|p| p.name == name)
    }

    pub fn set_part(&mut self, part: Part) {
        if let Some(slot) = self.part_mut(&part.name) {
            *slot = part;
        } else {
            self.parts.push(part);
        }
    }

    /// Names of parts changed going from `before` to `self` (version or data
    /// differs), used to populate a notification's changed-parts set.
    pub fn changed_part_names(&self, before: &PimItem) -> BTreeSet<AttributeName> {
        let mut changed = BTreeSet::new();
        for part in &self.parts {
            match before.part(&part.name) {
                Some(old) if old.version == part.version && old.data == part.data => {}
                _ => {
                    changed.insert(part.name.clone().into_bytes());
                }
            }
        }
        changed
    }
}
