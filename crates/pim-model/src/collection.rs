use crate::attribute::AttributeMap;
use crate::ids::{CollectionId, RemoteId, ResourceId};
use crate::tristate::Tristate;
use std::collections::BTreeSet;
use std::time::Duration;

/// Which logical aspect of a `Collection` changed, used as the element type
/// of a `Collection-Modify` notification's changed-parts set (§3, §8
/// scenario 2/3/4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectionPart {
    Name,
    ParentId,
    RemoteId,
    RemoteRevision,
    MimeTypes,
    CachePolicy,
    Enabled,
    SyncPref,
    DisplayPref,
    IndexPref,
    Attribute(Vec<u8>),
}

/// Inherit/ttl/check-interval/local-parts policy governing how aggressively
/// this collection's cache may be purged (§3 Collection: cache policy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub inherit: bool,
    pub ttl: Option<Duration>,
    pub check_interval: Option<Duration>,
    pub preferred_local_parts: BTreeSet<String>,
    pub sync_on_demand: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            inherit: true,
            ttl: None,
            check_interval: None,
            preferred_local_parts: BTreeSet::new(),
            sync_on_demand: false,
        }
    }
}

/// Per-view enablement overrides (§3: "a set of typed tristate preferences
/// {display, sync, index}"). Each resolves against the collection's
/// `enabled` flag when `Undefined` (§8 scenario 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewPreferences {
    pub display: Tristate,
    pub sync: Tristate,
    pub index: Tristate,
}

impl ViewPreferences {
    pub fn effective_display(&self, enabled: bool) -> bool {
        self.display.resolve(enabled)
    }
    pub fn effective_sync(&self, enabled: bool) -> bool {
        self.sync.resolve(enabled)
    }
    pub fn effective_index(&self, enabled: bool) -> bool {
        self.index.resolve(enabled)
    }
}

/// A node in the collection forest (§3 Collection).
///
/// Invariant: `parent_id` forms a forest rooted at [`crate::ids::ROOT_COLLECTION`].
/// A `virtual_` collection never directly contains items; it only links to
/// items owned elsewhere, so removing it drops linkage rather than cascading
/// item deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: CollectionId,
    pub parent_id: Option<CollectionId>,
    pub resource: ResourceId,
    pub name: String,
    pub remote_id: RemoteId,
    pub remote_revision: Option<String>,
    pub content_mime_types: BTreeSet<String>,
    pub cache_policy: CachePolicy,
    pub virtual_: bool,
    pub query: Option<String>,
    pub enabled: bool,
    pub view_preferences: ViewPreferences,
    pub attributes: AttributeMap,
}

impl Collection {
    pub fn accepts_mime_type(&self, mime: &str) -> bool {
        self.virtual_ || self.content_mime_types.is_empty() || self.content_mime_types.contains(mime)
    }
}
