//! Stable identity types shared by every entity kind.
//!
//! Entity ids are small newtypes over `i64` rather than bare integers so that
//! a `CollectionId` can never be passed where an `ItemId` is expected — the
//! same confusion the wire protocol guards against with per-type frame tags.

use std::fmt;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub i64);

        impl $name {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

entity_id!(CollectionId);
entity_id!(ItemId);
entity_id!(TagId);
entity_id!(RelationId);

/// The forest root. Every `Collection::parent_id` of `None` is conceptually
/// rooted here; `ROOT` is used on the wire where a literal id is required.
pub const ROOT_COLLECTION: CollectionId = CollectionId(0);

/// A globally unique identifier assigned by the server, independent of any
/// resource's local numbering. Used by `Tag::gid` and `PimItem::gid`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Gid(pub String);

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The name of a resource agent, e.g. `"akonadi_imap_resource_0"`-style IDs
/// in the original; kept as an opaque interned-ish string here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub String);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifies the session that caused a change, so subscribers can filter
/// out notifications about their own actions (§4.5 "ignored sessions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Identifies an atomic operation group for the undo engine (§4.8 Multi
/// entries) and for grouped store-side rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtomicOperationId(pub u64);

/// A remote-assigned identifier, unique only within its owning resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RemoteId(pub String);

impl RemoteId {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
