//! Shared data model for the PIM broker: collections, items, tags,
//! relations, attributes, change notifications and undo entries (spec §3).
//!
//! This crate is intentionally inert: no I/O, no async, no locking. Every
//! other crate in the workspace builds on these types.

pub mod attribute;
pub mod collection;
pub mod error;
pub mod ids;
pub mod item;
pub mod notification;
pub mod scope;
pub mod tag;
pub mod tristate;
pub mod undo;

pub use attribute::{changed_attribute_names, AttributeMap, AttributeName, AttributeValue};
pub use collection::{CachePolicy, Collection, CollectionPart, ViewPreferences};
pub use error::ErrorCategory;
pub use ids::{
    AtomicOperationId, CollectionId, Gid, ItemId, RelationId, RemoteId, ResourceId, SessionId,
    TagId, ROOT_COLLECTION,
};
pub use item::{Flag, PimItem, Part, Relation};
pub use notification::{
    CollectionChangeNotification, CollectionRef, DebugNotification, EntityKind,
    ItemChangeNotification, ItemRef, Notification, Operation, RelationChangeNotification,
    SubscriptionChangeNotification, TagChangeNotification, TagRef,
};
pub use scope::{tag_scope_is_legal, AncestorDepth, Scope};
pub use tag::{Tag, NO_PARENT_TAG};
pub use tristate::Tristate;
pub use undo::{
    CreationRecord, DeletionRecord, ModificationRecord, MultiRecord, ResultCode, UndoEntry,
    UndoKind,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn tristate_resolves_against_fallback() {
        assert!(Tristate::True.resolve(false));
        assert!(!Tristate::False.resolve(true));
        assert!(Tristate::Undefined.resolve(true));
        assert!(!Tristate::Undefined.resolve(false));
    }

    #[test]
    fn attribute_diff_reports_added_changed_and_removed() {
        let mut before = BTreeMap::new();
        before.insert(b"a".to_vec(), b"1".to_vec());
        before.insert(b"b".to_vec(), b"2".to_vec());

        let mut after = BTreeMap::new();
        after.insert(b"a".to_vec(), b"1".to_vec()); // unchanged
        after.insert(b"c".to_vec(), b"3".to_vec()); // added

        let changed = changed_attribute_names(&before, &after);
        assert_eq!(changed, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn tag_scope_legality_excludes_hierarchical_rid() {
        assert!(tag_scope_is_legal(&Scope::Uid(vec![1])));
        assert!(tag_scope_is_legal(&Scope::Gid(vec![Gid("g".into())])));
        assert!(tag_scope_is_legal(&Scope::RemoteId(vec![RemoteId(
            "r".into()
        )])));
        assert!(!tag_scope_is_legal(&Scope::HierarchicalRid(vec![
            RemoteId("r".into())
        ])));
    }

    #[test]
    fn ancestor_depth_orders_none_parent_all() {
        assert!(AncestorDepth::None < AncestorDepth::Parent);
        assert!(AncestorDepth::Parent < AncestorDepth::All);
    }

    #[test]
    fn collection_mime_type_gate_allows_virtual_anything() {
        let mut col = sample_collection();
        col.virtual_ = true;
        col.content_mime_types.clear();
        assert!(col.accepts_mime_type("application/x-anything"));
    }

    #[test]
    fn collection_mime_type_gate_restricts_non_virtual() {
        let mut col = sample_collection();
        col.content_mime_types.insert("message/rfc822".into());
        assert!(col.accepts_mime_type("message/rfc822"));
        assert!(!col.accepts_mime_type("text/vcard"));
    }

    fn sample_collection() -> Collection {
        Collection {
            id: CollectionId(5),
            parent_id: Some(CollectionId(4)),
            resource: ResourceId("r0".into()),
            name: "ColD".into(),
            remote_id: RemoteId::default(),
            remote_revision: None,
            content_mime_types: Default::default(),
            cache_policy: CachePolicy::default(),
            virtual_: false,
            query: None,
            enabled: true,
            view_preferences: ViewPreferences::default(),
            attributes: BTreeMap::new(),
        }
    }
}
